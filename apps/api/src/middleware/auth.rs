//! Device authentication extractor for Axum handlers
//!
//! `DeviceAuth` reads the three device headers, runs the [`Authenticator`] found in the
//! request extensions and yields the authenticated claim.
//!
//! # Usage
//!
//! ```rust,ignore
//! async fn handler(auth: DeviceAuth) -> impl IntoResponse {
//!     format!("Hello, device {}!", auth.device_id)
//! }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use wattline_protocol::{DeviceType, HEADER_AUTHORIZATION, HEADER_CLIENT_ID, HEADER_CLIENT_TYPE};

use crate::error::ApiError;
use crate::services::{AuthError, Authenticator, DeviceClaim};

/// Authenticated device
#[derive(Debug, Clone)]
pub struct DeviceAuth {
    pub device_id: String,
    pub device_type: DeviceType,
}

/// Device authentication rejection types
#[derive(Debug)]
pub enum AuthRejection {
    /// A device header is absent or not valid text
    MissingHeader(&'static str),
    /// The type header is not a byte
    InvalidType(String),
    /// The authenticator turned the device away
    Rejected(AuthError),
    /// Missing required services in request extensions
    MissingServices,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let error = match self {
            AuthRejection::MissingHeader(HEADER_CLIENT_ID) => {
                ApiError::BadIdentity(format!("missing {HEADER_CLIENT_ID} header"))
            }
            AuthRejection::MissingHeader(HEADER_CLIENT_TYPE) => {
                ApiError::BadClientType(format!("missing {HEADER_CLIENT_TYPE} header"))
            }
            AuthRejection::MissingHeader(name) => {
                tracing::debug!(header = name, "Device rejected: missing header");
                ApiError::AuthFailed
            }
            AuthRejection::InvalidType(raw) => {
                tracing::debug!(raw = %raw, "Device rejected: bad type header");
                ApiError::from(AuthError::BadType)
            }
            AuthRejection::Rejected(e) => ApiError::from(e),
            AuthRejection::MissingServices => {
                tracing::error!("Device rejected: authenticator not configured");
                ApiError::Internal("authentication services not configured".to_string())
            }
        };

        error.into_response()
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, AuthRejection> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .ok_or(AuthRejection::MissingHeader(name))
}

/// Read the device headers into a claim without checking it
pub fn extract_claim(parts: &Parts) -> Result<DeviceClaim, AuthRejection> {
    let device_id = header(parts, HEADER_CLIENT_ID)?;
    let raw_type = header(parts, HEADER_CLIENT_TYPE)?;
    let device_type = raw_type
        .parse::<DeviceType>()
        .map_err(|_| AuthRejection::InvalidType(raw_type.to_string()))?;
    let token = header(parts, HEADER_AUTHORIZATION)?;

    Ok(DeviceClaim {
        device_id: device_id.to_string(),
        device_type,
        token: token.to_string(),
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for DeviceAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claim = extract_claim(parts)?;

        let authenticator = parts
            .extensions
            .get::<Authenticator>()
            .ok_or(AuthRejection::MissingServices)?;

        if let Err(e) = authenticator.authenticate(&claim).await {
            tracing::info!(device_id = %claim.device_id, error = %e, "Device authentication failed");
            return Err(AuthRejection::Rejected(e));
        }

        Ok(DeviceAuth {
            device_id: claim.device_id,
            device_type: claim.device_type,
        })
    }
}
