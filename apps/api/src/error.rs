//! Error handling for the Wattline API
//!
//! This module provides a unified error type using thiserror, with automatic HTTP
//! status code mapping via Axum's IntoResponse trait. Domain errors from the session
//! registry, the authenticator and the store convert into it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use wattline_protocol::RegistrationStatus;

use crate::models::device::DeviceValidationError;
use crate::repositories::StoreError;
use crate::services::AuthError;
use crate::sessions::{RegistryError, SendError};

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Main API error type
#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Device Authentication ==========
    /// Device id missing or not alphanumeric
    #[error("invalid device id: {0}")]
    BadIdentity(String),

    /// Device type header missing or not a byte
    #[error("invalid device type: {0}")]
    BadClientType(String),

    /// Token did not match
    #[error("device authentication failed")]
    AuthFailed,

    /// Device presented a different type than the one it registered with
    #[error("{0}")]
    TypeMismatch(String),

    // ========== Sessions ==========
    /// Device already has a live stream
    #[error("device {0} already has an active session")]
    DuplicateSession(String),

    /// Device has no live stream
    #[error("device {0} is not connected")]
    NotConnected(String),

    // ========== Resource Errors ==========
    /// Requested resource not found
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    // ========== Validation Errors ==========
    /// Request validation failed
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid query parameter
    #[error("invalid query parameter '{name}': {reason}")]
    InvalidQueryParam { name: &'static str, reason: String },

    // ========== Persistence Errors ==========
    /// Store call failed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Service temporarily unavailable
    #[error("service temporarily unavailable: {0}")]
    ServiceBusy(String),

    // ========== Internal Errors ==========
    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized
            Self::AuthFailed => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::TypeMismatch(_) | Self::DuplicateSession(_) | Self::NotConnected(_) => {
                StatusCode::CONFLICT
            }

            // 400 Bad Request
            Self::BadIdentity(_)
            | Self::BadClientType(_)
            | Self::ValidationError(_)
            | Self::MissingField(_)
            | Self::InvalidQueryParam { .. } => StatusCode::BAD_REQUEST,

            // 503 Service Unavailable
            Self::ServiceBusy(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::Persistence(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadIdentity(_) => "BAD_IDENTITY",
            Self::BadClientType(_) => "BAD_CLIENT_TYPE",
            Self::AuthFailed => "AUTH_FAILED",
            Self::TypeMismatch(_) => "TYPE_MISMATCH",
            Self::DuplicateSession(_) => "DUPLICATE_SESSION",
            Self::NotConnected(_) => "DEVICE_NOT_CONNECTED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidQueryParam { .. } => "INVALID_QUERY_PARAM",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::ServiceBusy(_) => "SERVICE_BUSY",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Create an invalid query parameter error
    pub fn invalid_param(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidQueryParam {
            name,
            reason: reason.into(),
        }
    }

    /// Registration outcome reported to a device whose stream was refused
    pub fn registration_status(&self) -> Option<RegistrationStatus> {
        match self {
            Self::AuthFailed | Self::TypeMismatch(_) | Self::BadIdentity(_) => {
                Some(RegistrationStatus::IdentityMismatch)
            }
            Self::DuplicateSession(_) => Some(RegistrationStatus::ConnectionDuplicated),
            _ => None,
        }
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Authentication error"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let error_response = ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
            details: self
                .registration_status()
                .map(|s| serde_json::json!({ "registration": s.code() })),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

// ========== Conversion Implementations ==========

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::not_found("device", id),
            StoreError::Timeout(_) => Self::ServiceBusy(err.to_string()),
            StoreError::Database(_) | StoreError::Unavailable(_) => {
                Self::Persistence(err.to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::BadIdentity => Self::BadIdentity(err.to_string()),
            AuthError::BadType => Self::BadClientType(err.to_string()),
            AuthError::TypeMismatch { .. } => Self::TypeMismatch(err.to_string()),
            AuthError::AuthFailed => Self::AuthFailed,
            AuthError::Persistence(store) => store.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateSession(id) => Self::DuplicateSession(id),
            RegistryError::Persistence(store) => store.into(),
            RegistryError::Unavailable => Self::ServiceBusy(err.to_string()),
        }
    }
}

impl From<SendError> for ApiError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NotConnected(id) | SendError::QueueClosed(id) => Self::NotConnected(id),
        }
    }
}

impl From<DeviceValidationError> for ApiError {
    fn from(err: DeviceValidationError) -> Self {
        Self::ValidationError(err.to_string())
    }
}
