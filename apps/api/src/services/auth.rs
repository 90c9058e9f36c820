//! Device authentication
//!
//! A device must present its id, its type and a token before a stream is opened. The
//! check is deliberately light: the expected token is derived from the id and type, so
//! it only keeps out clients that do not speak the protocol.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use wattline_protocol::{derive_token, DeviceType};

use crate::models::device::MAX_DEVICE_ID_LEN;
use crate::repositories::{bounded, DeviceStore, StoreError};

/// Default bound on the device lookup made during authentication
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Credentials presented by a connecting device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceClaim {
    pub device_id: String,
    pub device_type: DeviceType,
    pub token: String,
}

/// Reasons a device is turned away
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("device id must be 1-{MAX_DEVICE_ID_LEN} ASCII letters or digits")]
    BadIdentity,

    #[error("device type must be an integer between 0 and 255")]
    BadType,

    #[error("device {device_id} is registered with type {registered}, not {presented}")]
    TypeMismatch {
        device_id: String,
        registered: i32,
        presented: DeviceType,
    },

    #[error("device token rejected")]
    AuthFailed,

    #[error("device lookup failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Decides whether a presented token is acceptable
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, claim: &DeviceClaim) -> bool;
}

/// Accepts exactly the token returned by [`derive_token`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestTokenVerifier;

impl TokenVerifier for DigestTokenVerifier {
    fn verify(&self, claim: &DeviceClaim) -> bool {
        let expected = derive_token(&claim.device_id, claim.device_type);
        expected.as_bytes() == claim.token.as_bytes()
    }
}

/// Check a device id: non-empty, ASCII alphanumeric, at most [`MAX_DEVICE_ID_LEN`] bytes
pub fn validate_device_id(id: &str) -> Result<(), AuthError> {
    if id.is_empty() || id.len() > MAX_DEVICE_ID_LEN {
        return Err(AuthError::BadIdentity);
    }
    if !id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(AuthError::BadIdentity);
    }
    Ok(())
}

/// Gatekeeper for device streams
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn DeviceStore>,
    verifier: Arc<dyn TokenVerifier>,
    store_timeout: Duration,
}

impl Authenticator {
    /// Authenticator using [`DigestTokenVerifier`]
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self::with_verifier(store, Arc::new(DigestTokenVerifier))
    }

    pub fn with_verifier(store: Arc<dyn DeviceStore>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            store,
            verifier,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Validate the id, compare the type against any stored record, then verify the token
    pub async fn authenticate(&self, claim: &DeviceClaim) -> Result<(), AuthError> {
        validate_device_id(&claim.device_id)?;

        let known = bounded(self.store_timeout, self.store.get_device(&claim.device_id)).await?;
        if let Some(device) = known {
            if device.device_type != claim.device_type.as_i32() {
                return Err(AuthError::TypeMismatch {
                    device_id: claim.device_id.clone(),
                    registered: device.device_type,
                    presented: claim.device_type,
                });
            }
        }

        if !self.verifier.verify(claim) {
            return Err(AuthError::AuthFailed);
        }

        Ok(())
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
