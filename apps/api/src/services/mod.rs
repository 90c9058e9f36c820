//! Business logic services for Wattline
//!
//! This module contains:
//! - Device authentication
//! - Health checks

pub mod auth;
pub mod health;

pub use auth::{
    validate_device_id, AuthError, Authenticator, DeviceClaim, DigestTokenVerifier, TokenVerifier,
};
pub use health::HealthService;
