//! Middleware components for Wattline API
//!
//! - `DeviceAuth`: authenticates a device from its request headers

pub mod auth;

pub use auth::{AuthRejection, DeviceAuth};
