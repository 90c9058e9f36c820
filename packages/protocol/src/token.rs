//! Device token derivation
//!
//! A device proves its identity by presenting a digest of its own id and type. There is
//! no per-device secret: anyone who knows the derivation can mint a token.

use sha2::{Digest, Sha256};

use crate::event::DeviceType;

/// Header carrying the device id
pub const HEADER_CLIENT_ID: &str = "x-request-client-id";
/// Header carrying the device type as a decimal byte
pub const HEADER_CLIENT_TYPE: &str = "x-request-client-type";
/// Header carrying the derived token
pub const HEADER_AUTHORIZATION: &str = "x-request-authorization";

/// Lowercase hex SHA-256 over the id bytes followed by the type byte
pub fn derive_token(device_id: &str, device_type: DeviceType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(device_id.as_bytes());
    hasher.update([device_type.as_byte()]);
    let hash = hasher.finalize();
    format!("{:x}", hash)
}
