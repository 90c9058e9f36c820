//! Device records and audit rows
//!
//! These are the durable counterparts of live sessions: the device registry itself,
//! the on/off activity trail, command executions and reported consumption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// Maximum length for device ids (matches database constraint)
pub const MAX_DEVICE_ID_LEN: usize = 255;
/// Maximum length for device names (matches database constraint)
pub const MAX_DEVICE_NAME_LEN: usize = 255;

/// Errors that can occur during device field validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceValidationError {
    #[error("name not specified")]
    EmptyName,
    #[error("name exceeds maximum length of {MAX_DEVICE_NAME_LEN} (got {0})")]
    NameTooLong(usize),
}

/// Validate a device display name
pub fn validate_device_name(name: &str) -> Result<(), DeviceValidationError> {
    if name.is_empty() {
        return Err(DeviceValidationError::EmptyName);
    }
    if name.len() > MAX_DEVICE_NAME_LEN {
        return Err(DeviceValidationError::NameTooLong(name.len()));
    }
    Ok(())
}

/// Device record from the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_type: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Device record enriched with live session state for the control plane
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Device,
    pub is_active: bool,
    /// Start of the current session; `null` while offline
    pub connected_since: Option<DateTime<Utc>>,
}

impl DeviceView {
    pub fn new(device: Device, connected_since: Option<DateTime<Utc>>) -> Self {
        Self {
            device,
            is_active: connected_since.is_some(),
            connected_since,
        }
    }
}

/// Whether a device session started or ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Off,
    On,
}

impl ActivityStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        if value == 0 {
            Self::Off
        } else {
            Self::On
        }
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::On => write!(f, "on"),
        }
    }
}

/// Activity row from the database
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeviceActivity {
    pub id: i64,
    pub device_id: String,
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

/// Command execution row from the database
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CommandExecution {
    pub id: i64,
    pub device_id: String,
    pub code: i32,
    pub payload: String,
    pub delivered: bool,
    pub sent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Data for recording a command execution
#[derive(Debug, Clone)]
pub struct NewCommandExecution {
    pub device_id: String,
    pub code: i32,
    pub payload: String,
    pub delivered: bool,
    pub sent_at: DateTime<Utc>,
}

/// Consumption sample row from the database
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeviceConsumption {
    pub id: i64,
    pub device_id: String,
    pub consumption: f32,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
