//! Errors raised while reading Wattline settings from the environment

use thiserror::Error;

/// A setting that could not be loaded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting without a default was not provided, or was blank
    #[error("{name} must be set")]
    Missing { name: String },

    /// The value does not parse as the expected type
    #[error("{name}={value:?} could not be parsed: {reason}")]
    Unparseable {
        name: String,
        value: String,
        reason: String,
    },

    /// The value parsed but is outside the accepted range
    #[error("{name} {requirement} (got {value:?})")]
    OutOfRange {
        name: String,
        value: String,
        requirement: &'static str,
    },

    /// A server address that devices cannot reach over HTTP
    #[error("{name} must be an http:// or https:// URL (got {value:?})")]
    NotHttpUrl { name: String, value: String },
}

impl ConfigError {
    /// Environment variable the error is about
    pub fn variable(&self) -> &str {
        match self {
            Self::Missing { name }
            | Self::Unparseable { name, .. }
            | Self::OutOfRange { name, .. }
            | Self::NotHttpUrl { name, .. } => name,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
