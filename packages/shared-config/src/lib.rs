//! Settings shared by the Wattline session server and the device agent
//!
//! Both binaries read their configuration from environment variables (optionally seeded
//! from a `.env` file). The helpers here keep variable handling identical on either side
//! of the wire: blank values count as unset, numbers that must be positive are checked
//! in one place, and every failure names the variable that caused it.

mod database;
mod error;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ConfigResult};

use std::env;
use std::str::FromStr;

/// Settings every server process needs regardless of its role
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Where device records live when the postgres backend is selected
    pub database: DatabaseConfig,

    /// Deployment mode from `ENVIRONMENT`
    pub environment: Environment,
}

/// Deployment mode
///
/// Production tightens startup checks: the database must be configured explicitly and
/// volatile stores are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = std::convert::Infallible;

    /// Anything other than `production`/`prod` is treated as development
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Read `ENVIRONMENT`, defaulting to development
    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl CommonConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            environment: Environment::from_env(),
        })
    }
}

/// Non-blank value of `name`, trimmed
fn non_blank(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a setting that has no default, such as the agent's `DEVICE_ID`
pub fn require_env(name: &str) -> ConfigResult<String> {
    non_blank(name).ok_or_else(|| ConfigError::Missing {
        name: name.to_string(),
    })
}

/// Read a string setting, falling back to `default` when unset or blank
pub fn env_or(name: &str, default: &str) -> String {
    non_blank(name).unwrap_or_else(|| default.to_string())
}

/// Parse a setting into `T`, falling back to `default` when unset or blank
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_blank(name) {
        Some(value) => match value.parse() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Unparseable {
                name: name.to_string(),
                reason: e.to_string(),
                value,
            }),
        },
        None => Ok(default),
    }
}

/// Parse a count or duration that must be strictly positive (intervals, timeouts)
///
/// Zero and negative values are rejected rather than clamped, so a misconfigured
/// broadcast or report period stops the process at startup.
pub fn parse_positive_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse_env(name, default)?;
    if value <= T::default() {
        return Err(ConfigError::OutOfRange {
            name: name.to_string(),
            value: value.to_string(),
            requirement: "must be greater than zero",
        });
    }
    Ok(value)
}

/// Read a boolean flag (`1`, `true`, `yes`, `on`, case-insensitive)
pub fn parse_env_flag(name: &str, default: bool) -> bool {
    match non_blank(name) {
        Some(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

/// Read the base URL of a Wattline server, without a trailing slash
pub fn server_url_env(name: &str, default: &str) -> ConfigResult<String> {
    let value = env_or(name, default);
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::NotHttpUrl {
            name: name.to_string(),
            value,
        });
    }
    Ok(value.trim_end_matches('/').to_string())
}
