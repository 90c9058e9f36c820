//! Agent configuration loaded from environment variables

use std::time::Duration;

use wattline_protocol::DeviceType;
use wattline_shared_config::{
    parse_env, parse_env_flag, parse_positive_env, require_env, server_url_env, ConfigResult,
};

/// Server the agent connects to when `WATTLINE_SERVER_URL` is unset
pub const DEFAULT_SERVER_URL: &str = "http://localhost:59002";

/// Device agent configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Base URL of the session server (default: http://localhost:59002)
    pub server_url: String,

    /// Device id presented in the `x-request-client-id` header
    pub device_id: String,

    /// Device type byte (default: 1)
    pub device_type: DeviceType,

    /// Power level before any command arrives (default: 0)
    pub power_factor: i64,

    /// Whether to post consumption samples (default: false)
    pub report_consumption: bool,

    /// Period between consumption samples (default: 1s)
    pub report_interval: Duration,
}

impl AgentConfig {
    pub fn from_env() -> ConfigResult<Self> {
        let report_interval_secs: u64 = parse_positive_env("REPORT_INTERVAL_SECS", 1)?;

        Ok(Self {
            server_url: server_url_env("WATTLINE_SERVER_URL", DEFAULT_SERVER_URL)?,
            device_id: require_env("DEVICE_ID")?,
            device_type: DeviceType(parse_env("DEVICE_TYPE", 1u8)?),
            power_factor: parse_env("DEVICE_POWER_FACTOR", 0i64)?,
            report_consumption: parse_env_flag("REPORT_CONSUMPTION", false),
            report_interval: Duration::from_secs(report_interval_secs),
        })
    }

    /// Configuration for a device with every optional setting at its default
    pub fn for_device(server_url: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            device_id: device_id.into(),
            device_type: DeviceType::SWITCH,
            power_factor: 0,
            report_consumption: false,
            report_interval: Duration::from_secs(1),
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }
}
