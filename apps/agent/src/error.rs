//! Error types for the device agent

use thiserror::Error;
use wattline_protocol::RegistrationStatus;
use wattline_shared_config::ConfigError;

/// Errors that can occur while talking to the session server
#[derive(Error, Debug)]
pub enum AgentError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server could not be reached
    #[error("connection refused. Is the server running at {0}?")]
    ConnectionRefused(String),

    /// Server answered with an error status
    #[error("server rejected request ({status}): {code}: {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
        registration: Option<RegistrationStatus>,
    },

    /// Agent configuration is incomplete or invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AgentError {
    /// Whether reconnecting later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::ConnectionRefused(_) | AgentError::HttpError(_) => true,
            AgentError::Rejected { status, .. } => *status >= 500,
            AgentError::Config(_) => false,
        }
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
