//! Protocol error types

use thiserror::Error;

/// Failure to turn raw payload text into a typed event
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload text is not valid JSON for the event kind
    #[error("malformed {event} payload: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Registration payload carried a status this peer does not know
    #[error("unknown registration status: {0}")]
    UnknownRegistrationStatus(i64),
}
