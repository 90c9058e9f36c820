//! Live device sessions
//!
//! This module handles:
//! - The per-device outbound event queue
//! - The registry of connected devices and its dispatch task
//! - The periodic liveness broadcast

mod audit;
pub mod broadcaster;
pub mod manager;
pub mod session;

pub use broadcaster::{LivenessBroadcaster, ZeroInterval};
pub use manager::{
    ConnectedSession, RegistryConfig, RegistryError, SendError, SessionManager, WELCOME_MESSAGE,
};
pub use session::{ClientSession, OutboundQueue, QueueClosed};
