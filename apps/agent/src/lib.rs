//! Wattline device agent
//!
//! Simulates one metered device: it keeps the server-pushed event stream open, applies
//! `command-power` events to its power level and optionally reports consumption.
//!
//! # Example
//!
//! ```no_run
//! use wattline_agent::{AgentConfig, DeviceAgent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgentConfig::for_device("http://localhost:59002", "lamp1");
//! let agent = DeviceAgent::new(config)?;
//! agent.run_until_disconnected().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod power;

pub use agent::{DeviceAgent, StreamEnd};
pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
pub use power::PowerMode;
