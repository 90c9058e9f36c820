//! Wire protocol shared by the Wattline server and device agents
//!
//! This crate defines:
//! - The typed event envelope pushed from the server to devices
//! - Server-sent event framing (`event:` / `data:` pairs) and an incremental parser
//! - The device token derivation and the request header names that carry it
//!
//! # Example
//!
//! ```rust
//! use wattline_protocol::{Event, EventCode};
//!
//! let event = Event::command_power(42);
//! assert_eq!(event.code(), EventCode::CommandPower);
//! assert_eq!(event.name(), "command-power");
//! assert_eq!(event.encode_payload(), r#"{"power":42}"#);
//!
//! let decoded = Event::decode_payload(EventCode::CommandPower, r#"{"power":42}"#).unwrap();
//! assert_eq!(decoded, event);
//! ```

mod error;
mod event;
mod sse;
mod token;

pub use error::DecodeError;
pub use event::{CommandPower, DeviceType, Event, EventCode, MessageData, RegistrationStatus};
pub use sse::{encode_frame, SseFrame, SseParser};
pub use token::{
    derive_token, HEADER_AUTHORIZATION, HEADER_CLIENT_ID, HEADER_CLIENT_TYPE,
};
