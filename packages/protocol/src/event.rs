//! Typed event envelope
//!
//! Every event pushed to a device carries a small integer code, a wire name derived
//! from that code, and a payload whose shape is fully determined by the code. Events
//! are immutable once built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Event kind identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    /// No-op placeholder; also the fallback for unknown codes and names
    None,
    /// Result of a registration attempt
    Registration,
    /// Set the device power level
    CommandPower,
    /// Free-form text (welcome message, liveness timestamps)
    Message,
    /// Terminal marker: the receiver must stop reading and drop the connection
    Disconnect,
}

impl EventCode {
    pub const ALL: [EventCode; 5] = [
        EventCode::None,
        EventCode::Registration,
        EventCode::CommandPower,
        EventCode::Message,
        EventCode::Disconnect,
    ];

    /// Map a raw code to its kind. Unknown codes map to [`EventCode::None`] so that
    /// peers speaking a newer protocol revision do not break older ones.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Registration,
            2 => Self::CommandPower,
            3 => Self::Message,
            4 => Self::Disconnect,
            _ => Self::None,
        }
    }

    /// Map a wire name back to its kind. Unknown names map to [`EventCode::None`].
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|code| *code != Self::None && code.name() == name)
            .unwrap_or(Self::None)
    }

    pub fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Registration => 1,
            Self::CommandPower => 2,
            Self::Message => 3,
            Self::Disconnect => 4,
        }
    }

    /// Wire name used as the `event:` field of a stream frame
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Registration => "registration",
            Self::CommandPower => "command-power",
            Self::Message => "message",
            Self::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Outcome carried by a `registration` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Succeeded,
    IdentityMismatch,
    ConnectionDuplicated,
}

impl RegistrationStatus {
    pub fn code(self) -> i64 {
        match self {
            Self::Succeeded => 0,
            Self::IdentityMismatch => 10001,
            Self::ConnectionDuplicated => 10002,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Succeeded),
            10001 => Some(Self::IdentityMismatch),
            10002 => Some(Self::ConnectionDuplicated),
            _ => None,
        }
    }
}

/// Payload of a `command-power` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPower {
    pub power: i64,
}

/// Payload of a `message` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub message: String,
}

#[derive(Serialize, Deserialize)]
struct Empty {}

/// A single event exchanged between server and device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    None,
    Registration(RegistrationStatus),
    CommandPower(CommandPower),
    Message(MessageData),
    Disconnect,
}

impl Event {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(MessageData {
            message: text.into(),
        })
    }

    pub fn command_power(power: i64) -> Self {
        Self::CommandPower(CommandPower { power })
    }

    pub fn registration(status: RegistrationStatus) -> Self {
        Self::Registration(status)
    }

    pub fn code(&self) -> EventCode {
        match self {
            Self::None => EventCode::None,
            Self::Registration(_) => EventCode::Registration,
            Self::CommandPower(_) => EventCode::CommandPower,
            Self::Message(_) => EventCode::Message,
            Self::Disconnect => EventCode::Disconnect,
        }
    }

    pub fn name(&self) -> &'static str {
        self.code().name()
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnect)
    }

    /// Serialize only the payload to JSON text
    pub fn encode_payload(&self) -> String {
        let encoded = match self {
            Self::None => Ok("null".to_string()),
            Self::Registration(status) => serde_json::to_string(&status.code()),
            Self::CommandPower(data) => serde_json::to_string(data),
            Self::Message(data) => serde_json::to_string(data),
            Self::Disconnect => serde_json::to_string(&Empty {}),
        };
        // Payload types are plain structs and integers; serialization cannot fail.
        encoded.unwrap_or_else(|_| "null".to_string())
    }

    /// Parse payload text for the given event kind.
    ///
    /// `None` and `Disconnect` ignore their payload so the terminal marker is never lost
    /// to a malformed body.
    pub fn decode_payload(code: EventCode, raw: &str) -> Result<Self, DecodeError> {
        let malformed = |source| DecodeError::Malformed {
            event: code.name(),
            source,
        };
        match code {
            EventCode::None => Ok(Self::None),
            EventCode::Disconnect => Ok(Self::Disconnect),
            EventCode::Registration => {
                let status: i64 = serde_json::from_str(raw).map_err(malformed)?;
                RegistrationStatus::from_code(status)
                    .map(Self::Registration)
                    .ok_or(DecodeError::UnknownRegistrationStatus(status))
            }
            EventCode::CommandPower => serde_json::from_str(raw)
                .map(Self::CommandPower)
                .map_err(malformed),
            EventCode::Message => serde_json::from_str(raw)
                .map(Self::Message)
                .map_err(malformed),
        }
    }
}

/// Device classification, carried on the wire as a single byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceType(pub u8);

impl DeviceType {
    pub const NONE: DeviceType = DeviceType(0);
    pub const SWITCH: DeviceType = DeviceType(1);

    pub fn as_byte(self) -> u8 {
        self.0
    }

    pub fn as_i32(self) -> i32 {
        i32::from(self.0)
    }
}

impl From<u8> for DeviceType {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl TryFrom<i32> for DeviceType {
    type Error = std::num::TryFromIntError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u8::try_from(value).map(Self)
    }
}

impl FromStr for DeviceType {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u8>().map(Self)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
