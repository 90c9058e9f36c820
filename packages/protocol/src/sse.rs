//! Server-sent event framing
//!
//! Each event travels as an `event:<name>` line followed by a `data:<payload>` line and
//! a blank line. [`SseParser`] reassembles frames from arbitrarily chunked bytes.

use crate::error::DecodeError;
use crate::event::{Event, EventCode};

/// One `event:` / `data:` pair as received from the stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn code(&self) -> EventCode {
        EventCode::from_name(&self.event)
    }

    /// Decode the frame into a typed event. Unknown event names become [`Event::None`].
    pub fn into_event(self) -> Result<Event, DecodeError> {
        Event::decode_payload(self.code(), &self.data)
    }
}

/// Render an event as a complete stream frame
pub fn encode_frame(event: &Event) -> String {
    format!("event: {}\ndata: {}\n\n", event.name(), event.encode_payload())
}

/// Incremental frame parser
///
/// Bytes are buffered until a full line is available, so chunk boundaries may fall
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            if self.event.is_empty() && self.data.is_empty() {
                return None;
            }
            let frame = SseFrame {
                event: std::mem::take(&mut self.event),
                data: std::mem::take(&mut self.data).join("\n"),
            };
            return Some(frame);
        }

        // Comment lines (keep-alives) start with a colon
        if line.starts_with(':') {
            return None;
        }

        // Only the single space after the colon is framing
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = value.to_string(),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}
