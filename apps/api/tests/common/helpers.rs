//! Test helper functions for API integration tests
//!
//! Provides utility functions for reading response bodies, following an event stream
//! and waiting on asynchronous state changes.

#![allow(dead_code)]

use std::time::Duration;

use axum::body::{Body, BodyDataStream};
use axum::http::Response;
use futures_util::StreamExt;
use wattline_protocol::{Event, SseFrame, SseParser};

/// How long a test waits for a frame or a condition before failing
pub const WAIT_LIMIT: Duration = Duration::from_secs(2);

/// Collect a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or_else(|e| {
        panic!(
            "body is not JSON ({e}): {}",
            String::from_utf8_lossy(&body)
        )
    })
}

/// Collect a response body as text
pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Poll `condition` until it holds, panicking after [`WAIT_LIMIT`]
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Reads frames off a streaming response one at a time
///
/// Dropping the reader drops the response body, which closes the device session.
pub struct FrameReader {
    body: BodyDataStream,
    parser: SseParser,
    pending: Vec<SseFrame>,
}

impl FrameReader {
    pub fn new(response: Response<Body>) -> Self {
        Self {
            body: response.into_body().into_data_stream(),
            parser: SseParser::new(),
            pending: Vec::new(),
        }
    }

    /// Next raw frame, or `None` once the stream has ended
    pub async fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            if !self.pending.is_empty() {
                return Some(self.pending.remove(0));
            }
            let chunk = tokio::time::timeout(WAIT_LIMIT, self.body.next())
                .await
                .expect("timed out waiting for a stream frame")?;
            let chunk = chunk.expect("stream body failed");
            self.pending.extend(self.parser.feed(&chunk));
        }
    }

    /// Next frame decoded as an event; panics if the stream ended
    pub async fn next_event(&mut self) -> Event {
        let frame = self.next_frame().await.expect("stream ended early");
        frame.into_event().expect("undecodable frame")
    }

    /// Assert that the stream ends without another frame
    pub async fn expect_end(&mut self) {
        if let Some(frame) = self.next_frame().await {
            panic!("expected end of stream, got {frame:?}");
        }
    }
}
