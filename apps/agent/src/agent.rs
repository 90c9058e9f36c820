//! Device side of the session protocol
//!
//! The agent opens `POST /client/register`, follows the event stream frame by frame and
//! applies `command-power` events to its [`PowerMode`]. When reporting is enabled it posts
//! a consumption sample on every tick while the stream is open.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use wattline_protocol::{
    derive_token, Event, RegistrationStatus, SseFrame, SseParser, HEADER_AUTHORIZATION,
    HEADER_CLIENT_ID, HEADER_CLIENT_TYPE,
};

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::power::PowerMode;

/// Maximum error body size kept in [`AgentError::Rejected`]
const MAX_ERROR_BODY_SIZE: usize = 1000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnect backoff
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How an event stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server sent `disconnect`
    Disconnected,
    /// The body ended without a `disconnect`
    Closed,
}

/// Error body returned by the server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

/// A single simulated device
#[derive(Debug, Clone)]
pub struct DeviceAgent {
    http_client: Client,
    config: AgentConfig,
    power: Arc<PowerMode>,
    retry_base_delay: Duration,
}

impl DeviceAgent {
    pub fn new(config: AgentConfig) -> AgentResult<Self> {
        // No overall timeout: the event stream stays open indefinitely
        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self::with_client(config, http_client))
    }

    /// Create an agent with a custom HTTP client (for testing)
    pub fn with_client(config: AgentConfig, http_client: Client) -> Self {
        let power = Arc::new(PowerMode::new(config.power_factor));
        Self {
            http_client,
            config,
            power,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    /// Set the first reconnect delay; later attempts double it up to 30s
    pub fn with_retry_delay(mut self, base: Duration) -> Self {
        self.retry_base_delay = base;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn power(&self) -> &Arc<PowerMode> {
        &self.power
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = derive_token(&self.config.device_id, self.config.device_type);
        request
            .header(HEADER_CLIENT_ID, &self.config.device_id)
            .header(HEADER_CLIENT_TYPE, self.config.device_type.to_string())
            .header(HEADER_AUTHORIZATION, token)
    }

    fn send_error(&self, e: reqwest::Error) -> AgentError {
        if e.is_connect() {
            AgentError::ConnectionRefused(self.config.server_url.clone())
        } else {
            AgentError::HttpError(e)
        }
    }

    /// Truncate error body, respecting UTF-8 boundaries
    fn truncate_error_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_SIZE {
            return body;
        }
        let mut end = MAX_ERROR_BODY_SIZE;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    }

    async fn check_response(response: Response) -> AgentResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = Self::truncate_error_body(response.text().await.unwrap_or_default());

        let error = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => {
                let registration = parsed
                    .details
                    .as_ref()
                    .and_then(|d| d.get("registration"))
                    .and_then(|v| v.as_i64())
                    .and_then(RegistrationStatus::from_code);
                AgentError::Rejected {
                    status,
                    code: parsed.code,
                    message: parsed.message,
                    registration,
                }
            }
            Err(_) => AgentError::Rejected {
                status,
                code: "UNKNOWN".to_string(),
                message: body,
                registration: None,
            },
        };
        Err(error)
    }

    /// Open the event stream; fails if the server refuses the device
    pub async fn open_stream(&self) -> AgentResult<Response> {
        let url = self.config.endpoint("/client/register");
        let response = self
            .authorize(self.http_client.post(&url))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        Self::check_response(response).await
    }

    /// Consume an open stream until `disconnect` or end of body
    pub async fn follow(&self, response: Response) -> AgentResult<StreamEnd> {
        let body = response.bytes_stream();
        futures_util::pin_mut!(body);
        let mut parser = SseParser::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for frame in parser.feed(&chunk) {
                if self.handle_frame(frame) {
                    return Ok(StreamEnd::Disconnected);
                }
            }
        }

        Ok(StreamEnd::Closed)
    }

    /// Open the stream and follow it to the end
    pub async fn register(&self) -> AgentResult<StreamEnd> {
        let response = self.open_stream().await?;
        info!(
            device_id = %self.config.device_id,
            device_type = %self.config.device_type,
            "Event stream opened"
        );
        self.follow(response).await
    }

    /// Decode one frame and apply it. Returns `true` when the stream should stop.
    fn handle_frame(&self, frame: SseFrame) -> bool {
        let name = frame.event.clone();
        match frame.into_event() {
            Ok(event) => self.apply(&event),
            Err(e) => {
                warn!(event = %name, error = %e, "Dropped malformed event");
                false
            }
        }
    }

    /// Act on an event. Returns `true` for `disconnect`.
    pub fn apply(&self, event: &Event) -> bool {
        match event {
            Event::CommandPower(command) => {
                info!(
                    from = self.power.consumption(),
                    to = command.power,
                    "Power level changed"
                );
                self.power.change(command.power);
                false
            }
            Event::Message(message) => {
                debug!(message = %message.message, "Server message");
                false
            }
            Event::Registration(status) => {
                info!(status = status.code(), "Registration status");
                false
            }
            Event::Disconnect => {
                info!("Server requested disconnect");
                true
            }
            Event::None => {
                debug!("Ignored unknown event");
                false
            }
        }
    }

    /// Post the current consumption sample
    pub async fn report(&self) -> AgentResult<()> {
        let consumption = self.power.consumption();
        let form = [
            ("consumption", consumption.to_string()),
            ("recorded_at", Utc::now().timestamp().to_string()),
        ];

        let url = self.config.endpoint("/client/report");
        let response = self
            .authorize(self.http_client.post(&url))
            .timeout(REPORT_TIMEOUT)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        Self::check_response(response).await?;

        debug!(consumption, "Consumption reported");
        Ok(())
    }

    /// Follow one stream, reporting consumption on every tick if enabled
    pub async fn run(&self) -> AgentResult<StreamEnd> {
        let stream = self.register();
        tokio::pin!(stream);

        if !self.config.report_consumption {
            return stream.await;
        }

        let interval = self.config.report_interval;
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                end = &mut stream => return end,
                _ = ticker.tick() => {
                    if let Err(e) = self.report().await {
                        warn!(error = %e, "Consumption report failed");
                    }
                }
            }
        }
    }

    /// Keep a stream open until the server sends `disconnect`
    ///
    /// A stream that closes on its own, or a transient failure, triggers a reconnect with
    /// exponential backoff. Non-retryable rejections are returned.
    pub async fn run_until_disconnected(&self) -> AgentResult<()> {
        let mut delay = self.retry_base_delay;

        loop {
            match self.run().await {
                Ok(StreamEnd::Disconnected) => return Ok(()),
                Ok(StreamEnd::Closed) => {
                    warn!("Event stream closed by server, reconnecting");
                    delay = self.retry_base_delay;
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "Retrying after transient error");
                }
                Err(e) => return Err(e),
            }

            time::sleep(delay).await;
            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }
    }
}
