//! Device-facing route handlers
//!
//! Provides endpoints used by the devices themselves (all require the device headers):
//! - `POST /client/register` - Open the server-sent event stream
//! - `POST /client/report` - Report a consumption sample

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event as SseEvent, Sse},
    routing::post,
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};
use serde::Deserialize;

use super::StatusResponse;
use crate::error::{ApiError, ApiResult};
use crate::middleware::DeviceAuth;
use crate::repositories::DeviceStore;
use crate::sessions::{ConnectedSession, SessionManager};

/// Shared state for device handlers
#[derive(Clone)]
pub struct DeviceState {
    pub manager: SessionManager,
    pub store: Arc<dyn DeviceStore>,
}

impl DeviceState {
    pub fn new(manager: SessionManager, store: Arc<dyn DeviceStore>) -> Self {
        Self { manager, store }
    }
}

/// Create device router
pub fn device_router(state: DeviceState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/report", post(report))
        .with_state(state)
}

/// Turn a connected session into a stream of SSE frames
///
/// The stream ends after a `disconnect` frame or once the session is closed. Dropping
/// the stream drops the session, which deregisters it.
pub fn session_stream(
    conn: ConnectedSession,
) -> impl Stream<Item = Result<SseEvent, Infallible>> + Send {
    stream::unfold(Some(conn), |state| async move {
        let mut conn = state?;
        let event = conn.next_outbound().await?;

        let frame = SseEvent::default()
            .event(event.name())
            .data(event.encode_payload());

        let next = if event.is_disconnect() {
            tracing::debug!(device_id = %conn.id(), "Disconnect sent, ending stream");
            None
        } else {
            Some(conn)
        };
        Some((Ok(frame), next))
    })
}

/// Open the event stream for an authenticated device
///
/// # Response
/// - 200 `text/event-stream`; the first event is `message{"message":"connected"}`
/// - 409 if the device already has a stream
async fn register(
    State(state): State<DeviceState>,
    auth: DeviceAuth,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let conn = state
        .manager
        .register(auth.device_id.clone(), auth.device_type)
        .await?;

    tracing::info!(
        device_id = %auth.device_id,
        device_type = %auth.device_type,
        "Device stream opened"
    );

    Ok(Sse::new(session_stream(conn)))
}

/// Consumption report form
#[derive(Debug, Deserialize)]
pub struct ReportForm {
    pub consumption: Option<String>,
    /// Unix seconds; defaults to now
    pub recorded_at: Option<String>,
}

/// Store a consumption sample for a connected device
async fn report(
    State(state): State<DeviceState>,
    auth: DeviceAuth,
    Form(form): Form<ReportForm>,
) -> ApiResult<Json<StatusResponse>> {
    if !state.manager.is_active(&auth.device_id) {
        return Err(ApiError::NotConnected(auth.device_id));
    }

    let consumption = form
        .consumption
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingField("consumption"))?
        .parse::<f32>()
        .map_err(|e| ApiError::ValidationError(format!("consumption: {e}")))?;
    if !consumption.is_finite() {
        return Err(ApiError::ValidationError(
            "consumption must be a finite number".to_string(),
        ));
    }

    let recorded_at = parse_recorded_at(form.recorded_at.as_deref())?;

    state
        .store
        .record_consumption(&auth.device_id, consumption, recorded_at)
        .await?;

    tracing::debug!(device_id = %auth.device_id, consumption, "Consumption recorded");
    Ok(Json(StatusResponse::success()))
}

fn parse_recorded_at(raw: Option<&str>) -> ApiResult<DateTime<Utc>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Utc::now()),
        Some(raw) => {
            let secs = raw
                .parse::<i64>()
                .map_err(|e| ApiError::ValidationError(format!("recorded_at: {e}")))?;
            DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                ApiError::ValidationError(format!("recorded_at out of range: {secs}"))
            })
        }
    }
}
