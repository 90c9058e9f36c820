//! Control-plane route handlers
//!
//! Operator-facing endpoints, nested under `/user/client`:
//! - `POST /command` - Send a command to a device
//! - `GET /list` - Page through devices
//! - `GET /info`, `POST /info`, `DELETE /info` - Inspect, rename or delete a device
//! - `GET /consumption` - Page through consumption samples
//! - `GET /command` - Page through command executions
//! - `GET /active` - Ids of connected devices

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use wattline_protocol::{DeviceType, Event};

use super::StatusResponse;
use crate::error::{ApiError, ApiResult};
use crate::models::device::validate_device_name;
use crate::models::{
    CommandExecution, DeviceConsumption, DeviceView, NewCommandExecution, PageParams, Paged,
};
use crate::repositories::DeviceStore;
use crate::sessions::SessionManager;

/// Shared state for control-plane handlers
#[derive(Clone)]
pub struct ControlState {
    pub manager: SessionManager,
    pub store: Arc<dyn DeviceStore>,
}

impl ControlState {
    pub fn new(manager: SessionManager, store: Arc<dyn DeviceStore>) -> Self {
        Self { manager, store }
    }

    async fn device_view(&self, id: &str) -> ApiResult<DeviceView> {
        let device = self
            .store
            .get_device(id)
            .await?
            .ok_or_else(|| ApiError::not_found("device", id))?;
        Ok(DeviceView::new(device, self.manager.connected_since(id)))
    }

    async fn require_device(&self, id: &str) -> ApiResult<()> {
        self.store
            .get_device(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found("device", id))
    }
}

/// Create control-plane router
pub fn control_router(state: ControlState) -> Router {
    Router::new()
        .route("/command", post(send_command).get(list_commands))
        .route("/list", get(list_devices))
        .route(
            "/info",
            get(device_info).post(rename_device).delete(delete_device),
        )
        .route("/consumption", get(list_consumptions))
        .route("/active", get(active_devices))
        .with_state(state)
}

// ========== Request Types ==========

/// Command form
#[derive(Debug, Deserialize)]
pub struct CommandForm {
    pub client_id: Option<String>,
    /// Command kind; only `power` is supported
    pub command: Option<String>,
    pub data: Option<String>,
}

/// Rename form
#[derive(Debug, Deserialize)]
pub struct RenameForm {
    pub client_id: Option<String>,
    pub name: Option<String>,
}

/// Query parameters shared by the control-plane listings
///
/// Every field is kept as text so malformed values produce a JSON error body.
#[derive(Debug, Default, Deserialize)]
pub struct ControlQuery {
    pub client_id: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub code: Option<String>,
}

impl ControlQuery {
    fn client_id(&self) -> ApiResult<&str> {
        required(self.client_id.as_deref(), "client_id")
    }

    fn page(&self) -> ApiResult<PageParams> {
        Ok(PageParams::new(
            parse_param("page", self.page.as_deref())?,
            parse_param("size", self.size.as_deref())?,
        ))
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> ApiResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingField(name))
}

/// Parse an optional query value; blank counts as absent
fn parse_param<T>(name: &'static str, raw: Option<&str>) -> ApiResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| ApiError::invalid_param(name, e.to_string())),
    }
}

/// Build the event for a command kind and its argument
fn build_command(command: &str, data: &str) -> ApiResult<Event> {
    let data = data
        .parse::<i64>()
        .map_err(|e| ApiError::ValidationError(format!("data: {e}")))?;

    match command {
        "power" | "command-power" => Ok(Event::command_power(data)),
        other => Err(ApiError::ValidationError(format!(
            "command not supported: {other}"
        ))),
    }
}

// ========== Handlers ==========

/// Send a command to a device
///
/// The execution is recorded whether or not the device was reachable.
///
/// # Response
/// - 200 `{"status":"success"}` when the command was queued
/// - 404 if the device is unknown
/// - 409 if the device has no stream
async fn send_command(
    State(state): State<ControlState>,
    Form(form): Form<CommandForm>,
) -> ApiResult<Json<StatusResponse>> {
    let client_id = required(form.client_id.as_deref(), "client_id")?;
    let command = required(form.command.as_deref(), "command")?;
    let data = required(form.data.as_deref(), "data")?;
    let event = build_command(command, data)?;

    state.require_device(client_id).await?;

    let sent_at = Utc::now();
    let delivered = match state.manager.command(client_id, event.clone()) {
        Ok(()) => true,
        Err(e) => {
            tracing::info!(device_id = %client_id, error = %e, "Command not delivered");
            false
        }
    };

    state
        .store
        .record_command_execution(&NewCommandExecution {
            device_id: client_id.to_string(),
            code: event.code().code(),
            payload: event.encode_payload(),
            delivered,
            sent_at,
        })
        .await?;

    tracing::info!(
        device_id = %client_id,
        command = %event.code(),
        payload = %event.encode_payload(),
        delivered,
        "Command issued"
    );

    if delivered {
        Ok(Json(StatusResponse::success()))
    } else {
        Err(ApiError::NotConnected(client_id.to_string()))
    }
}

/// Page through devices, optionally filtered by `type`
async fn list_devices(
    State(state): State<ControlState>,
    Query(query): Query<ControlQuery>,
) -> ApiResult<Json<Paged<DeviceView>>> {
    let page = query.page()?;
    let device_type: Option<DeviceType> = parse_param("type", query.device_type.as_deref())?;

    let devices = state.store.list_devices(page, device_type).await?;
    let manager = &state.manager;
    Ok(Json(devices.map(|device| {
        let connected_since = manager.connected_since(&device.id);
        DeviceView::new(device, connected_since)
    })))
}

async fn device_info(
    State(state): State<ControlState>,
    Query(query): Query<ControlQuery>,
) -> ApiResult<Json<DeviceView>> {
    let client_id = query.client_id()?;
    Ok(Json(state.device_view(client_id).await?))
}

async fn rename_device(
    State(state): State<ControlState>,
    Form(form): Form<RenameForm>,
) -> ApiResult<Json<DeviceView>> {
    let client_id = required(form.client_id.as_deref(), "client_id")?;
    let name = form.name.as_deref().unwrap_or_default();
    validate_device_name(name)?;

    let device = state
        .store
        .rename_device(client_id, name)
        .await?
        .ok_or_else(|| ApiError::not_found("device", client_id))?;

    tracing::info!(device_id = %client_id, name = %name, "Device renamed");
    let connected_since = state.manager.connected_since(client_id);
    Ok(Json(DeviceView::new(device, connected_since)))
}

/// Delete a device; a connected device is told to disconnect first
async fn delete_device(
    State(state): State<ControlState>,
    Query(query): Query<ControlQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let client_id = query.client_id()?;

    if state.manager.command(client_id, Event::Disconnect).is_ok() {
        tracing::info!(device_id = %client_id, "Disconnecting deleted device");
    }

    if !state.store.delete_device(client_id).await? {
        return Err(ApiError::not_found("device", client_id));
    }

    tracing::info!(device_id = %client_id, "Device deleted");
    Ok(Json(StatusResponse::success()))
}

async fn list_consumptions(
    State(state): State<ControlState>,
    Query(query): Query<ControlQuery>,
) -> ApiResult<Json<Paged<DeviceConsumption>>> {
    let client_id = query.client_id()?;
    let page = query.page()?;
    state.require_device(client_id).await?;

    Ok(Json(state.store.list_consumptions(client_id, page).await?))
}

/// Page through command executions, optionally filtered by event `code`
async fn list_commands(
    State(state): State<ControlState>,
    Query(query): Query<ControlQuery>,
) -> ApiResult<Json<Paged<CommandExecution>>> {
    let client_id = query.client_id()?;
    let page = query.page()?;
    let code: Option<i32> = parse_param("code", query.code.as_deref())?;
    state.require_device(client_id).await?;

    Ok(Json(
        state
            .store
            .list_command_executions(client_id, page, code)
            .await?,
    ))
}

async fn active_devices(State(state): State<ControlState>) -> Json<Paged<String>> {
    let ids = state.manager.active_ids();
    let count = ids.len() as i64;
    Json(Paged::new(ids, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_build_command() {
        assert_eq!(
            build_command("power", "120").unwrap(),
            Event::command_power(120)
        );
        assert_matches!(
            build_command("reboot", "1"),
            Err(ApiError::ValidationError(_))
        );
        assert_matches!(
            build_command("power", "high"),
            Err(ApiError::ValidationError(_))
        );
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param::<i64>("page", Some("3")).unwrap(), Some(3));
        assert_eq!(parse_param::<i64>("page", Some(" ")).unwrap(), None);
        assert_eq!(parse_param::<i64>("page", None).unwrap(), None);
        assert_matches!(
            parse_param::<i64>("page", Some("two")),
            Err(ApiError::InvalidQueryParam { name: "page", .. })
        );
    }

    #[test]
    fn test_page_from_query() {
        let query = ControlQuery {
            page: Some("0".to_string()),
            size: Some("500".to_string()),
            ..Default::default()
        };
        assert_eq!(query.page().unwrap(), PageParams { page: 1, size: 100 });
    }
}
