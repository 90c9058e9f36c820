//! In-memory device store
//!
//! Single-process fallback for development and tests. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use wattline_protocol::DeviceType;

use super::store::{DeviceStore, StoreError, StoreResult};
use crate::models::{
    ActivityStatus, CommandExecution, Device, DeviceActivity, DeviceConsumption,
    NewCommandExecution, PageParams, Paged,
};

#[derive(Default)]
struct MemoryState {
    devices: HashMap<String, Device>,
    activities: Vec<DeviceActivity>,
    commands: Vec<CommandExecution>,
    consumptions: Vec<DeviceConsumption>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_device(&self, id: &str) -> StoreResult<()> {
        if self.devices.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }
}

/// Device store kept entirely in process memory
#[derive(Default)]
pub struct InMemoryDeviceStore {
    state: RwLock<MemoryState>,
    offline: AtomicBool,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`] until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Activity trail of one device, oldest first
    pub async fn activity_log(&self, id: &str) -> Vec<ActivityStatus> {
        self.state
            .read()
            .await
            .activities
            .iter()
            .filter(|a| a.device_id == id)
            .map(|a| ActivityStatus::from_i16(a.status))
            .collect()
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

fn paginate<T: Clone>(rows: Vec<&T>, page: PageParams) -> Paged<T> {
    let count = rows.len() as i64;
    let data = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect();
    Paged::new(data, count)
}

#[axum::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn get_device(&self, id: &str) -> StoreResult<Option<Device>> {
        self.check_online()?;
        Ok(self.state.read().await.devices.get(id).cloned())
    }

    async fn get_or_create_device(&self, id: &str, device_type: DeviceType) -> StoreResult<bool> {
        self.check_online()?;
        let mut state = self.state.write().await;
        if state.devices.contains_key(id) {
            return Ok(false);
        }
        let now = Utc::now();
        state.devices.insert(
            id.to_string(),
            Device {
                id: id.to_string(),
                name: id.to_string(),
                device_type: device_type.as_i32(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn record_activity(&self, id: &str, status: ActivityStatus) -> StoreResult<()> {
        self.check_online()?;
        let mut state = self.state.write().await;
        state.require_device(id)?;
        let activity = DeviceActivity {
            id: state.next_id(),
            device_id: id.to_string(),
            status: status.as_i16(),
            created_at: Utc::now(),
        };
        state.activities.push(activity);
        Ok(())
    }

    async fn record_command_execution(
        &self,
        execution: &NewCommandExecution,
    ) -> StoreResult<CommandExecution> {
        self.check_online()?;
        let mut state = self.state.write().await;
        state.require_device(&execution.device_id)?;
        let row = CommandExecution {
            id: state.next_id(),
            device_id: execution.device_id.clone(),
            code: execution.code,
            payload: execution.payload.clone(),
            delivered: execution.delivered,
            sent_at: execution.sent_at,
            created_at: Utc::now(),
        };
        state.commands.push(row.clone());
        Ok(row)
    }

    async fn record_consumption(
        &self,
        id: &str,
        consumption: f32,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<DeviceConsumption> {
        self.check_online()?;
        let mut state = self.state.write().await;
        state.require_device(id)?;
        let row = DeviceConsumption {
            id: state.next_id(),
            device_id: id.to_string(),
            consumption,
            recorded_at,
            created_at: Utc::now(),
        };
        state.consumptions.push(row.clone());
        Ok(row)
    }

    async fn list_devices(
        &self,
        page: PageParams,
        device_type: Option<DeviceType>,
    ) -> StoreResult<Paged<Device>> {
        self.check_online()?;
        let state = self.state.read().await;
        let mut rows: Vec<&Device> = state
            .devices
            .values()
            .filter(|d| device_type.map_or(true, |t| d.device_type == t.as_i32()))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(rows, page))
    }

    async fn rename_device(&self, id: &str, name: &str) -> StoreResult<Option<Device>> {
        self.check_online()?;
        let mut state = self.state.write().await;
        Ok(state.devices.get_mut(id).map(|device| {
            device.name = name.to_string();
            device.updated_at = Utc::now();
            device.clone()
        }))
    }

    async fn delete_device(&self, id: &str) -> StoreResult<bool> {
        self.check_online()?;
        let mut state = self.state.write().await;
        if state.devices.remove(id).is_none() {
            return Ok(false);
        }
        state.activities.retain(|a| a.device_id != id);
        state.commands.retain(|c| c.device_id != id);
        state.consumptions.retain(|c| c.device_id != id);
        Ok(true)
    }

    async fn list_consumptions(
        &self,
        id: &str,
        page: PageParams,
    ) -> StoreResult<Paged<DeviceConsumption>> {
        self.check_online()?;
        let state = self.state.read().await;
        let mut rows: Vec<&DeviceConsumption> = state
            .consumptions
            .iter()
            .filter(|c| c.device_id == id)
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn list_command_executions(
        &self,
        id: &str,
        page: PageParams,
        code: Option<i32>,
    ) -> StoreResult<Paged<CommandExecution>> {
        self.check_online()?;
        let state = self.state.read().await;
        let mut rows: Vec<&CommandExecution> = state
            .commands
            .iter()
            .filter(|c| c.device_id == id && code.map_or(true, |code| c.code == code))
            .collect();
        rows.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_online()
    }
}
