//! Device persistence interface
//!
//! The session registry and the HTTP routes only see [`DeviceStore`]. Two backends
//! implement it: [`super::PgDeviceStore`] for PostgreSQL and
//! [`super::InMemoryDeviceStore`] for single-process deployments and tests.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use wattline_protocol::DeviceType;

use crate::models::{
    ActivityStatus, CommandExecution, Device, DeviceConsumption, NewCommandExecution, PageParams,
    Paged,
};

/// Errors raised by a device store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable record of devices and everything they did
#[axum::async_trait]
pub trait DeviceStore: Send + Sync {
    /// Look a device up by id
    async fn get_device(&self, id: &str) -> StoreResult<Option<Device>>;

    /// Create the device if missing. Returns `true` when a new row was inserted.
    ///
    /// An existing device keeps its stored type and name.
    async fn get_or_create_device(&self, id: &str, device_type: DeviceType) -> StoreResult<bool>;

    /// Append an on/off entry to the activity trail
    async fn record_activity(&self, id: &str, status: ActivityStatus) -> StoreResult<()>;

    async fn record_command_execution(
        &self,
        execution: &NewCommandExecution,
    ) -> StoreResult<CommandExecution>;

    async fn record_consumption(
        &self,
        id: &str,
        consumption: f32,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<DeviceConsumption>;

    /// List devices, newest first, optionally restricted to one type
    async fn list_devices(
        &self,
        page: PageParams,
        device_type: Option<DeviceType>,
    ) -> StoreResult<Paged<Device>>;

    /// Change the display name. Returns `None` if the device does not exist.
    async fn rename_device(&self, id: &str, name: &str) -> StoreResult<Option<Device>>;

    /// Delete a device and its history. Returns `false` if it did not exist.
    async fn delete_device(&self, id: &str) -> StoreResult<bool>;

    async fn list_consumptions(
        &self,
        id: &str,
        page: PageParams,
    ) -> StoreResult<Paged<DeviceConsumption>>;

    async fn list_command_executions(
        &self,
        id: &str,
        page: PageParams,
        code: Option<i32>,
    ) -> StoreResult<Paged<CommandExecution>>;

    /// Cheap round trip used by readiness checks
    async fn ping(&self) -> StoreResult<()>;
}

/// Run a store call, failing with [`StoreError::Timeout`] if it takes longer than `limit`
pub async fn bounded<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: StoreResult<()> = bounded(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert_matches!(result, Err(StoreError::Timeout(d)) if d == Duration::from_millis(50));
    }
}
