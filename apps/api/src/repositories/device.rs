//! PostgreSQL device store
//!
//! Devices are keyed by their client-chosen id. Activity, command and consumption rows
//! reference the device and are removed with it.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use wattline_protocol::DeviceType;

use super::store::{DeviceStore, StoreError, StoreResult};
use crate::models::{
    ActivityStatus, CommandExecution, Device, DeviceConsumption, NewCommandExecution, PageParams,
    Paged,
};

/// SQL columns for device queries
const DEVICE_COLUMNS: &str = "id, name, device_type, created_at, updated_at";

/// Repository for device operations backed by PostgreSQL
#[derive(Clone)]
pub struct PgDeviceStore {
    pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Rows referencing a missing device fail the foreign key; report those as `NotFound`.
fn map_missing_device(id: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |err| match err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            StoreError::NotFound(id.to_string())
        }
        other => StoreError::Database(other),
    }
}

#[axum::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn get_device(&self, id: &str) -> StoreResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    async fn get_or_create_device(&self, id: &str, device_type: DeviceType) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO devices (id, name, device_type)
            VALUES ($1, $1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(device_type.as_i32())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_activity(&self, id: &str, status: ActivityStatus) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_activities (device_id, status)
            VALUES ($1, $2)
            "#,
        )
        .bind(id)
        .bind(status.as_i16())
        .execute(&self.pool)
        .await
        .map_err(map_missing_device(id))?;

        Ok(())
    }

    async fn record_command_execution(
        &self,
        execution: &NewCommandExecution,
    ) -> StoreResult<CommandExecution> {
        sqlx::query_as::<_, CommandExecution>(
            r#"
            INSERT INTO command_executions (device_id, code, payload, delivered, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, device_id, code, payload, delivered, sent_at, created_at
            "#,
        )
        .bind(&execution.device_id)
        .bind(execution.code)
        .bind(&execution.payload)
        .bind(execution.delivered)
        .bind(execution.sent_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_missing_device(&execution.device_id))
    }

    async fn record_consumption(
        &self,
        id: &str,
        consumption: f32,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<DeviceConsumption> {
        sqlx::query_as::<_, DeviceConsumption>(
            r#"
            INSERT INTO device_consumptions (device_id, consumption, recorded_at)
            VALUES ($1, $2, $3)
            RETURNING id, device_id, consumption, recorded_at, created_at
            "#,
        )
        .bind(id)
        .bind(consumption)
        .bind(recorded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_missing_device(id))
    }

    async fn list_devices(
        &self,
        page: PageParams,
        device_type: Option<DeviceType>,
    ) -> StoreResult<Paged<Device>> {
        let device_type = device_type.map(DeviceType::as_i32);

        let devices = sqlx::query_as::<_, Device>(&format!(
            r#"
            SELECT {DEVICE_COLUMNS}
            FROM devices
            WHERE ($1::INT IS NULL OR device_type = $1)
            ORDER BY created_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(device_type)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM devices WHERE ($1::INT IS NULL OR device_type = $1)"#,
        )
        .bind(device_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(Paged::new(devices, count))
    }

    async fn rename_device(&self, id: &str, name: &str) -> StoreResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(&format!(
            r#"
            UPDATE devices
            SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    async fn delete_device(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_consumptions(
        &self,
        id: &str,
        page: PageParams,
    ) -> StoreResult<Paged<DeviceConsumption>> {
        let rows = sqlx::query_as::<_, DeviceConsumption>(
            r#"
            SELECT id, device_id, consumption, recorded_at, created_at
            FROM device_consumptions
            WHERE device_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let count: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM device_consumptions WHERE device_id = $1"#)
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(Paged::new(rows, count))
    }

    async fn list_command_executions(
        &self,
        id: &str,
        page: PageParams,
        code: Option<i32>,
    ) -> StoreResult<Paged<CommandExecution>> {
        let rows = sqlx::query_as::<_, CommandExecution>(
            r#"
            SELECT id, device_id, code, payload, delivered, sent_at, created_at
            FROM command_executions
            WHERE device_id = $1 AND ($2::INT IS NULL OR code = $2)
            ORDER BY sent_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM command_executions
            WHERE device_id = $1 AND ($2::INT IS NULL OR code = $2)
            "#,
        )
        .bind(id)
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        Ok(Paged::new(rows, count))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
