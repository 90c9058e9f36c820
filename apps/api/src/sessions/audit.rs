//! Best-effort activity audit
//!
//! Joins and leaves are recorded off the dispatch loop by a single worker, so a slow
//! store never stalls admission while the on/off trail of a device stays in order.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::ActivityStatus;
use crate::repositories::{DeviceStore, StoreError};

#[derive(Debug)]
struct AuditEntry {
    device_id: String,
    status: ActivityStatus,
}

/// Handle used by the dispatch loop to queue audit entries
#[derive(Clone)]
pub(crate) struct ActivityAudit {
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl ActivityAudit {
    /// Spawn the worker. It exits once every handle is dropped and the backlog is written.
    pub(crate) fn spawn(store: Arc<dyn DeviceStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                match store.record_activity(&entry.device_id, entry.status).await {
                    Ok(()) => {}
                    // The device was deleted while its session was closing
                    Err(StoreError::NotFound(_)) => tracing::debug!(
                        device_id = %entry.device_id,
                        status = %entry.status,
                        "Skipped activity of deleted device"
                    ),
                    Err(e) => tracing::warn!(
                        device_id = %entry.device_id,
                        status = %entry.status,
                        error = %e,
                        "Failed to record device activity"
                    ),
                }
            }
            tracing::debug!("Activity audit worker stopped");
        });

        Self { tx }
    }

    pub(crate) fn record(&self, device_id: &str, status: ActivityStatus) {
        let entry = AuditEntry {
            device_id: device_id.to_string(),
            status,
        };
        if self.tx.send(entry).is_err() {
            tracing::warn!(device_id = %device_id, "Activity audit worker is gone");
        }
    }
}
