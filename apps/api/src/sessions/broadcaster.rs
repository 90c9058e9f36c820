//! Periodic liveness signal pushed to every connected device

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use wattline_protocol::Event;

use super::manager::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("broadcast interval must be greater than zero")]
pub struct ZeroInterval;

/// Broadcasts the current time as a `message` event on a fixed interval
#[derive(Debug, Clone)]
pub struct LivenessBroadcaster {
    manager: SessionManager,
    interval: Duration,
}

impl LivenessBroadcaster {
    pub fn new(manager: SessionManager, interval: Duration) -> Result<Self, ZeroInterval> {
        if interval.is_zero() {
            return Err(ZeroInterval);
        }
        Ok(Self { manager, interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Tick until the registry stops. The first tick fires one interval after start.
    pub async fn run(self) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Liveness broadcaster started");

        loop {
            ticker.tick().await;
            let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            if self.manager.broadcast(Event::message(stamp)).await.is_err() {
                break;
            }
        }

        tracing::info!("Liveness broadcaster stopped");
    }
}
