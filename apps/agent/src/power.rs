//! Power level of the simulated device

use std::sync::atomic::{AtomicI64, Ordering};

/// Current power level; read by the reporter, written by `command-power` events
#[derive(Debug, Default)]
pub struct PowerMode {
    factor: AtomicI64,
}

impl PowerMode {
    pub fn new(factor: i64) -> Self {
        Self {
            factor: AtomicI64::new(factor),
        }
    }

    pub fn change(&self, factor: i64) {
        self.factor.store(factor, Ordering::SeqCst);
    }

    /// Instantaneous consumption reported to the server
    pub fn consumption(&self) -> i64 {
        self.factor.load(Ordering::SeqCst)
    }
}
