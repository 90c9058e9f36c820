//! Database repository layer for Wattline
//!
//! This module provides the data access layer. Everything above it talks to the
//! [`DeviceStore`] trait, so the PostgreSQL and in-memory backends are interchangeable.

pub mod device;
pub mod memory;
pub mod store;

pub use device::PgDeviceStore;
pub use memory::InMemoryDeviceStore;
pub use store::{bounded, DeviceStore, StoreError, StoreResult};
