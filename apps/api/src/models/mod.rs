//! Database models and types for Wattline
//!
//! This module contains SQLx models for:
//! - Devices and their on/off activity trail
//! - Command executions and consumption samples
//! - Paging of control-plane listings

pub mod device;
pub mod page;

pub use device::{
    ActivityStatus, CommandExecution, Device, DeviceActivity, DeviceConsumption, DeviceView,
    NewCommandExecution,
};
pub use page::{PageParams, Paged};
