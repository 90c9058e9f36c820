//! Common test utilities for API integration tests
//!
//! This module provides shared test infrastructure for integration tests,
//! including an in-memory application, request builders and stream readers.

#![allow(unused_imports)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
