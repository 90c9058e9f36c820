//! HTTP route handlers for the Wattline API
//!
//! This module contains all REST endpoint handlers including:
//! - Device stream and report endpoints
//! - Control-plane endpoints
//! - Health check and status endpoints

pub mod control;
pub mod device;
pub mod health;

use std::sync::Arc;

use axum::{Extension, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub use control::{control_router, ControlState};
pub use device::{device_router, session_stream, DeviceState};
pub use health::{health_router, HealthState};

use crate::repositories::DeviceStore;
use crate::services::{Authenticator, HealthService};
use crate::sessions::SessionManager;

/// Body returned by endpoints that only report success
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self { status: "success" }
    }
}

/// Everything the routers need
#[derive(Clone)]
pub struct AppServices {
    pub manager: SessionManager,
    pub store: Arc<dyn DeviceStore>,
    pub authenticator: Authenticator,
}

impl AppServices {
    pub fn new(manager: SessionManager, store: Arc<dyn DeviceStore>) -> Self {
        let authenticator = Authenticator::new(store.clone());
        Self {
            manager,
            store,
            authenticator,
        }
    }

    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = authenticator;
        self
    }
}

/// Assemble the full application router
pub fn app_router(services: AppServices) -> Router {
    let device_state = DeviceState::new(services.manager.clone(), services.store.clone());
    let control_state = ControlState::new(services.manager.clone(), services.store.clone());
    let health_state = HealthState::new(HealthService::new(
        services.store.clone(),
        services.manager.clone(),
    ));

    Router::new()
        .route("/", axum::routing::get(root))
        // Device routes: /client/register, /client/report
        .nest("/client", device_router(device_state))
        // Control-plane routes: /user/client/*
        .nest("/user/client", control_router(control_state))
        // Nested health routes: /health, /health/live, /health/ready
        .nest("/health", health_router(health_state))
        // Authenticator for the device extractor
        .layer(Extension(services.authenticator))
        .layer(TraceLayer::new_for_http())
}

async fn root() -> &'static str {
    "Wattline device session server"
}
