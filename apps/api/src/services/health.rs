//! Health check service for verifying the server's dependencies
//!
//! Readiness covers:
//! - The device store (PostgreSQL or in-memory)
//! - The session registry dispatch task

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::repositories::{bounded, DeviceStore};
use crate::sessions::SessionManager;

/// Upper bound on a single dependency check
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Status of an individual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Service is healthy and responding
    Healthy,
    /// Service is unhealthy or unreachable
    Unhealthy,
}

/// Result of a single service health check
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Name of the service
    pub name: &'static str,
    /// Current status
    pub status: ServiceStatus,
    /// Response time in milliseconds (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Additional details about the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceHealth {
    /// Create a healthy service result
    pub fn healthy(name: &'static str, response_time: Duration) -> Self {
        Self {
            name,
            status: ServiceStatus::Healthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: None,
            details: None,
        }
    }

    /// Create a healthy service result with details
    pub fn healthy_with_details(
        name: &'static str,
        response_time: Duration,
        details: serde_json::Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::healthy(name, response_time)
        }
    }

    /// Create an unhealthy service result
    pub fn unhealthy(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Unhealthy,
            response_time_ms: None,
            error: Some(error.into()),
            details: None,
        }
    }
}

/// Aggregated health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Overall status (healthy only if all services are healthy)
    pub status: ServiceStatus,
    /// Individual service health results
    pub services: Vec<ServiceHealth>,
    /// Total time to complete all health checks
    pub total_time_ms: u64,
    /// API version
    pub version: &'static str,
}

impl HealthCheckResponse {
    /// Create a new health check response from individual service results
    pub fn new(services: Vec<ServiceHealth>, total_time: Duration) -> Self {
        let status = if services.iter().all(|s| s.status == ServiceStatus::Healthy) {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            status,
            services,
            total_time_ms: total_time.as_millis() as u64,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Check if overall health is good
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Health check service for verifying dependencies
#[derive(Clone)]
pub struct HealthService {
    store: Arc<dyn DeviceStore>,
    manager: SessionManager,
}

impl HealthService {
    pub fn new(store: Arc<dyn DeviceStore>, manager: SessionManager) -> Self {
        Self { store, manager }
    }

    /// Round trip to the device store
    pub async fn check_store(&self) -> ServiceHealth {
        let start = Instant::now();
        match bounded(CHECK_TIMEOUT, self.store.ping()).await {
            Ok(()) => ServiceHealth::healthy("store", start.elapsed()),
            Err(e) => {
                tracing::warn!(error = %e, "Store health check failed");
                ServiceHealth::unhealthy("store", e.to_string())
            }
        }
    }

    /// Whether the registry still accepts devices
    pub fn check_registry(&self) -> ServiceHealth {
        if self.manager.is_running() {
            ServiceHealth::healthy_with_details(
                "registry",
                Duration::ZERO,
                serde_json::json!({ "active_sessions": self.manager.count() }),
            )
        } else {
            ServiceHealth::unhealthy("registry", "session registry is not running")
        }
    }

    /// Run all checks
    pub async fn check_all(&self) -> HealthCheckResponse {
        let start = Instant::now();
        let services = vec![self.check_store().await, self.check_registry()];
        HealthCheckResponse::new(services, start.elapsed())
    }
}
