//! Test fixtures for API integration tests
//!
//! Builds the full application over an in-memory store, plus request builders for
//! the device and control-plane endpoints.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use tower::ServiceExt;
use wattline_api::repositories::{DeviceStore, InMemoryDeviceStore};
use wattline_api::services::Authenticator;
use wattline_api::{app_router, AppServices, RegistryConfig, SessionManager};
use wattline_protocol::{
    derive_token, DeviceType, HEADER_AUTHORIZATION, HEADER_CLIENT_ID, HEADER_CLIENT_TYPE,
};

/// Store timeout used by test apps; short so failure paths finish fast
pub const TEST_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// A running application backed by [`InMemoryDeviceStore`]
pub struct TestApp {
    pub router: Router,
    pub manager: SessionManager,
    pub store: Arc<InMemoryDeviceStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryDeviceStore::new());
        let dyn_store: Arc<dyn DeviceStore> = store.clone();

        let manager = SessionManager::start(
            dyn_store.clone(),
            RegistryConfig {
                store_timeout: TEST_STORE_TIMEOUT,
                ..Default::default()
            },
        );
        let authenticator =
            Authenticator::new(dyn_store.clone()).with_store_timeout(TEST_STORE_TIMEOUT);
        let services =
            AppServices::new(manager.clone(), dyn_store).with_authenticator(authenticator);

        Self {
            router: app_router(services),
            manager,
            store,
        }
    }

    /// Send one request through the router
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Open a stream for a device with a correctly derived token
    pub async fn register(&self, id: &str, device_type: DeviceType) -> Response<Body> {
        self.send(register_request(id, device_type)).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}

/// Attach the three device headers with a valid token
pub fn with_device_headers(
    builder: axum::http::request::Builder,
    id: &str,
    device_type: DeviceType,
) -> axum::http::request::Builder {
    with_raw_device_headers(
        builder,
        id,
        &device_type.to_string(),
        &derive_token(id, device_type),
    )
}

/// Attach the device headers verbatim
pub fn with_raw_device_headers(
    builder: axum::http::request::Builder,
    id: &str,
    device_type: &str,
    token: &str,
) -> axum::http::request::Builder {
    builder
        .header(HEADER_CLIENT_ID, id)
        .header(HEADER_CLIENT_TYPE, device_type)
        .header(HEADER_AUTHORIZATION, token)
}

pub fn register_request(id: &str, device_type: DeviceType) -> Request<Body> {
    with_device_headers(
        Request::builder().method(Method::POST).uri("/client/register"),
        id,
        device_type,
    )
    .body(Body::empty())
    .unwrap()
}

pub fn report_request(id: &str, device_type: DeviceType, form: &str) -> Request<Body> {
    with_device_headers(
        Request::builder()
            .method(Method::POST)
            .uri("/client/report")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
        id,
        device_type,
    )
    .body(Body::from(form.to_string()))
    .unwrap()
}

pub fn form_request(method: Method, uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
