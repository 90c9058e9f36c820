//! Integration tests for health check endpoints
//!
//! Tests the health check API routes to ensure proper responses
//! for liveness and readiness probes.

mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn test_root_endpoint() {
    let app = TestApp::new();

    let response = app.send(get_request("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Wattline"));
}

#[tokio::test]
async fn test_simple_health_check() {
    let app = TestApp::new();

    let response = app.send(get_request("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();

    let response = app.send(get_request("/health/live")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok());
    assert!(content_type.unwrap().contains("application/json"));

    let json = body_json(response).await;
    assert_eq!(json["status"], "alive");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_reports_store_and_registry() {
    let app = TestApp::new();

    let response = app.send(get_request("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    let names: Vec<&str> = json["services"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["store", "registry"]);
}

#[tokio::test]
async fn test_readiness_fails_when_store_is_down() {
    let app = TestApp::new();
    app.store.set_offline(true);

    let response = app.send(get_request("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");
}

#[tokio::test]
async fn test_readiness_fails_after_shutdown() {
    let app = TestApp::new();
    app.manager.shutdown();

    let manager = app.manager.clone();
    wait_for("registry stop", || !manager.is_running()).await;

    let response = app.send(get_request("/health/ready")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_nonexistent_route_returns_404() {
    let app = TestApp::new();

    let response = app.send(get_request("/nonexistent")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
