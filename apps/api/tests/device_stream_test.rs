//! Integration tests for the device endpoints
//!
//! Opens real event streams through the router and follows them frame by frame.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::*;
use wattline_api::models::ActivityStatus;
use wattline_protocol::{derive_token, DeviceType, Event, RegistrationStatus};

#[tokio::test]
async fn test_register_streams_welcome_first() {
    let app = TestApp::new();

    let response = app.register("lamp1", DeviceType::SWITCH).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let mut reader = FrameReader::new(response);
    let frame = reader.next_frame().await.unwrap();
    assert_eq!(frame.event, "message");
    assert_eq!(frame.into_event().unwrap(), Event::message("connected"));

    assert!(app.manager.is_active("lamp1"));
    assert_eq!(app.manager.active_ids(), vec!["lamp1".to_string()]);
}

#[tokio::test]
async fn test_first_registration_creates_device() {
    let app = TestApp::new();

    let mut reader = FrameReader::new(app.register("heater7", DeviceType(3)).await);
    reader.next_event().await;

    let info = app
        .send(get_request("/user/client/info?client_id=heater7"))
        .await;
    assert_eq!(info.status(), StatusCode::OK);
    let body = body_json(info).await;
    assert_eq!(body["id"], "heater7");
    assert_eq!(body["name"], "heater7");
    assert_eq!(body["device_type"], 3);
    assert_eq!(body["is_active"], true);
    assert_eq!(
        body["connected_since"],
        serde_json::to_value(app.manager.connected_since("heater7").unwrap()).unwrap()
    );
}

#[tokio::test]
async fn test_command_is_delivered_on_stream() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
    assert_eq!(reader.next_event().await, Event::message("connected"));

    let response = app
        .send(form_request(
            Method::POST,
            "/user/client/command",
            "client_id=lamp1&command=power&data=42",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "success");

    let frame = reader.next_frame().await.unwrap();
    assert_eq!(frame.event, "command-power");
    assert_eq!(frame.data, r#"{"power":42}"#);
}

#[tokio::test]
async fn test_disconnect_ends_stream_and_deregisters() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
    reader.next_event().await;

    app.manager.command("lamp1", Event::Disconnect).unwrap();

    assert_eq!(reader.next_event().await, Event::Disconnect);
    reader.expect_end().await;
    drop(reader);

    let manager = app.manager.clone();
    wait_for("session removal", || !manager.is_active("lamp1")).await;
}

#[tokio::test]
async fn test_events_queued_after_disconnect_are_never_sent() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
    reader.next_event().await;

    app.manager.command("lamp1", Event::command_power(1)).unwrap();
    app.manager.command("lamp1", Event::Disconnect).unwrap();
    // Still accepted: the stream has not reached the disconnect yet
    app.manager.command("lamp1", Event::command_power(2)).unwrap();

    assert_eq!(reader.next_event().await, Event::command_power(1));
    assert_eq!(reader.next_event().await, Event::Disconnect);
    reader.expect_end().await;
}

#[tokio::test]
async fn test_dropping_stream_deregisters_and_allows_reconnect() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
    reader.next_event().await;
    drop(reader);

    let manager = app.manager.clone();
    wait_for("session removal", || !manager.is_active("lamp1")).await;

    let mut again = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
    assert_eq!(again.next_event().await, Event::message("connected"));
}

#[tokio::test]
async fn test_activity_trail_follows_connections() {
    let app = TestApp::new();

    for _ in 0..2 {
        let mut reader = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
        reader.next_event().await;
        drop(reader);
        let manager = app.manager.clone();
        wait_for("session removal", || !manager.is_active("lamp1")).await;
    }

    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let log = app.store.activity_log("lamp1").await;
        if log.len() == 4 {
            assert_eq!(
                log,
                vec![
                    ActivityStatus::On,
                    ActivityStatus::Off,
                    ActivityStatus::On,
                    ActivityStatus::Off
                ]
            );
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "audit trail incomplete: {log:?}");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_duplicate_registration_is_refused() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
    reader.next_event().await;

    let response = app.register("lamp1", DeviceType::SWITCH).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "DUPLICATE_SESSION");
    assert_eq!(
        body["details"]["registration"],
        RegistrationStatus::ConnectionDuplicated.code()
    );

    // The first stream is untouched
    app.manager.command("lamp1", Event::command_power(1)).unwrap();
    assert_eq!(reader.next_event().await, Event::command_power(1));
}

#[tokio::test]
async fn test_wrong_token_is_rejected() {
    let app = TestApp::new();
    let request = with_raw_device_headers(
        Request::builder().method(Method::POST).uri("/client/register"),
        "lamp1",
        "1",
        &derive_token("lamp1", DeviceType(2)),
    )
    .body(Body::empty())
    .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "AUTH_FAILED");
    assert_eq!(
        body["details"]["registration"],
        RegistrationStatus::IdentityMismatch.code()
    );
    assert!(!app.manager.is_active("lamp1"));
}

#[tokio::test]
async fn test_missing_and_malformed_headers() {
    let app = TestApp::new();

    let no_id = Request::builder()
        .method(Method::POST)
        .uri("/client/register")
        .body(Body::empty())
        .unwrap();
    let response = app.send(no_id).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_IDENTITY");

    let bad_type = with_raw_device_headers(
        Request::builder().method(Method::POST).uri("/client/register"),
        "lamp1",
        "switch",
        "whatever",
    )
    .body(Body::empty())
    .unwrap();
    let response = app.send(bad_type).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_CLIENT_TYPE");

    let bad_id = with_raw_device_headers(
        Request::builder().method(Method::POST).uri("/client/register"),
        "lamp-1",
        "1",
        &derive_token("lamp-1", DeviceType::SWITCH),
    )
    .body(Body::empty())
    .unwrap();
    let response = app.send(bad_id).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_IDENTITY");
}

#[tokio::test]
async fn test_type_change_is_refused() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
    reader.next_event().await;
    drop(reader);
    let manager = app.manager.clone();
    wait_for("session removal", || !manager.is_active("lamp1")).await;

    let response = app.register("lamp1", DeviceType(2)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "TYPE_MISMATCH");
    assert_eq!(
        body["details"]["registration"],
        RegistrationStatus::IdentityMismatch.code()
    );
}

#[tokio::test]
async fn test_store_outage_refuses_registration() {
    let app = TestApp::new();
    app.store.set_offline(true);

    let response = app.register("lamp1", DeviceType::SWITCH).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "PERSISTENCE_ERROR");
    assert!(!app.manager.is_active("lamp1"));

    app.store.set_offline(false);
    let response = app.register("lamp1", DeviceType::SWITCH).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_report_stores_consumption() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("meter1", DeviceType::SWITCH).await);
    reader.next_event().await;

    let response = app
        .send(report_request(
            "meter1",
            DeviceType::SWITCH,
            "consumption=12.5&recorded_at=1700000000",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let listing = app
        .send(get_request("/user/client/consumption?client_id=meter1"))
        .await;
    assert_eq!(listing.status(), StatusCode::OK);
    let body = body_json(listing).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["consumption"], 12.5);
    assert_eq!(body["data"][0]["recorded_at"], "2023-11-14T22:13:20Z");
}

#[tokio::test]
async fn test_report_requires_connected_device() {
    let app = TestApp::new();

    let response = app
        .send(report_request("meter1", DeviceType::SWITCH, "consumption=1"))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "DEVICE_NOT_CONNECTED");
}

#[tokio::test]
async fn test_report_rejects_bad_values() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("meter1", DeviceType::SWITCH).await);
    reader.next_event().await;

    for form in ["", "consumption=lots", "consumption=NaN", "consumption=1&recorded_at=noon"] {
        let response = app
            .send(report_request("meter1", DeviceType::SWITCH, form))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "form {form:?}");
    }
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let app = TestApp::new();
    let mut reader = FrameReader::new(app.register("lamp1", DeviceType::SWITCH).await);
    reader.next_event().await;

    app.manager.shutdown();
    reader.expect_end().await;

    let response = app.register("lamp2", DeviceType::SWITCH).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
