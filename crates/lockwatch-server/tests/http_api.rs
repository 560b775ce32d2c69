//! End-to-end tests for the HTTP gateway, driven through the router
//! without a real listener.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use lockwatch_server::auth::JwtManager;
use lockwatch_server::probe::ProbeConfig;
use lockwatch_server::server::{AppState, router};
use lockwatch_server::storage::ServerDatabase;

fn fast_probe_config() -> ProbeConfig {
    ProbeConfig {
        resolve_window: Duration::from_millis(50),
        resolve_poll: Duration::from_millis(10),
        reply_timeout: Duration::from_millis(100),
        legacy_window: Duration::from_millis(100),
        legacy_poll: Duration::from_millis(10),
    }
}

async fn test_app() -> (Router, AppState) {
    let db = ServerDatabase::open_in_memory().await.unwrap();
    let jwt = Arc::new(JwtManager::new(b"test-secret", 3600, 604_800));
    let state = AppState::new(db, jwt, fast_probe_config());
    (router(state.clone()), state)
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register_and_login(app: &Router) -> (String, String) {
    let (status, body) = request(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "correct horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let user_id = body["user_id"].as_str().unwrap().to_string();
    let access = body["access_token"].as_str().unwrap().to_string();
    (user_id, access)
}

#[tokio::test]
async fn register_login_and_list_devices() {
    let (app, _state) = test_app().await;
    let (_user_id, access) = register_and_login(&app).await;

    // Fresh account, no devices
    let (status, body) = request(&app, "GET", "/api/devices", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"].as_array().unwrap().len(), 0);

    // Login with the same credentials works too
    let (status, body) = request(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].as_str().is_some());
}

#[tokio::test]
async fn register_validates_input() {
    let (app, _state) = test_app().await;

    let (status, _) = request(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "al", "email": "a@b.c", "password": "longenough" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "alice", "email": "a@b.c", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_rejects_bad_password() {
    let (app, _state) = test_app().await;
    register_and_login(&app).await;

    let (status, _) = request(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rotates_the_token() {
    let (app, _state) = test_app().await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "correct horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let refresh = body["refresh_token"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].as_str().is_some());

    // The exchanged token is dead
    let (status, _) = request(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn devices_require_authentication() {
    let (app, _state) = test_app().await;

    let (status, _) = request(&app, "GET", "/api/devices", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(&app, "GET", "/api/devices", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn probe_unknown_device_is_not_found() {
    let (app, _state) = test_app().await;
    let (_user_id, access) = register_and_login(&app).await;

    let (status, _) = request(
        &app,
        "POST",
        "/api/devices/ghost/probe",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn probe_offline_device_maps_to_503() {
    let (app, state) = test_app().await;
    let (user_id, access) = register_and_login(&app).await;

    // Owned but never connected and never reported
    state
        .db
        .upsert_device("pc1", Some("Lab-PC"), Some(&user_id), None, 1)
        .await
        .unwrap();

    let (status, body) = request(
        &app,
        "POST",
        "/api/devices/pc1/probe",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "DEVICE_OFFLINE");
}

#[tokio::test]
async fn probe_offline_device_with_history_returns_stale_status() {
    let (app, state) = test_app().await;
    let (user_id, access) = register_and_login(&app).await;

    state
        .db
        .upsert_device("pc1", Some("Lab-PC"), Some(&user_id), None, 1)
        .await
        .unwrap();
    state
        .db
        .upsert_device_status("pc1", "locked", 100)
        .await
        .unwrap();

    let (status, body) = request(
        &app,
        "POST",
        "/api/devices/pc1/probe",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "locked");
    assert_eq!(body["probed"], false);
    assert_eq!(body["stale"], true);
}

#[tokio::test]
async fn foreign_device_is_invisible() {
    let (app, state) = test_app().await;
    let (_user_id, access) = register_and_login(&app).await;

    state
        .db
        .upsert_device("other-pc", Some("Foreign"), Some("someone-else"), None, 1)
        .await
        .unwrap();

    let (status, _) = request(
        &app,
        "POST",
        "/api/devices/other-pc/probe",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = request(&app, "GET", "/api/devices", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn command_offline_device_maps_to_503() {
    let (app, state) = test_app().await;
    let (user_id, access) = register_and_login(&app).await;

    state
        .db
        .upsert_device("pc1", Some("Lab-PC"), Some(&user_id), None, 1)
        .await
        .unwrap();

    let (status, body) = request(
        &app,
        "POST",
        "/api/devices/pc1/command",
        Some(&access),
        Some(json!({ "action": "lock" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "DEVICE_OFFLINE");
}

#[tokio::test]
async fn period_crud_round_trip() {
    let (app, _state) = test_app().await;
    let (_user_id, access) = register_and_login(&app).await;

    let (status, created) = request(
        &app,
        "POST",
        "/api/periods",
        Some(&access),
        Some(json!({ "from_time": "21:00", "to_time": "07:00", "days": ["mon", "tue"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["days"], json!(["mon", "tue"]));

    let (status, body) = request(&app, "GET", "/api/periods", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["periods"].as_array().unwrap().len(), 1);

    let (status, updated) = request(
        &app,
        "PUT",
        &format!("/api/periods/{id}"),
        Some(&access),
        Some(json!({ "from_time": "22:00", "to_time": "06:00", "days": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["from_time"], "22:00");
    assert_eq!(updated["days"], json!([]));

    let (status, _) = request(
        &app,
        "DELETE",
        &format!("/api/periods/{id}"),
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&app, "GET", "/api/periods", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["periods"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn period_rejects_malformed_times() {
    let (app, _state) = test_app().await;
    let (_user_id, access) = register_and_login(&app).await;

    for bad in ["25:00", "21:60", "9:00", "garbage"] {
        let (status, _) = request(
            &app,
            "POST",
            "/api/periods",
            Some(&access),
            Some(json!({ "from_time": bad, "to_time": "07:00" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {bad}");
    }
}
