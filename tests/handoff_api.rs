//! HTTP-level tests for the handoff API.
//!
//! Requests are driven through the router with `tower::ServiceExt::oneshot`;
//! no socket is bound.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use handoff_relay::clock::MockClock;
use handoff_relay::{router, AppState, HandoffStore, RelayConfig};

fn app() -> Router {
    let state = AppState::from_config(&RelayConfig::default()).unwrap();
    router(Arc::new(state))
}

fn app_with_clock(ttl: Duration, clock: MockClock) -> Router {
    let store = Arc::new(HandoffStore::new(ttl).with_clock(clock));
    let state = AppState::with_store(store, &RelayConfig::default()).unwrap();
    router(Arc::new(state))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        },
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn full_handoff_round() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/task/AB12",
        Some(json!({"subjectId": "u1", "transactionId": "t1", "realIp": "203.0.113.5"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let (_, body) = call(&app, Method::GET, "/task/AB12", None).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["task"]["subjectId"], "u1");
    assert_eq!(body["task"]["transactionId"], "t1");
    assert_eq!(body["task"]["realIp"], "203.0.113.5");
    assert!(body["task"]["timestamp"].is_i64());

    let (status, _) = call(
        &app,
        Method::POST,
        "/result/AB12",
        Some(json!({"sessionId": "s1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, Method::GET, "/task/AB12", None).await;
    assert_eq!(body, json!({"ok": false, "task": null}));

    let (_, body) = call(&app, Method::GET, "/result/AB12", None).await;
    assert_eq!(body["result"]["sessionId"], "s1");
    assert_eq!(body["result"]["status"], "completed");

    let (status, body) = call(&app, Method::DELETE, "/clear/AB12", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let (_, body) = call(&app, Method::GET, "/result/AB12", None).await;
    assert_eq!(body, json!({"ok": false, "result": null}));
}

#[tokio::test]
async fn absent_slots_report_not_ok() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/task/NOPE", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": false, "task": null}));

    let (_, body) = call(&app, Method::GET, "/result/NOPE", None).await;
    assert_eq!(body, json!({"ok": false, "result": null}));
}

#[tokio::test]
async fn incomplete_task_is_rejected_without_side_effects() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/task/AB12",
        Some(json!({"subjectId": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"ok": false, "error": "Missing subjectId or transactionId"})
    );

    let (status, body) = call(&app, Method::GET, "/task/AB12", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": false, "task": null}));
}

#[tokio::test]
async fn empty_or_malformed_bodies_are_rejected() {
    let app = app();

    let (status, body) = call(&app, Method::POST, "/result/AB12", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"ok": false, "error": "Missing sessionId"}));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/task/AB12")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn legacy_field_names_are_accepted() {
    let app = app();

    let (status, _) = call(
        &app,
        Method::POST,
        "/task/AB12",
        Some(json!({"userId": "u1", "transactionId": "t1", "pageUrl": "https://a.test/x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::GET, "/task/AB12", None).await;
    assert_eq!(body["task"]["subjectId"], "u1");
    assert_eq!(body["task"]["sourceUrl"], "https://a.test/x");

    let (status, _) = call(
        &app,
        Method::POST,
        "/result/AB12",
        Some(json!({"event_session_id": "s9", "status": "failed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::GET, "/result/AB12", None).await;
    assert_eq!(body["result"]["sessionId"], "s9");
    assert_eq!(body["result"]["status"], "failed");
}

#[tokio::test]
async fn later_publish_replaces_earlier() {
    let app = app();
    for txn in ["t1", "t2"] {
        call(
            &app,
            Method::POST,
            "/task/AB12",
            Some(json!({"subjectId": "u1", "transactionId": txn})),
        )
        .await;
    }
    let (_, body) = call(&app, Method::GET, "/task/AB12", None).await;
    assert_eq!(body["task"]["transactionId"], "t2");
}

#[tokio::test]
async fn clear_is_idempotent() {
    let app = app();
    for _ in 0..2 {
        let (status, body) = call(&app, Method::DELETE, "/clear/NEVER", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }
}

#[tokio::test]
async fn expired_entries_read_as_null() {
    let clock = MockClock::new();
    let app = app_with_clock(Duration::from_secs(60), clock.clone());

    call(
        &app,
        Method::POST,
        "/task/AB12",
        Some(json!({"subjectId": "u1", "transactionId": "t1"})),
    )
    .await;

    clock.advance(Duration::from_secs(60));
    let (_, body) = call(&app, Method::GET, "/task/AB12", None).await;
    assert_eq!(body["task"]["subjectId"], "u1");

    clock.advance(Duration::from_secs(1));
    let (_, body) = call(&app, Method::GET, "/task/AB12", None).await;
    assert_eq!(body, json!({"ok": false, "task": null}));
}

#[tokio::test]
async fn debug_lists_pending_codes() {
    let clock = MockClock::new();
    let app = app_with_clock(Duration::from_secs(60), clock.clone());

    call(
        &app,
        Method::POST,
        "/task/AB12",
        Some(json!({"subjectId": "subject-0123456789", "transactionId": "t1"})),
    )
    .await;
    call(&app, Method::POST, "/result/CD34", Some(json!({"sessionId": "s1"}))).await;
    clock.advance(Duration::from_secs(12));

    let (status, body) = call(&app, Method::GET, "/debug", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "tasks": [{"code": "AB12", "subjectId": "subject-01...", "ageSecs": 12}],
            "results": [{"code": "CD34", "sessionId": "s1", "ageSecs": 12}],
        })
    );
}

#[tokio::test]
async fn status_reports_pending_counts() {
    let app = app();
    call(
        &app,
        Method::POST,
        "/task/A",
        Some(json!({"subjectId": "u1", "transactionId": "t1"})),
    )
    .await;
    call(&app, Method::POST, "/result/B", Some(json!({"sessionId": "s1"}))).await;

    let (status, body) = call(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "handoff-relay");
    assert_eq!(body["status"], "running");
    assert_eq!(body["activeTasks"], 1);
    assert_eq!(body["activeResults"], 1);
    assert!(body["uptimeSecs"].is_u64());

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(body["timestamp"].is_i64());
}

#[tokio::test]
async fn api_answers_cors_preflight() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/task/AB12")
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
