//! HTTP API integration tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;

use helpers::{BlockingTrainer, TestEnv};
use tierwatch_core::{build_router, AppState};
use tower::ServiceExt;

fn router(env: &TestEnv) -> Router {
    build_router(AppState::new(Arc::clone(&env.coordinator)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

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

async fn train_once(env: &TestEnv) {
    env.source.insert("see you at lunch tomorrow", "benign");
    env.source.insert("send your bank password now", "suspicious");
    env.source.insert("bomb threat at the central station", "critical");
    env.coordinator.request_retrain().await.unwrap();
    env.coordinator.wait_for_idle().await;
}

#[tokio::test]
async fn test_health_degraded_before_first_generation() {
    let env = TestEnv::new();
    let app = router(&env);

    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["module"], "tierwatch");
    assert_eq!(body["training_state"], "IDLE");
    assert!(body.get("current_generation").is_none());
}

#[tokio::test]
async fn test_classify_unavailable_until_published() {
    let env = TestEnv::new();
    let app = router(&env);

    let (status, body) = send(&app, "POST", "/classify", Some(json!({"text": "hello"}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_classify_after_training() {
    let env = TestEnv::new();
    let app = router(&env);
    train_once(&env).await;

    let (status, body) = send(
        &app,
        "POST",
        "/classify",
        Some(json!({"text": "Bomb threat at the station!"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["input_text"], "Bomb threat at the station!");
    assert_eq!(body["generation_id"], 1);
    assert!(["benign", "suspicious", "critical"]
        .contains(&body["predicted_class"].as_str().unwrap()));
    let total: f64 = body["probabilities"]
        .as_object()
        .unwrap()
        .values()
        .map(|p| p.as_f64().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-9);

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["current_generation"], 1);
}

#[tokio::test]
async fn test_empty_text_is_a_bad_request() {
    let env = TestEnv::new();
    let app = router(&env);

    for uri in ["/classify", "/entities", "/analyze"] {
        let (status, body) = send(&app, "POST", uri, Some(json!({"text": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "BAD_REQUEST", "{uri}");
    }
}

#[tokio::test]
async fn test_entities_work_without_a_model() {
    let env = TestEnv::new();
    let app = router(&env);

    let (status, body) = send(
        &app,
        "POST",
        "/entities",
        Some(json!({"text": "Mail admin@example.com before 10:30 pm"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = body["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"email"));
    assert!(kinds.contains(&"time_of_day"));
}

#[tokio::test]
async fn test_analyze_combines_label_and_entities() {
    let env = TestEnv::new();
    let app = router(&env);
    train_once(&env).await;

    let (status, body) = send(
        &app,
        "POST",
        "/analyze",
        Some(json!({"text": "Send $500 to http://pay.example.com now"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["predicted_class"].is_string());
    assert_eq!(body["generation_id"], 1);
    assert!(!body["entities"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_retrain_accepted_then_conflict() {
    let (trainer, release) = BlockingTrainer::new();
    let env = TestEnv::with_trainer(trainer);
    env.source.insert("buy milk", "benign");
    let app = router(&env);

    let (status, body) = send(&app, "POST", "/retrain", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");
    assert!(body["run_id"].is_string());

    let (status, body) = send(&app, "POST", "/retrain", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    release.send(()).unwrap();
    env.coordinator.wait_for_idle().await;

    let (status, body) = send(&app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "IDLE");
    assert_eq!(body["current_generation"], 1);
    assert_eq!(body["last_outcome"]["result"], "succeeded");
    assert_eq!(body["pending_remote_count"], 0);
}

#[tokio::test]
async fn test_status_reports_failed_run() {
    let env = TestEnv::new();
    let app = router(&env);

    let (status, _) = send(&app, "POST", "/retrain", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    env.coordinator.wait_for_idle().await;

    let (_, body) = send(&app, "GET", "/status", None).await;
    assert_eq!(body["last_outcome"]["result"], "failed");
    assert_eq!(body["last_outcome"]["reason"], "data_empty");
    assert!(body["current_generation"].is_null());
}
