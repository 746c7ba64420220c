//! Integration tests for the HTTP surface, driven through the router with
//! `tower::ServiceExt::oneshot`.

use axum::body::Body;
use sentinel_core::alerting::NoopAlerter;
use sentinel_core::config::EngineConfig;
use sentinel_core::engine::DecisionEngine;
use sentinel_core::http::{REQUEST_ID_HEADER, router};
use std::sync::Arc;
use tower::ServiceExt;

async fn ready_engine() -> Arc<DecisionEngine> {
    let engine =
        Arc::new(DecisionEngine::new(EngineConfig::default(), Arc::new(NoopAlerter)).unwrap());
    engine.start().await.unwrap();
    engine
}

async fn cold_engine() -> Arc<DecisionEngine> {
    Arc::new(DecisionEngine::new(EngineConfig::default(), Arc::new(NoopAlerter)).unwrap())
}

fn get(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn put_json(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- /health ---

#[tokio::test]
async fn test_health_ready() {
    let app = router(ready_engine().await);
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_health_not_ready() {
    let app = router(cold_engine().await);
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), 503);
}

// --- /analyze ---

#[tokio::test]
async fn test_analyze_returns_assessment() {
    let app = router(ready_engine().await);
    let response = app
        .oneshot(post_json(
            "/analyze",
            serde_json::json!({"message": "what a lovely evening"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["crisis_detected"], false);
    assert_eq!(json["severity"], "safe");
    assert!(json["crisis_score"].as_f64().unwrap() <= 1.0);
    assert!(json.get("explanation").is_some());
}

#[tokio::test]
async fn test_analyze_crisis_with_options() {
    let app = router(ready_engine().await);
    let response = app
        .oneshot(post_json(
            "/analyze",
            serde_json::json!({
                "message": "I want to kill myself",
                "algorithm": "weighted",
                "verbosity": "detailed",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["crisis_detected"], true);
    assert!(json["explanation"].as_str().unwrap().contains("Thresholds"));
}

#[tokio::test]
async fn test_analyze_empty_message_is_422() {
    let app = router(ready_engine().await);
    let response = app
        .oneshot(post_json("/analyze", serde_json::json!({"message": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
    let json = body_json(response).await;
    assert_eq!(json["field"], "message");
}

#[tokio::test]
async fn test_analyze_bad_history_is_422() {
    let app = router(ready_engine().await);
    let response = app
        .oneshot(post_json(
            "/analyze",
            serde_json::json!({
                "message": "hello",
                "history": [
                    {"text": "later", "timestamp": "2026-03-04T12:10:00Z"},
                    {"text": "earlier", "timestamp": "2026-03-04T12:00:00Z"}
                ],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
    let json = body_json(response).await;
    assert_eq!(json["field"], "history");
}

#[tokio::test]
async fn test_analyze_not_ready_is_503() {
    let app = router(cold_engine().await);
    let response = app
        .oneshot(post_json("/analyze", serde_json::json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = router(ready_engine().await);
    let mut request = post_json("/analyze", serde_json::json!({"message": "hello"}));
    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER, "abc-123".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(REQUEST_ID_HEADER).unwrap(),
        "abc-123"
    );
}

#[tokio::test]
async fn test_request_id_is_generated_when_absent() {
    let app = router(ready_engine().await);
    let response = app.oneshot(get("/health")).await.unwrap();
    let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
    assert!(!id.to_str().unwrap().is_empty());
}

// --- /analyze/batch ---

#[tokio::test]
async fn test_batch_isolates_item_failures() {
    let app = router(ready_engine().await);
    let response = app
        .oneshot(post_json(
            "/analyze/batch",
            serde_json::json!([
                {"message": "first"},
                {"message": ""},
                {"message": "third"},
            ]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items[0].get("severity").is_some());
    assert!(items[1].get("error").is_some());
    assert!(items[2].get("severity").is_some());
}

// --- /models and /status ---

#[tokio::test]
async fn test_models_lists_four_wrappers() {
    let app = router(ready_engine().await);
    let response = app.oneshot(get("/models")).await.unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    let models = json.as_array().unwrap();
    assert_eq!(models.len(), 4);
    let bart = models.iter().find(|m| m["name"] == "bart").unwrap();
    assert_eq!(bart["role"], "primary");
    assert_eq!(bart["weight"], 0.5);
    assert_eq!(bart["loaded"], true);
}

#[tokio::test]
async fn test_status_shape() {
    let app = router(ready_engine().await);
    let response = app.oneshot(get("/status")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["ready"], true);
    assert!(json["uptime_secs"].as_u64().is_some());
    assert_eq!(json["models"].as_array().unwrap().len(), 4);
    assert_eq!(json["external_risk"]["enabled"], false);
    assert!(json["cache"]["max_size"].as_u64().is_some());
}

// --- /config/consensus ---

#[tokio::test]
async fn test_consensus_config_round_trip() {
    let engine = ready_engine().await;

    let response = router(engine.clone())
        .oneshot(get("/config/consensus"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["default_algorithm"], "weighted");
    assert_eq!(json["verbosity"], "standard");

    let response = router(engine.clone())
        .oneshot(put_json(
            "/config/consensus",
            serde_json::json!({"default_algorithm": "conflict_aware", "verbosity": "detailed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["default_algorithm"], "conflict_aware");

    let response = router(engine)
        .oneshot(get("/config/consensus"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["default_algorithm"], "conflict_aware");
    assert_eq!(json["verbosity"], "detailed");
}

// --- /config/context ---

#[tokio::test]
async fn test_context_config_round_trip() {
    let engine = ready_engine().await;

    let response = router(engine.clone())
        .oneshot(get("/config/context"))
        .await
        .unwrap();
    let mut context = body_json(response).await;
    assert_eq!(context["max_history"], 50);

    context["max_history"] = serde_json::json!(25);
    let response = router(engine.clone())
        .oneshot(put_json("/config/context", context))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = router(engine)
        .oneshot(get("/config/context"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["max_history"], 25);
}

#[tokio::test]
async fn test_context_config_rejects_invalid_window() {
    let engine = ready_engine().await;
    let response = router(engine.clone())
        .oneshot(get("/config/context"))
        .await
        .unwrap();
    let mut context = body_json(response).await;
    context["late_night_start"] = serde_json::json!("25:99");

    let response = router(engine)
        .oneshot(put_json("/config/context", context))
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}
