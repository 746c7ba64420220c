//! Minimal HTTP surface over the decision engine, built on axum.
//!
//! Transport concerns stay thin: handlers validate nothing the engine does
//! not already validate, and every error that reaches the boundary is
//! translated into a structured JSON body with the request's correlation
//! id. Each request gets an `X-Request-ID` (caller-supplied or generated)
//! echoed on the response and attached to the handler's tracing span.

use crate::config::ContextConfig;
use crate::engine::DecisionEngine;
use crate::error::SentinelError;
use crate::types::{AnalyzeRequest, ConsensusAlgorithm, CrisisAssessment, Verbosity};
use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info_span};
use uuid::Uuid;

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
    pub started_at: Instant,
}

/// Build the full router over an engine.
pub fn router(engine: Arc<DecisionEngine>) -> Router {
    let state = AppState {
        engine,
        started_at: Instant::now(),
    };
    Router::new()
        .route("/analyze", post(analyze))
        .route("/analyze/batch", post(analyze_batch))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/models", get(models))
        .route("/config/consensus", get(get_consensus).put(put_consensus))
        .route("/config/context", get(get_context).put(put_context))
        .layer(middleware::from_fn(request_id_layer))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Correlation id, stored in request extensions by the middleware.
#[derive(Clone)]
struct RequestId(String);

async fn request_id_layer(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestId(id.clone()));

    let span = info_span!("request", request_id = id.as_str());
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

fn error_response(err: SentinelError, request_id: &str) -> Response {
    match err {
        SentinelError::Validation(v) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody {
                error: v.to_string(),
                field: Some(v.field().to_string()),
                correlation_id: None,
            }),
        )
            .into_response(),
        SentinelError::Engine(crate::error::EngineError::NotReady) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "engine is not ready".into(),
                field: None,
                correlation_id: Some(request_id.to_string()),
            }),
        )
            .into_response(),
        SentinelError::Config(c) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody {
                error: c.to_string(),
                field: None,
                correlation_id: None,
            }),
        )
            .into_response(),
        other => {
            error!(request_id, error = %other, "Internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "internal error".into(),
                    field: None,
                    correlation_id: Some(request_id.to_string()),
                }),
            )
                .into_response()
        }
    }
}

fn request_id_of(extensions: &axum::http::Extensions) -> String {
    extensions
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn analyze(
    State(state): State<AppState>,
    request: Request,
) -> Response {
    let request_id = request_id_of(request.extensions());
    let body: Json<AnalyzeRequest> = match <Json<AnalyzeRequest> as axum::extract::FromRequest<AppState>>::from_request(request, &state).await {
        Ok(json) => json,
        Err(rejection) => return rejection.into_response(),
    };
    match state.engine.analyze(body.0, Some(&request_id)).await {
        Ok(assessment) => Json(assessment).into_response(),
        Err(err) => error_response(err, &request_id),
    }
}

/// One entry of a batch response: either an assessment or its error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum BatchItem {
    Ok(Box<CrisisAssessment>),
    Err { error: String },
}

async fn analyze_batch(
    State(state): State<AppState>,
    request: Request,
) -> Response {
    let request_id = request_id_of(request.extensions());
    let body: Json<Vec<AnalyzeRequest>> =
        match <Json<Vec<AnalyzeRequest>> as axum::extract::FromRequest<AppState>>::from_request(request, &state).await {
            Ok(json) => json,
            Err(rejection) => return rejection.into_response(),
        };
    let outcomes = state.engine.analyze_batch(body.0, Some(&request_id)).await;
    let items: Vec<BatchItem> = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Ok(assessment) => BatchItem::Ok(Box::new(assessment)),
            Err(err) => BatchItem::Err {
                error: err.to_string(),
            },
        })
        .collect();
    Json(items).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    if state.engine.is_ready() {
        (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "not_ready"})),
        )
            .into_response()
    }
}

async fn status(State(state): State<AppState>) -> Response {
    let status = state.engine.status().await;
    let uptime_secs = state.started_at.elapsed().as_secs();
    Json(serde_json::json!({
        "ready": status.ready,
        "uptime_secs": uptime_secs,
        "models": status.models,
        "breakers": status.breakers,
        "external_risk": {
            "enabled": status.external_risk_enabled,
            "breaker": status.external_risk_breaker,
        },
        "cache": status.cache,
    }))
    .into_response()
}

async fn models(State(state): State<AppState>) -> Response {
    Json(state.engine.model_info().await).into_response()
}

// ---------------------------------------------------------------------------
// Config surface
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct ConsensusDefaults {
    default_algorithm: ConsensusAlgorithm,
    verbosity: Verbosity,
}

async fn get_consensus(State(state): State<AppState>) -> Response {
    let config = state.engine.config().await;
    Json(ConsensusDefaults {
        default_algorithm: config.consensus.default_algorithm,
        verbosity: config.consensus.verbosity,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct ConsensusUpdate {
    default_algorithm: Option<ConsensusAlgorithm>,
    verbosity: Option<Verbosity>,
}

async fn put_consensus(State(state): State<AppState>, request: Request) -> Response {
    let request_id = request_id_of(request.extensions());
    let body: Json<ConsensusUpdate> =
        match <Json<ConsensusUpdate> as axum::extract::FromRequest<AppState>>::from_request(request, &state).await {
            Ok(json) => json,
            Err(rejection) => return rejection.into_response(),
        };
    let mut config = state.engine.config().await;
    if let Some(algorithm) = body.default_algorithm {
        config.consensus.default_algorithm = algorithm;
    }
    if let Some(verbosity) = body.verbosity {
        config.consensus.verbosity = verbosity;
    }
    match state.engine.reload_config(config).await {
        Ok(()) => {
            let config = state.engine.config().await;
            Json(ConsensusDefaults {
                default_algorithm: config.consensus.default_algorithm,
                verbosity: config.consensus.verbosity,
            })
            .into_response()
        }
        Err(err) => error_response(err, &request_id),
    }
}

async fn get_context(State(state): State<AppState>) -> Response {
    Json(state.engine.config().await.context).into_response()
}

async fn put_context(State(state): State<AppState>, request: Request) -> Response {
    let request_id = request_id_of(request.extensions());
    let body: Json<ContextConfig> =
        match <Json<ContextConfig> as axum::extract::FromRequest<AppState>>::from_request(request, &state).await {
            Ok(json) => json,
            Err(rejection) => return rejection.into_response(),
        };
    let mut config = state.engine.config().await;
    config.context = body.0;
    match state.engine.reload_config(config).await {
        Ok(()) => Json(state.engine.config().await.context).into_response(),
        Err(err) => error_response(err, &request_id),
    }
}
