//! HTTP Endpoints
//!
//! REST API for intent classification.

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use intent_router_classifier::{evaluate_batch_with, BatchReport, TestCase};
use intent_router_core::ServiceId;
use intent_router_llm::LlmBackend;

use crate::auth::auth_middleware;
use crate::metrics::{metrics_handler, record_batch, record_classification, record_request};
use crate::state::AppState;
use crate::ServerError;

/// Largest accepted batch
pub const MAX_BATCH_CASES: usize = 1000;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    let request_timeout = Duration::from_secs(config.server.timeout_seconds);
    let max_connections = config.server.max_connections;
    drop(config); // Release lock before building router

    Router::new()
        // Health
        .route("/api/healthz", get(health_check))
        .route("/ready", get(readiness_check))
        // Classification
        .route("/api/find-service", post(find_service))
        .route("/api/test-batch", post(test_batch))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Admin
        .route("/admin/reload-config", post(reload_config))
        // Auth sits inside CORS and tracing
        .layer(axum::middleware::from_fn(auth_middleware))
        .layer(Extension(state.config.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(GlobalConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty, defaults to localhost:3000
/// - Otherwise, uses the configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("No CORS origins configured, defaulting to localhost:3000");
        return localhost_cors();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        return localhost_cors();
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn localhost_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Liveness probe
async fn health_check() -> Json<serde_json::Value> {
    record_request("healthz", StatusCode::OK);
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe with provider connectivity
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let classifier = state.classifier();

    // Extract config values before any await - parking_lot guards aren't Send
    let (llm_configured, api_key_configured, llm_endpoint) = {
        let config = state.get_config();
        (
            config.llm.enabled,
            config.llm.has_api_key(),
            config.llm.endpoint.clone(),
        )
    };

    let mut checks = serde_json::Map::new();
    let mut ready = true;

    let services = classifier.catalog().len();
    if services == 0 {
        ready = false;
    }
    checks.insert(
        "catalog".to_string(),
        serde_json::json!({
            "status": if services > 0 { "ok" } else { "empty" },
            "services": services
        }),
    );

    checks.insert(
        "rules".to_string(),
        serde_json::json!({ "count": classifier.rule_count() }),
    );

    let example_count = classifier.example_count();
    checks.insert(
        "examples".to_string(),
        serde_json::json!({
            "status": if example_count > 0 { "ok" } else { "empty" },
            "count": example_count
        }),
    );

    let llm_status = match classifier.llm() {
        Some(llm) => match tokio::time::timeout(PROBE_TIMEOUT, llm.is_available()).await {
            Ok(true) => "ok",
            Ok(false) => {
                ready = false;
                "unreachable"
            },
            Err(_) => {
                ready = false;
                "timeout"
            },
        },
        // Fast path and fallback still answer without a provider
        None if llm_configured => "unconfigured",
        None => "disabled",
    };
    checks.insert(
        "llm".to_string(),
        serde_json::json!({
            "status": llm_status,
            "enabled": classifier.llm_enabled(),
            "api_key_configured": api_key_configured,
            "endpoint": llm_endpoint
        }),
    );

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    record_request("ready", status_code);

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": checks
        })),
    )
}

/// Classification request
#[derive(Debug, Deserialize)]
pub struct FindServiceRequest {
    pub intent: String,
}

/// Classified service
#[derive(Debug, Serialize)]
pub struct ServiceData {
    pub service_id: ServiceId,
    pub service_name: String,
}

/// Successful response envelope
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// POST /api/find-service
async fn find_service(
    State(state): State<AppState>,
    payload: Result<Json<FindServiceRequest>, JsonRejection>,
) -> Response {
    let response = classify_intent(&state, payload).await.into_response();
    record_request("find_service", response.status());
    response
}

async fn classify_intent(
    state: &AppState,
    payload: Result<Json<FindServiceRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse<ServiceData>>, ServerError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Rejected find-service body");
        ServerError::InvalidRequest(rejection.body_text())
    })?;

    if request.intent.trim().is_empty() {
        return Err(ServerError::InvalidRequest("intent must not be empty".to_string()));
    }

    let outcome = state.classifier().classify(&request.intent).await;
    record_classification(&outcome);

    let service = outcome.classification.service;
    Ok(Json(SuccessResponse::new(ServiceData {
        service_id: service.id,
        service_name: service.name,
    })))
}

/// Batch evaluation request
#[derive(Debug, Deserialize)]
pub struct TestBatchRequest {
    pub test_cases: Vec<TestCase>,
}

/// POST /api/test-batch
async fn test_batch(
    State(state): State<AppState>,
    payload: Result<Json<TestBatchRequest>, JsonRejection>,
) -> Response {
    let response = run_batch(&state, payload).await.into_response();
    record_request("test_batch", response.status());
    response
}

async fn run_batch(
    state: &AppState,
    payload: Result<Json<TestBatchRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse<BatchReport>>, ServerError> {
    let Json(request) =
        payload.map_err(|rejection| ServerError::InvalidRequest(rejection.body_text()))?;

    if request.test_cases.is_empty() {
        return Err(ServerError::InvalidRequest("test_cases must not be empty".to_string()));
    }
    if request.test_cases.len() > MAX_BATCH_CASES {
        return Err(ServerError::InvalidRequest(format!(
            "test_cases must not exceed {} entries",
            MAX_BATCH_CASES
        )));
    }

    // Rules and examples only; the provider is never called for batches
    let classifier = state.classifier();
    let report = evaluate_batch_with(&classifier, &request.test_cases, record_classification);
    record_batch(&report.statistics);

    Ok(Json(SuccessResponse::new(report)))
}

/// Config reload endpoint
///
/// POST /admin/reload-config
///
/// Re-reads settings and rebuilds rules, examples and the provider backend.
async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || state.reload_config())
        .await
        .unwrap_or_else(|e| Err(format!("Reload task failed: {}", e)));

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "message": "Configuration reloaded successfully"
            })),
        ),
        Err(e) => {
            tracing::error!("Config reload failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e
                })),
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intent_router_classifier::{IntentClassifier, PipelineConfig};
    use intent_router_config::Settings;
    use intent_router_core::ServiceCatalog;

    #[test]
    fn test_router_creation() {
        let state = AppState::with_classifier(
            Settings::default(),
            IntentClassifier::new(ServiceCatalog::standard(), PipelineConfig::default()),
        );
        let _ = create_router(state);
    }

    #[test]
    fn test_cors_layer_variants() {
        let _ = build_cors_layer(&[], true);
        let _ = build_cors_layer(&[], false);
        let _ = build_cors_layer(&["https://example.com".to_string()], true);
        let _ = build_cors_layer(&["bad\norigin".to_string()], true);
    }
}
