//! Intent Router Server
//!
//! HTTP endpoints for intent classification, batch evaluation, health and metrics.

pub mod auth;
pub mod http;
pub mod metrics;
pub mod state;

pub use auth::auth_middleware;
pub use http::{create_router, MAX_BATCH_CASES};
pub use metrics::{init_metrics, record_batch, record_classification, record_request};
pub use state::AppState;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use intent_router_classifier::ClassifierError;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Classifier setup failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Classifier(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Renders as `{"success": false, "error": "..."}`
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = match &self {
            ServerError::Auth(msg) | ServerError::InvalidRequest(msg) => msg.clone(),
            other => other.to_string(),
        };
        let status = StatusCode::from(self);

        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": message,
            })),
        )
            .into_response()
    }
}
