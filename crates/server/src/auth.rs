//! Authentication Middleware
//!
//! Optional API key authentication via `Authorization: Bearer <key>`.

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use intent_router_config::Settings;

use crate::ServerError;

/// Warn about disabled auth only once
static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

/// Authentication result after checking config
#[derive(Debug, PartialEq, Eq)]
enum AuthCheck {
    /// Authentication disabled, pass through
    Disabled,
    /// Path is public, pass through
    PublicPath,
    /// Config error
    ConfigError(&'static str),
    /// Need to check API key with this expected key
    CheckKey(String),
}

/// Decide what to do for `path`
///
/// Copies what it needs out of the config so no guard outlives this call.
fn check_auth_config(config: &Arc<RwLock<Settings>>, path: &str) -> AuthCheck {
    let config_guard = config.read();
    let auth_config = &config_guard.server.auth;

    if !auth_config.enabled {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "API authentication is disabled. Set INTENT_ROUTER__SERVER__AUTH__ENABLED=true for production."
            );
        }
        return AuthCheck::Disabled;
    }

    if auth_config.public_paths.iter().any(|p| path.starts_with(p)) {
        return AuthCheck::PublicPath;
    }

    match &auth_config.api_key {
        Some(key) if !key.is_empty() => AuthCheck::CheckKey(key.clone()),
        _ => AuthCheck::ConfigError("Auth is enabled but no API key is configured"),
    }
}

/// Authentication middleware
///
/// - Checks for `Authorization: Bearer <api_key>`
/// - Skips public paths (health, readiness, metrics)
/// - Returns 401 if auth is enabled and the key is missing or wrong
///
/// Set the key via `INTENT_ROUTER__SERVER__AUTH__API_KEY` and enable with
/// `INTENT_ROUTER__SERVER__AUTH__ENABLED=true`.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let config = match request.extensions().get::<Arc<RwLock<Settings>>>() {
        Some(cfg) => cfg.clone(),
        None => {
            tracing::error!("Config extension not found in request");
            return ServerError::Internal("Server configuration error".to_string()).into_response();
        },
    };

    let path = request.uri().path().to_string();

    match check_auth_config(&config, &path) {
        AuthCheck::Disabled | AuthCheck::PublicPath => next.run(request).await,
        AuthCheck::ConfigError(msg) => {
            tracing::error!("{}", msg);
            ServerError::Internal("Server authentication not configured".to_string())
                .into_response()
        },
        AuthCheck::CheckKey(expected_key) => {
            let provided = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            match provided.as_deref().map(|h| h.strip_prefix("Bearer ")) {
                Some(Some(key))
                    if constant_time_compare(key.as_bytes(), expected_key.as_bytes()) =>
                {
                    next.run(request).await
                },
                Some(Some(_)) => {
                    tracing::warn!(path = %path, "Invalid API key provided");
                    ServerError::Auth("Invalid API key".to_string()).into_response()
                },
                Some(None) => ServerError::InvalidRequest(
                    "Invalid Authorization header format. Expected: Bearer <token>".to_string(),
                )
                .into_response(),
                None => {
                    ServerError::Auth("Missing Authorization header".to_string()).into_response()
                },
            }
        },
    }
}

/// Constant-time comparison
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"secret", b"secret"));
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secreT"));
    }

    #[test]
    fn test_check_auth_config() {
        let mut settings = Settings::default();
        settings.server.auth.enabled = true;
        let config = Arc::new(RwLock::new(settings));

        assert_eq!(check_auth_config(&config, "/api/healthz"), AuthCheck::PublicPath);
        assert!(matches!(
            check_auth_config(&config, "/api/find-service"),
            AuthCheck::ConfigError(_)
        ));

        config.write().server.auth.api_key = Some("k".to_string());
        assert_eq!(
            check_auth_config(&config, "/api/find-service"),
            AuthCheck::CheckKey("k".to_string())
        );

        config.write().server.auth.enabled = false;
        assert_eq!(check_auth_config(&config, "/api/find-service"), AuthCheck::Disabled);
    }
}
