//! API-key gate for protected routes.
//!
//! Compares the configured header against the shared secret. The gate
//! wraps the whole router, so every path is covered — including ones
//! no route matches — except the allow-listed public paths `/` and
//! `/health`. An unconfigured secret disables gating.
//!
//! The presented header value is never logged, and the rejection is
//! independent of upstream state.

use crate::errors::ProxyError;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::instrument;

/// Paths that never require the API key.
const PUBLIC_PATHS: &[&str] = &["/", "/health"];

/// Gate middleware enforcing the shared-secret header.
///
/// # Response
///
/// - Continues when no secret is configured, the path is public, or
///   the header matches
/// - Returns 403 with an `error` body when the header is missing or
///   wrong, regardless of whether any route matches the path
#[instrument(skip_all, name = "proxy.middleware.auth")]
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, ProxyError> {
    let Some(expected) = state.config.proxy_api_key.as_ref() else {
        // Gate disabled by configuration
        return Ok(next.run(req).await);
    };

    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let presented = req
        .headers()
        .get(state.config.api_key_header_name.as_str())
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(value) if value == expected.expose_secret() => Ok(next.run(req).await),
        _ => {
            tracing::warn!(
                target: "proxy.middleware.auth",
                header = %state.config.api_key_header_name,
                uri = %req.uri(),
                "Request rejected by API-key gate"
            );
            Err(ProxyError::Forbidden(
                "Access denied. Invalid API key.".to_string(),
            ))
        }
    }
}

// The gate is exercised end-to-end in tests/gate_tests.rs, where a real
// router and mock upstream verify the 403 path, the bypass routes, and
// that rejected requests never reach the upstream.
