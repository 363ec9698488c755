//! HTTP routes for the campaign proxy.
//!
//! Defines the Axum router and application state. The API-key gate
//! wraps the whole router; it allow-lists `/` and `/health` and gates
//! every other path, matched or not.

use crate::config::Config;
use crate::handlers;
use crate::middleware::require_api_key;
use crate::upstream::UpstreamClient;
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Upstream analytics client owning the token lifecycle.
    pub upstream: UpstreamClient,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/` and `/health` - public routes, never gated
/// - `/campanhas` - campaign proxy
/// - the API-key gate wrapping the whole router, so unmatched paths
///   are rejected before axum's 404 fallback
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>) -> Router {
    // Layer order (bottom-to-top execution):
    // 1. require_api_key - Gate everything but the public paths
    // 2. TraceLayer - Log request details (rejections included)
    // 3. TimeoutLayer - Timeout the request (outermost)
    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health_check))
        .route("/campanhas", get(handlers::get_campaigns))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
