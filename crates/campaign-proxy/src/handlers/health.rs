//! Health check handler.
//!
//! Reports the passive token-validity snapshot from the upstream
//! client. Always answers 200 so liveness probes never see a 5xx from
//! this route; degraded state is carried in the body instead.

use crate::routes::AppState;
use crate::upstream::HealthStatus;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Health check handler.
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "token_valid": true
/// }
/// ```
#[instrument(skip_all, name = "proxy.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.upstream.health())
}
