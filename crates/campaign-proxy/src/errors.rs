//! Campaign proxy error types.
//!
//! All errors map to HTTP responses via the `IntoResponse` impl. The
//! wire shapes follow the contract consumed by the calling platform:
//! upstream failures become a generic 500 with a `detail` field, gate
//! rejections become a 403 with an `error` field.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Campaign proxy error type.
///
/// Maps to HTTP status codes:
/// - RefreshFailed, FetchFailed, Internal: 500 Internal Server Error
/// - Forbidden: 403 Forbidden
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The OAuth2 refresh-token exchange was rejected or unreachable.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The upstream analytics request was rejected or unreachable.
    #[error("Campaign fetch failed: {0}")]
    FetchFailed(String),

    /// Access gate rejection (bad or missing API key).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected internal failure.
    #[error("Internal server error")]
    Internal,
}

impl ProxyError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::RefreshFailed(_) | ProxyError::FetchFailed(_) | ProxyError::Internal => {
                500
            }
            ProxyError::Forbidden(_) => 403,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::RefreshFailed(reason) => {
                tracing::warn!(target: "proxy.upstream", reason = %reason, "Token refresh failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "detail": self.to_string() })),
                )
                    .into_response()
            }
            ProxyError::FetchFailed(reason) => {
                tracing::warn!(target: "proxy.upstream", reason = %reason, "Campaign fetch failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "detail": self.to_string() })),
                )
                    .into_response()
            }
            ProxyError::Forbidden(reason) => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": reason })),
            )
                .into_response(),
            ProxyError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "detail": "An internal error occurred" })),
            )
                .into_response(),
        }
    }
}
