//! Root status handler.

use axum::Json;
use serde::Serialize;

/// Root endpoint response.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Always "online" while the process is serving.
    pub status: String,

    /// Human-readable status message.
    pub message: String,
}

/// Root endpoint. Public; used as a basic reachability check.
pub async fn home() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "online".to_string(),
        message: "Campaign proxy is up and protected with an API key".to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_home_reports_online() {
        let Json(response) = home().await;
        assert_eq!(response.status, "online");
        assert!(!response.message.is_empty());
    }
}
