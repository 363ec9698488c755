//! Email campaign proxy handler.

use crate::errors::ProxyError;
use crate::routes::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Query parameters accepted by `GET /campanhas`.
///
/// Both dates are optional `YYYY-MM-DD` strings; defaulting happens in
/// the upstream client and supplied values are forwarded verbatim.
#[derive(Debug, Deserialize)]
pub struct CampaignQuery {
    /// Window start date.
    pub data_inicio: Option<String>,

    /// Window end date.
    pub data_fim: Option<String>,
}

/// Proxy email campaign data from the upstream analytics API.
///
/// # Errors
///
/// Any upstream failure (token refresh or data fetch) surfaces as a
/// generic 500 with the error text in `detail`.
#[instrument(skip(state), name = "proxy.handlers.campaigns")]
pub async fn get_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CampaignQuery>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let data = state
        .upstream
        .fetch_campaigns(query.data_inicio, query.data_fim)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": data,
    })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_deserializes_with_both_dates_absent() {
        let query: CampaignQuery = serde_json::from_str("{}").unwrap();
        assert!(query.data_inicio.is_none());
        assert!(query.data_fim.is_none());
    }

    #[test]
    fn test_query_deserializes_with_dates() {
        let query: CampaignQuery = serde_json::from_str(
            r#"{"data_inicio":"2024-01-01","data_fim":"2024-01-31"}"#,
        )
        .unwrap();
        assert_eq!(query.data_inicio.as_deref(), Some("2024-01-01"));
        assert_eq!(query.data_fim.as_deref(), Some("2024-01-31"));
    }
}
