//! Authenticated client for the upstream analytics API.
//!
//! [`UpstreamClient`] composes the token state with the refresh
//! exchange so every data request is guaranteed a valid bearer token.
//! `ensure_valid_token` is the single gate in front of the analytics
//! endpoint: no data request is issued without passing through it.
//!
//! # Concurrency
//!
//! The token state sits behind a std mutex for brief reads and writes;
//! a separate async mutex serializes the check -> exchange -> apply
//! sequence so at most one refresh is in flight per process. Callers
//! arriving during an in-flight refresh wait on that guard and then
//! observe the refreshed token instead of issuing their own exchange.

use crate::config::Config;
use crate::errors::ProxyError;
use crate::upstream::token::{self, TokenState};
use chrono::{Duration, NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;
use tracing::{debug, instrument, warn};

/// Timeout applied to every outbound request.
const UPSTREAM_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Connection timeout for the outbound HTTP client.
const UPSTREAM_CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Number of days subtracted from the end date when no start date is
/// supplied. The window is inclusive on both ends, so 44 days back
/// yields a 45-calendar-day window (the upstream plan limit).
const DEFAULT_WINDOW_DAYS: i64 = 44;

/// Date format used on the analytics query string.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Health snapshot returned by [`UpstreamClient::health`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// "healthy" or "unhealthy".
    pub status: String,

    /// Whether the stored access token is currently valid.
    pub token_valid: bool,

    /// Error text, present only when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Authenticated HTTP client for the upstream analytics API.
///
/// Owns the process-lifetime token state; handlers share one instance.
pub struct UpstreamClient {
    /// HTTP client with configured timeouts.
    http: reqwest::Client,

    /// OAuth2 token endpoint URL.
    token_url: String,

    /// Base URL of the analytics API.
    base_url: String,

    /// OAuth2 client identifier.
    client_id: String,

    /// OAuth2 client secret.
    client_secret: SecretString,

    /// Current token record. Held only for brief reads and writes,
    /// never across an await point.
    state: Mutex<TokenState>,

    /// Serializes the refresh critical section.
    refresh_guard: tokio::sync::Mutex<()>,
}

impl UpstreamClient {
    /// Create a new upstream client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Internal` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_REQUEST_TIMEOUT)
            .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                warn!(target: "proxy.upstream.client", error = %e, "Failed to build HTTP client");
                ProxyError::Internal
            })?;

        Ok(Self {
            http,
            token_url: config.token_url.clone(),
            base_url: config.base_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            state: Mutex::new(TokenState::new(config.refresh_token.clone())),
            refresh_guard: tokio::sync::Mutex::new(()),
        })
    }

    /// Lock the token state, recovering from a poisoned mutex.
    ///
    /// Production code cannot panic while holding the lock (enforced by
    /// lints), so recovery only matters for tests that do.
    fn lock_state(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a valid access token, refreshing if needed.
    ///
    /// Every data request passes through this gate. When the stored
    /// token is invalid, performs the refresh-token exchange and applies
    /// the result atomically; the prior state is left untouched on
    /// failure so the next request retries with the same refresh token.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::RefreshFailed` if the exchange is rejected
    /// or unreachable.
    #[instrument(skip_all, name = "proxy.upstream.ensure_valid_token")]
    pub async fn ensure_valid_token(&self) -> Result<SecretString, ProxyError> {
        // Fast path: token already valid, no coordination needed.
        {
            let state = self.lock_state();
            if state.is_valid(Utc::now()) {
                if let Some(token) = state.access_token() {
                    return Ok(token);
                }
            }
        }

        // Slow path: serialize refreshes so concurrent callers cannot
        // race the exchange (the server may rotate the refresh token,
        // which would permanently break the losing caller).
        let _refresh = self.refresh_guard.lock().await;

        // Re-check: another caller may have refreshed while we waited.
        let refresh_token = {
            let state = self.lock_state();
            if state.is_valid(Utc::now()) {
                if let Some(token) = state.access_token() {
                    debug!(
                        target: "proxy.upstream.client",
                        "Token refreshed by concurrent request, reusing"
                    );
                    return Ok(token);
                }
            }
            state.refresh_token()
        };

        let refreshed = token::exchange_refresh_token(
            &self.http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &refresh_token,
        )
        .await?;

        let mut state = self.lock_state();
        state.apply_refresh(refreshed, Utc::now());
        state
            .access_token()
            .ok_or_else(|| ProxyError::RefreshFailed("Access token missing after refresh".into()))
    }

    /// Fetch email campaign data from the analytics endpoint.
    ///
    /// Missing dates are defaulted (`end_date` to today, `start_date` to
    /// `end_date` minus 44 days); supplied values are forwarded verbatim
    /// with no format validation. The response JSON is opaque and passed
    /// through unmodified.
    ///
    /// # Errors
    ///
    /// - `ProxyError::RefreshFailed` if no valid token can be obtained
    /// - `ProxyError::FetchFailed` if the analytics request is rejected
    ///   or unreachable
    #[instrument(skip(self), name = "proxy.upstream.fetch_campaigns")]
    pub async fn fetch_campaigns(
        &self,
        start_date: Option<String>,
        end_date: Option<String>,
    ) -> Result<serde_json::Value, ProxyError> {
        let token = self.ensure_valid_token().await?;

        let (start_date, end_date) =
            resolve_window(start_date, end_date, Utc::now().date_naive());

        let url = format!("{}/analytics/emails", self.base_url);

        debug!(
            target: "proxy.upstream.client",
            start_date = %start_date,
            end_date = %end_date,
            "Fetching campaigns"
        );

        let response = self
            .http
            .get(&url)
            .query(&[("start_date", &start_date), ("end_date", &end_date)])
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "proxy.upstream.client", error = %e, "Campaign request transport failure");
                ProxyError::FetchFailed(e.to_string())
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "proxy.upstream.client",
                status = %status,
                "Campaign request rejected by upstream"
            );
            return Err(ProxyError::FetchFailed(body));
        }

        response.json().await.map_err(|e| {
            warn!(target: "proxy.upstream.client", error = %e, "Failed to parse campaign response");
            ProxyError::FetchFailed(e.to_string())
        })
    }

    /// Passive health snapshot.
    ///
    /// Reads token validity only: no network calls, no refresh, no state
    /// mutation, so liveness probes stay cheap. Never fails; an internal
    /// error (a poisoned state lock) is reported as unhealthy with the
    /// error text and `token_valid = false`.
    pub fn health(&self) -> HealthStatus {
        match self.state.lock() {
            Ok(state) => HealthStatus {
                status: "healthy".to_string(),
                token_valid: state.is_valid(Utc::now()),
                error: None,
            },
            Err(e) => HealthStatus {
                status: "unhealthy".to_string(),
                token_valid: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// Expire the stored access token in place. Test-only hook.
    #[cfg(test)]
    pub fn force_expire_token(&self) {
        self.lock_state().force_expire();
    }
}

/// Resolve the analytics date window.
///
/// `end_date` defaults to `today`; `start_date` defaults to the
/// resolved end date minus [`DEFAULT_WINDOW_DAYS`]. When a supplied end
/// date does not parse as `YYYY-MM-DD` the start default is anchored on
/// `today` instead (the malformed value itself still goes upstream
/// verbatim and surfaces whatever error upstream returns).
fn resolve_window(
    start_date: Option<String>,
    end_date: Option<String>,
    today: NaiveDate,
) -> (String, String) {
    let end_date = end_date.unwrap_or_else(|| today.format(DATE_FORMAT).to_string());

    let start_date = start_date.unwrap_or_else(|| {
        let anchor = NaiveDate::parse_from_str(&end_date, DATE_FORMAT).unwrap_or(today);
        (anchor - Duration::days(DEFAULT_WINDOW_DAYS))
            .format(DATE_FORMAT)
            .to_string()
    });

    (start_date, end_date)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use futures::future::join_all;
    use std::collections::HashMap;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> UpstreamClient {
        let vars = HashMap::from([
            ("RD_CLIENT_ID".to_string(), "test-client".to_string()),
            ("RD_CLIENT_SECRET".to_string(), "test-secret".to_string()),
            (
                "RD_REFRESH_TOKEN".to_string(),
                "initial-refresh".to_string(),
            ),
            (
                "RD_TOKEN_URL".to_string(),
                format!("{}/auth/token", base_url),
            ),
            ("RD_BASE_URL".to_string(), format!("{}/platform", base_url)),
        ]);
        let config = Config::from_vars(&vars).expect("test config should load");
        UpstreamClient::new(&config).expect("client should build")
    }

    fn token_response(access_token: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access_token,
        }))
    }

    // =========================================================================
    // Date Window Tests
    // =========================================================================

    #[test]
    fn test_window_defaults_when_both_absent() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let (start, end) = resolve_window(None, None, today);

        assert_eq!(end, "2024-03-15");
        assert_eq!(start, "2024-01-31"); // exactly 44 days earlier
    }

    #[test]
    fn test_window_start_anchored_on_supplied_end() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let (start, end) = resolve_window(None, Some("2024-02-20".to_string()), today);

        assert_eq!(end, "2024-02-20");
        assert_eq!(start, "2024-01-07");
    }

    #[test]
    fn test_window_explicit_dates_forwarded_verbatim() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let (start, end) = resolve_window(
            Some("2024-01-01".to_string()),
            Some("2024-01-31".to_string()),
            today,
        );

        assert_eq!(start, "2024-01-01");
        assert_eq!(end, "2024-01-31");
    }

    #[test]
    fn test_window_malformed_dates_pass_through() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        // Malformed values are not validated here
        let (start, end) = resolve_window(
            Some("not-a-date".to_string()),
            Some("also-not-a-date".to_string()),
            today,
        );
        assert_eq!(start, "not-a-date");
        assert_eq!(end, "also-not-a-date");

        // Unparseable end date anchors the start default on today
        let (start, end) = resolve_window(None, Some("garbage".to_string()), today);
        assert_eq!(end, "garbage");
        assert_eq!(start, "2024-01-31");
    }

    // =========================================================================
    // Token Lifecycle Tests
    // =========================================================================

    #[tokio::test]
    async fn test_first_call_issues_exactly_one_refresh() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=initial-refresh"))
            .and(body_string_contains("client_id=test-client"))
            .and(body_string_contains("client_secret=test-secret"))
            .respond_with(token_response("token-1"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());

        let token = client.ensure_valid_token().await.unwrap();
        assert_eq!(token.expose_secret(), "token-1");

        // Second call reuses the stored token; the expect(1) above
        // fails on drop if another exchange is issued.
        let token = client.ensure_valid_token().await.unwrap();
        assert_eq!(token.expose_secret(), "token-1");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(
                token_response("shared-token").set_delay(StdDuration::from_millis(200)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Arc::new(test_client(&mock_server.uri()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.ensure_valid_token().await })
            })
            .collect();

        for result in join_all(tasks).await {
            let token = result.unwrap().unwrap();
            assert_eq!(token.expose_secret(), "shared-token");
        }
    }

    #[tokio::test]
    async fn test_expired_token_triggers_refresh_with_rotated_secret() {
        let mock_server = MockServer::start().await;

        // First exchange rotates the refresh token
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .and(body_string_contains("refresh_token=initial-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "token-1",
                "refresh_token": "rotated-refresh",
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        // Second exchange must present the rotated value
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .and(body_string_contains("refresh_token=rotated-refresh"))
            .respond_with(token_response("token-2"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());

        let token = client.ensure_valid_token().await.unwrap();
        assert_eq!(token.expose_secret(), "token-1");

        client.force_expire_token();

        let token = client.ensure_valid_token().await.unwrap();
        assert_eq!(token.expose_secret(), "token-2");
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_state_unchanged() {
        let mock_server = MockServer::start().await;

        // First exchange fails, second succeeds with the same
        // (unrotated) refresh token
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .and(body_string_contains("refresh_token=initial-refresh"))
            .respond_with(token_response("token-after-retry"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());

        let err = client.ensure_valid_token().await.unwrap_err();
        assert!(matches!(err, ProxyError::RefreshFailed(_)));
        assert!(err.to_string().contains("invalid_grant"));

        // State untouched: still no valid token
        assert!(!client.health().token_valid);

        // Next request retries with the original refresh token
        let token = client.ensure_valid_token().await.unwrap();
        assert_eq!(token.expose_secret(), "token-after-retry");
    }

    #[tokio::test]
    async fn test_failed_refresh_skips_data_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("server error"))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/platform/analytics/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());

        let err = client.fetch_campaigns(None, None).await.unwrap_err();
        assert!(matches!(err, ProxyError::RefreshFailed(_)));
    }

    // =========================================================================
    // Campaign Fetch Tests
    // =========================================================================

    #[tokio::test]
    async fn test_fetch_campaigns_passes_bearer_and_dates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(token_response("token-1"))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/platform/analytics/emails"))
            .and(wiremock::matchers::header(
                "authorization",
                "Bearer token-1",
            ))
            .and(query_param("start_date", "2024-01-01"))
            .and(query_param("end_date", "2024-01-31"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "emails": [{"campaign_id": 42}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());

        let data = client
            .fetch_campaigns(
                Some("2024-01-01".to_string()),
                Some("2024-01-31".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(data["emails"][0]["campaign_id"], 42);
    }

    #[tokio::test]
    async fn test_fetch_campaigns_defaults_window_to_today() {
        let mock_server = MockServer::start().await;

        let today = Utc::now().date_naive();
        let expected_start = (today - Duration::days(44)).format("%Y-%m-%d").to_string();
        let expected_end = today.format("%Y-%m-%d").to_string();

        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(token_response("token-1"))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/platform/analytics/emails"))
            .and(query_param("start_date", expected_start.as_str()))
            .and(query_param("end_date", expected_end.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        client.fetch_campaigns(None, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_failure_carries_upstream_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(token_response("token-1"))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/platform/analytics/emails"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid date range"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());

        let err = client.fetch_campaigns(None, None).await.unwrap_err();
        assert!(matches!(err, ProxyError::FetchFailed(_)));
        assert!(err.to_string().contains("invalid date range"));
    }

    // =========================================================================
    // Health Tests
    // =========================================================================

    #[tokio::test]
    async fn test_health_is_passive_and_never_fails() {
        // Point at a port nothing listens on: a passive check must not
        // care, because it performs no network I/O.
        let client = test_client("http://127.0.0.1:9");

        let health = client.health();
        assert_eq!(health.status, "healthy");
        assert!(!health.token_valid);
        assert!(health.error.is_none());
    }

    #[tokio::test]
    async fn test_health_reports_token_validity() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(token_response("token-1"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        assert!(!client.health().token_valid);

        client.ensure_valid_token().await.unwrap();
        assert!(client.health().token_valid);

        client.force_expire_token();
        assert!(!client.health().token_valid);
    }

    #[test]
    fn test_health_status_serialization_omits_absent_error() {
        let health = HealthStatus {
            status: "healthy".to_string(),
            token_valid: true,
            error: None,
        };

        let json = serde_json::to_string(&health).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"token_valid\":true"));
        assert!(!json.contains("error"));
    }
}
