//! Test server harness for E2E testing
//!
//! Provides `TestProxyServer` for spawning real proxy instances in
//! tests. The upstream token and analytics endpoints are pointed at a
//! caller-supplied base URL, typically a `wiremock::MockServer`.

use campaign_proxy::config::Config;
use campaign_proxy::routes::{self, AppState};
use campaign_proxy::upstream::UpstreamClient;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the campaign proxy in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<(), anyhow::Error> {
///     let mock_upstream = wiremock::MockServer::start().await;
///     let server = TestProxyServer::spawn(&mock_upstream.uri(), None).await?;
///     let client = reqwest::Client::new();
///
///     let response = client
///         .get(format!("{}/health", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestProxyServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestProxyServer {
    /// Spawn a proxy instance against the given upstream base URL.
    ///
    /// The token endpoint resolves to `{upstream}/auth/token` and the
    /// analytics base to `{upstream}/platform`. When `proxy_api_key`
    /// is `Some`, the gate is enabled with that secret on the default
    /// `X-API-KEY` header.
    pub async fn spawn(
        upstream_url: &str,
        proxy_api_key: Option<&str>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = Self::base_vars(upstream_url);
        if let Some(key) = proxy_api_key {
            vars.insert("PROXY_API_KEY".to_string(), key.to_string());
        }

        Self::spawn_with_vars(vars).await
    }

    /// Spawn a proxy instance from explicit configuration variables.
    ///
    /// Useful for tests that need a non-default header name or custom
    /// credentials; see [`TestProxyServer::base_vars`] for a starting
    /// point.
    pub async fn spawn_with_vars(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let upstream = UpstreamClient::new(&config)
            .map_err(|e| anyhow::anyhow!("Failed to build upstream client: {}", e))?;

        let state = Arc::new(AppState {
            config: config.clone(),
            upstream,
        });

        // Build routes using the proxy's real route builder
        let app = routes::build_routes(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Default configuration variables for a test instance pointing at
    /// `upstream_url`.
    pub fn base_vars(upstream_url: &str) -> HashMap<String, String> {
        HashMap::from([
            ("RD_CLIENT_ID".to_string(), "test-client".to_string()),
            ("RD_CLIENT_SECRET".to_string(), "test-secret".to_string()),
            (
                "RD_REFRESH_TOKEN".to_string(),
                "initial-refresh".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "RD_TOKEN_URL".to_string(),
                format!("{}/auth/token", upstream_url),
            ),
            (
                "RD_BASE_URL".to_string(),
                format!("{}/platform", upstream_url),
            ),
        ])
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestProxyServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released as soon as
        // the test completes.
        self._handle.abort();
    }
}
