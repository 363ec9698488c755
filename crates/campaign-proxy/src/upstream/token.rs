//! OAuth2 token state and refresh-token exchange.
//!
//! [`TokenState`] is the in-memory record of the current access token,
//! its expiry instant, and the refresh token used to obtain the next
//! one. It lives for the process lifetime and is owned exclusively by
//! [`UpstreamClient`](super::UpstreamClient); nothing is persisted.
//!
//! # Security
//!
//! - All token material is held as `SecretString` (never logged)
//! - The exchange response redacts the tokens in Debug output
//! - Error bodies from the authorization server are carried in the
//!   returned error for the caller to surface

use crate::errors::ProxyError;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

/// Validity window applied to freshly issued access tokens, in seconds.
///
/// The upstream platform documents a 24-hour token lifetime. We treat
/// tokens as usable for 23 hours so the next request after that point
/// renews proactively, keeping a full hour of margin against clock
/// drift and request latency before the server-side expiry.
pub const TOKEN_VALIDITY_SECS: i64 = 23 * 60 * 60;

/// In-memory OAuth2 token record.
///
/// Invariant: `access_token` and `expires_at` are either both present
/// or both absent. `refresh_token` is always present and is replaced
/// only when the authorization server rotates it.
pub struct TokenState {
    access_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
    refresh_token: SecretString,
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenState")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

impl TokenState {
    /// Create an empty token state holding only the initial refresh
    /// token. The first data request populates the access token.
    pub fn new(initial_refresh_token: SecretString) -> Self {
        Self {
            access_token: None,
            expires_at: None,
            refresh_token: initial_refresh_token,
        }
    }

    /// Returns true iff an access token is present and `now` is
    /// strictly before its expiry.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, &self.expires_at) {
            (Some(_), Some(expires_at)) => now < *expires_at,
            _ => false,
        }
    }

    /// The current access token, if any.
    pub fn access_token(&self) -> Option<SecretString> {
        self.access_token.clone()
    }

    /// The refresh token to present on the next exchange.
    pub fn refresh_token(&self) -> SecretString {
        self.refresh_token.clone()
    }

    /// Atomically apply a successful exchange: replace the access token,
    /// set the expiry to `now` plus the validity window, and rotate the
    /// refresh token only when the server supplied a new one.
    pub fn apply_refresh(&mut self, tokens: RefreshedTokens, now: DateTime<Utc>) {
        self.access_token = Some(tokens.access_token);
        self.expires_at = Some(now + Duration::seconds(TOKEN_VALIDITY_SECS));

        if let Some(rotated) = tokens.refresh_token {
            self.refresh_token = rotated;
        }
    }

    /// Force the stored access token to look expired. Test-only hook for
    /// exercising the expired -> refreshed transition without sleeping.
    #[cfg(test)]
    pub fn force_expire(&mut self) {
        if self.access_token.is_some() {
            self.expires_at = Some(Utc::now() - Duration::seconds(1));
        }
    }
}

/// Result of a successful refresh-token exchange.
pub struct RefreshedTokens {
    /// Newly issued access token.
    pub access_token: SecretString,

    /// Rotated refresh token, when the server issued one.
    pub refresh_token: Option<SecretString>,
}

/// Wire shape of the token endpoint response.
#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenEndpointResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEndpointResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Perform the `grant_type=refresh_token` exchange.
///
/// On any transport failure or non-success status the exchange fails
/// with [`ProxyError::RefreshFailed`] carrying the transport error text
/// or the raw response body; the caller must leave its token state
/// untouched in that case.
pub(super) async fn exchange_refresh_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &SecretString,
    refresh_token: &SecretString,
) -> Result<RefreshedTokens, ProxyError> {
    debug!(
        target: "proxy.upstream.token",
        url = %token_url,
        client_id = %client_id,
        "Requesting access token"
    );

    let form_body = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.expose_secret()),
        ("client_id", client_id),
        ("client_secret", client_secret.expose_secret()),
    ];

    let response = http
        .post(token_url)
        .form(&form_body)
        .send()
        .await
        .map_err(|e| {
            warn!(target: "proxy.upstream.token", error = %e, "Token exchange transport failure");
            ProxyError::RefreshFailed(e.to_string())
        })?;

    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(
            target: "proxy.upstream.token",
            status = %status,
            "Token exchange rejected by authorization server"
        );
        return Err(ProxyError::RefreshFailed(body));
    }

    let token_response: TokenEndpointResponse = response.json().await.map_err(|e| {
        warn!(target: "proxy.upstream.token", error = %e, "Failed to parse token response");
        ProxyError::RefreshFailed(e.to_string())
    })?;

    debug!(
        target: "proxy.upstream.token",
        rotated = token_response.refresh_token.is_some(),
        "Access token issued"
    );

    Ok(RefreshedTokens {
        access_token: SecretString::from(token_response.access_token),
        refresh_token: token_response.refresh_token.map(SecretString::from),
    })
}
