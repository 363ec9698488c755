//! Campaign proxy configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are held as [`SecretString`] and redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default OAuth2 token endpoint of the upstream platform.
pub const DEFAULT_TOKEN_URL: &str = "https://api.rd.services/auth/token";

/// Default base URL of the upstream analytics API.
pub const DEFAULT_BASE_URL: &str = "https://api.rd.services/platform";

/// Default header carrying the proxy API key.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-KEY";

/// Campaign proxy configuration.
///
/// Loaded from environment variables. The upstream credentials are
/// required; everything else has a sensible default. Secrets are
/// redacted in Debug output to prevent credential leakage.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// OAuth2 client identifier for the upstream platform.
    pub client_id: String,

    /// OAuth2 client secret for the upstream platform.
    pub client_secret: SecretString,

    /// Initial OAuth2 refresh token. May be rotated by the
    /// authorization server during the process lifetime.
    pub refresh_token: SecretString,

    /// OAuth2 token endpoint URL.
    pub token_url: String,

    /// Base URL of the upstream analytics API.
    pub base_url: String,

    /// Shared secret required on protected routes. `None` disables the
    /// access gate entirely.
    pub proxy_api_key: Option<SecretString>,

    /// Name of the request header carrying the proxy API key
    /// (default: "X-API-KEY").
    pub api_key_header_name: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_url", &self.token_url)
            .field("base_url", &self.base_url)
            .field(
                "proxy_api_key",
                &self.proxy_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_key_header_name", &self.api_key_header_name)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let client_id = vars
            .get("RD_CLIENT_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("RD_CLIENT_ID".to_string()))?
            .clone();

        let client_secret = vars
            .get("RD_CLIENT_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("RD_CLIENT_SECRET".to_string()))
            .map(|s| SecretString::from(s.clone()))?;

        let refresh_token = vars
            .get("RD_REFRESH_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("RD_REFRESH_TOKEN".to_string()))
            .map(|s| SecretString::from(s.clone()))?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let token_url = vars
            .get("RD_TOKEN_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        let base_url = vars
            .get("RD_BASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        // An absent key disables the gate; an empty value is treated the
        // same way so a blank variable cannot accidentally allow-all with
        // an empty-string comparison.
        let proxy_api_key = vars
            .get("PROXY_API_KEY")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let api_key_header_name = vars
            .get("API_KEY_HEADER_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());

        Ok(Config {
            bind_address,
            client_id,
            client_secret,
            refresh_token,
            token_url,
            base_url,
            proxy_api_key,
            api_key_header_name,
        })
    }
}
