//! Campaign Proxy Service Library
//!
//! An authenticated reverse proxy in front of the RD Station marketing
//! analytics API. The proxy gates inbound requests with a shared-secret
//! header and manages the upstream OAuth2 refresh-token lifecycle so a
//! caller never sees an expired bearer token.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> handlers/*.rs -> upstream/*.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - API-key gate
//! - `routes` - Axum router setup
//! - `upstream` - Analytics client and OAuth2 token lifecycle

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod upstream;
