//! Upstream analytics API client with OAuth2 token lifecycle.
//!
//! # Components
//!
//! - `token` - Token state and the refresh-token exchange
//! - `client` - The authenticated client handlers talk to

pub mod client;
pub mod token;

pub use client::{HealthStatus, UpstreamClient};
pub use token::TokenState;
