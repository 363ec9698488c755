//! Middleware for the campaign proxy.
//!
//! # Components
//!
//! - `auth` - Shared-secret API-key gate for protected routes

pub mod auth;

pub use auth::require_api_key;
