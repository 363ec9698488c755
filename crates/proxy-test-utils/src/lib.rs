//! Test utilities for the campaign proxy.
//!
//! Provides `TestProxyServer` for spawning real proxy instances in
//! integration tests, pointed at a mock upstream.

pub mod server_harness;

pub use server_harness::TestProxyServer;
