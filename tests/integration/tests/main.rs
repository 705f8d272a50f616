//! End-to-End Integration Tests
//!
//! These tests run the MAX server on a random port with the DigiD mock
//! enabled and walk through complete logins over HTTP.

mod common;
mod login_flow;
mod oidc_endpoints;
mod rate_limiting;
mod redis_cache;
