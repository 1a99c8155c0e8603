//! # Forward-auth Test Utilities
//!
//! Shared test utilities for the forward-auth gate.
//!
//! This crate provides:
//! - Deterministic signing keys (RSA and Ed25519) that render as JWKs
//! - A claims builder (`TestClaimsBuilder`)
//! - A wiremock JWKS endpoint
//! - Server test harness (`TestGateServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fa_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let jwks = wiremock::MockServer::start().await;
//!     let key = TestSigningKey::rsa("k1");
//!     mount_jwks(&jwks, &[&key]).await;
//!
//!     let server = TestGateServer::spawn(&jwks_url(&jwks)).await?;
//!     let token = key.sign(&TestClaimsBuilder::new().build());
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;
