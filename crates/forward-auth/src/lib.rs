//! Forward-auth gate library.
//!
//! Validates bearer tokens for a reverse proxy against a remote JWKS and
//! answers allow (200 plus identity header) or deny (401/403).
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/verify.rs -> auth/jwt.rs -> auth/jwks.rs -> JWKS endpoint
//!                                                   \-> revocation.rs (optional)
//! ```
//!
//! # Modules
//!
//! - `auth` - Key cache and token validation pipeline
//! - `config` - Service configuration from environment
//! - `errors` - HTTP error type with status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `observability` - Prometheus metrics
//! - `revocation` - Revocation list stores
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod revocation;
pub mod routes;
