//! Key cache and token validation.
//!
//! - `jwks` - key set fetching and the shared key cache
//! - `jwt` - the validation pipeline
//! - `claims` - claims extracted from tokens
//! - `error` - validation and key resolution errors

pub mod claims;
pub mod error;
pub mod jwks;
pub mod jwt;

pub use claims::VerifiedClaims;
pub use error::{FetchError, KeyCacheError, ValidationError};
pub use jwks::{
    CacheStatus, HttpKeySetFetcher, KeyCache, KeyFamily, KeySet, KeySetFetcher, VerificationKey,
    FAILED_REFRESH_BACKOFF,
};
pub use jwt::TokenValidator;
