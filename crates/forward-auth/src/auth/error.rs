//! Error taxonomy for key resolution and token validation.
//!
//! Variants carry enough detail for server-side logs. None of it reaches
//! the client: the gate collapses every [`ValidationError`] into one denial.

use std::time::Duration;
use thiserror::Error;

/// Failure to obtain a key set from the publication endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("JWKS endpoint returned HTTP {0}")]
    Status(u16),

    #[error("JWKS request failed: {0}")]
    Transport(String),

    #[error("JWKS document could not be parsed: {0}")]
    Parse(String),

    #[error("JWKS fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// Label used for the `status` dimension of refresh metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Status(_) => "http_status",
            FetchError::Transport(_) => "transport",
            FetchError::Parse(_) => "parse",
            FetchError::Timeout(_) => "timeout",
        }
    }
}

/// Failure to resolve a key identifier through the cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyCacheError {
    /// The current key set has no entry for this identifier.
    #[error("Key '{0}' not found in JWKS")]
    KeyNotFound(String),

    /// No usable key set could be obtained.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Reason a bearer token was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Algorithm mismatch: expected {expected}, found {found}")]
    AlgorithmMismatch { expected: String, found: String },

    #[error("Token header has no key id")]
    MissingKeyId,

    #[error("Signing key '{0}' is not published")]
    KeyNotFound(String),

    #[error("Signing keys unavailable: {0}")]
    KeyResolutionFailed(FetchError),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token not yet valid")]
    TokenNotYetValid,

    #[error("Issuer not allowed: {0:?}")]
    IssuerNotAllowed(Option<String>),

    #[error("No allowed audience in token")]
    AudienceNotAllowed,

    #[error("Required claim missing: {0}")]
    MissingClaim(&'static str),

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Revocation check failed: {0}")]
    RevocationCheckFailed(String),
}

impl ValidationError {
    /// Stable snake_case name used in logs and as the metric outcome label.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MalformedToken(_) => "malformed_token",
            ValidationError::AlgorithmMismatch { .. } => "algorithm_mismatch",
            ValidationError::MissingKeyId => "missing_key_id",
            ValidationError::KeyNotFound(_) => "key_not_found",
            ValidationError::KeyResolutionFailed(_) => "key_resolution_failed",
            ValidationError::SignatureInvalid => "signature_invalid",
            ValidationError::TokenExpired => "token_expired",
            ValidationError::TokenNotYetValid => "token_not_yet_valid",
            ValidationError::IssuerNotAllowed(_) => "issuer_not_allowed",
            ValidationError::AudienceNotAllowed => "audience_not_allowed",
            ValidationError::MissingClaim(_) => "missing_claim",
            ValidationError::TokenRevoked => "token_revoked",
            ValidationError::RevocationCheckFailed(_) => "revocation_check_failed",
        }
    }
}

impl From<KeyCacheError> for ValidationError {
    fn from(err: KeyCacheError) -> Self {
        match err {
            KeyCacheError::KeyNotFound(kid) => ValidationError::KeyNotFound(kid),
            KeyCacheError::Fetch(fetch) => ValidationError::KeyResolutionFailed(fetch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_cache_errors_stay_distinct() {
        let not_found: ValidationError = KeyCacheError::KeyNotFound("k9".to_string()).into();
        assert_eq!(not_found, ValidationError::KeyNotFound("k9".to_string()));
        assert_eq!(not_found.kind(), "key_not_found");

        let unavailable: ValidationError = KeyCacheError::Fetch(FetchError::Status(500)).into();
        assert_eq!(
            unavailable,
            ValidationError::KeyResolutionFailed(FetchError::Status(500))
        );
        assert_eq!(unavailable.kind(), "key_resolution_failed");
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(
            ValidationError::AlgorithmMismatch {
                expected: "RS256".to_string(),
                found: "HS256".to_string(),
            }
            .to_string(),
            "Algorithm mismatch: expected RS256, found HS256"
        );
        assert_eq!(
            ValidationError::MissingClaim("exp").to_string(),
            "Required claim missing: exp"
        );
        assert_eq!(
            FetchError::Timeout(Duration::from_secs(2)).to_string(),
            "JWKS fetch timed out after 2s"
        );
        assert_eq!(
            KeyCacheError::Fetch(FetchError::Status(503)).to_string(),
            "JWKS endpoint returned HTTP 503"
        );
    }

    #[test]
    fn test_kinds_are_snake_case() {
        let errors = [
            ValidationError::MalformedToken("x".to_string()),
            ValidationError::MissingKeyId,
            ValidationError::SignatureInvalid,
            ValidationError::TokenExpired,
            ValidationError::TokenNotYetValid,
            ValidationError::IssuerNotAllowed(None),
            ValidationError::AudienceNotAllowed,
            ValidationError::TokenRevoked,
            ValidationError::RevocationCheckFailed("down".to_string()),
        ];

        for err in errors {
            let kind = err.kind();
            assert!(
                kind.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "kind {kind} is not snake_case"
            );
        }
    }

    #[test]
    fn test_fetch_error_kinds() {
        assert_eq!(FetchError::Status(404).kind(), "http_status");
        assert_eq!(FetchError::Transport("refused".into()).kind(), "transport");
        assert_eq!(FetchError::Parse("eof".into()).kind(), "parse");
        assert_eq!(FetchError::Timeout(Duration::from_secs(1)).kind(), "timeout");
    }
}
