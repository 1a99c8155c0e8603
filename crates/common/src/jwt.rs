//! JWT envelope utilities shared by the gate and its test tooling.
//!
//! This module provides:
//! - Size limits for DoS prevention
//! - Clock skew constants for `iat` validation
//! - Structural parsing of the compact JWS envelope (header, payload,
//!   signature) without trusting any field
//! - `iat` validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Parsing never verifies a signature; callers must verify before trusting
//!   any payload field
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::TokenEnvelope;
//!
//! let envelope = TokenEnvelope::parse(token)?;
//! if envelope.header.alg != "RS256" {
//!     return Err("algorithm mismatch");
//! }
//! let kid = envelope.kid().ok_or("missing kid")?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected before any base64 decoding or
/// cryptographic work.
///
/// - Typical RS256 access tokens are 600-1200 bytes
/// - 8KB leaves room for large custom claim sets
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance for `iat` (5 minutes per NIST SP 800-63B).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Bounds configuration so a typo cannot disable temporal checks.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Structural problems found while splitting and decoding a compact JWS.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Token size exceeds maximum allowed.
    #[error("token exceeds maximum allowed size")]
    TokenTooLarge,

    /// Token does not have exactly three dot-separated segments.
    #[error("expected 3 segments, found {0}")]
    SegmentCount(usize),

    /// A segment is not valid unpadded base64url.
    #[error("{0} segment is not valid base64url")]
    Encoding(&'static str),

    /// Header or payload is not a JSON object of the expected shape.
    #[error("{0} segment is not a valid JSON object")]
    Json(&'static str),

    /// Signature segment decodes to zero bytes.
    #[error("signature segment is empty")]
    EmptySignature,
}

/// `iat` lies further in the future than the permitted clock skew.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("iat {iat} is later than {max_allowed}")]
pub struct IatInFuture {
    pub iat: i64,
    pub max_allowed: i64,
}

// =============================================================================
// Envelope
// =============================================================================

/// JOSE header fields the gate looks at.
///
/// `alg` is kept as a raw string so that values unknown to the crypto
/// backend (`none`, `HS256` on an RSA deployment, ...) can still be reported
/// as an algorithm mismatch instead of a parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtHeader {
    /// Declared signing algorithm.
    pub alg: String,

    /// Key identifier used for JWKS lookup. A non-string `kid` reads as
    /// absent.
    #[serde(default, deserialize_with = "string_or_none")]
    pub kid: Option<String>,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(value)) => Some(value),
        _ => None,
    })
}

/// An untrusted, structurally valid compact JWS.
#[derive(Debug, Clone)]
pub struct TokenEnvelope<'a> {
    /// Decoded protected header.
    pub header: JwtHeader,

    /// Decoded payload. Untrusted until the signature has been verified.
    pub payload: Map<String, Value>,

    signing_input: &'a str,
    signature: &'a str,
}

impl<'a> TokenEnvelope<'a> {
    /// Split `token` into its three segments and decode header and payload.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] describing the first structural defect.
    pub fn parse(token: &'a str) -> Result<Self, EnvelopeError> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(
                target: "common.jwt",
                token_size = token.len(),
                max_size = MAX_JWT_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(EnvelopeError::TokenTooLarge);
        }

        let segments = token.split('.').count();
        if segments != 3 {
            return Err(EnvelopeError::SegmentCount(segments));
        }

        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or(EnvelopeError::SegmentCount(segments))?;
        let (header_b64, payload_b64) = signing_input
            .split_once('.')
            .ok_or(EnvelopeError::SegmentCount(segments))?;

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| EnvelopeError::Encoding("header"))?;
        let header: JwtHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| EnvelopeError::Json("header"))?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| EnvelopeError::Encoding("payload"))?;
        let payload: Map<String, Value> =
            serde_json::from_slice(&payload_bytes).map_err(|_| EnvelopeError::Json("payload"))?;

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| EnvelopeError::Encoding("signature"))?;
        if signature_bytes.is_empty() {
            return Err(EnvelopeError::EmptySignature);
        }

        Ok(Self {
            header,
            payload,
            signing_input,
            signature,
        })
    }

    /// Key identifier from the header, if present and non-empty.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref().filter(|kid| !kid.is_empty())
    }

    /// The `header.payload` bytes covered by the signature.
    #[must_use]
    pub fn signing_input(&self) -> &'a str {
        self.signing_input
    }

    /// The base64url-encoded signature segment.
    #[must_use]
    pub fn signature(&self) -> &'a str {
        self.signature
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Validate the `iat` (issued-at) claim against an explicit `now`.
///
/// Rejects tokens issued more than `clock_skew` in the future, which usually
/// means pre-generated tokens or badly drifting issuer clocks.
///
/// # Errors
///
/// Returns [`IatInFuture`] if `iat > now + clock_skew`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), IatInFuture> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_allowed = now.saturating_add(clock_skew_secs);

    if iat > max_allowed {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_allowed,
            "Token rejected: iat too far in the future"
        );
        return Err(IatInFuture { iat, max_allowed });
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
