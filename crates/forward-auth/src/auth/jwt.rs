//! Bearer token validation.
//!
//! [`TokenValidator::validate`] runs a fixed sequence of checks and stops at
//! the first failure:
//!
//! 1. Envelope: size limit, three segments, JSON header and payload
//! 2. Header `alg` equals the configured algorithm (before any key lookup)
//! 3. Header `kid` present
//! 4. Key resolution through the [`KeyCache`]
//! 5. Signature over `header.payload`
//! 6. `exp`, `nbf` and `iat`
//! 7. `iss` in the allowed set
//! 8. `aud` intersects the allowed set
//! 9. `sub` present
//! 10. Revocation list, when configured and the token has a `jti`
//!
//! # Security
//!
//! - The algorithm comes from configuration, never from the token, so
//!   `none` and HMAC-with-public-key tokens are rejected at step 2
//! - A key is only used with an algorithm its family supports and that
//!   matches its declared `alg`
//! - Revocation store failures reject the token

use crate::auth::claims::{TokenClaims, VerifiedClaims};
use crate::auth::error::ValidationError;
use crate::auth::jwks::{KeyCache, VerificationKey};
use crate::config::{SigningAlgorithm, ValidationConfig};
use crate::observability::metrics;
use crate::revocation::RevocationStore;
use common::jwt::{validate_iat_at, TokenEnvelope};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Validates bearer tokens against the cached key set and configured policy.
pub struct TokenValidator {
    key_cache: Arc<KeyCache>,
    config: Arc<ValidationConfig>,
    revocation_store: Option<Arc<dyn RevocationStore>>,
}

impl TokenValidator {
    /// Create a validator without a revocation list.
    pub fn new(key_cache: Arc<KeyCache>, config: Arc<ValidationConfig>) -> Self {
        Self {
            key_cache,
            config,
            revocation_store: None,
        }
    }

    /// Consult `store` for every token that carries a `jti`.
    pub fn with_revocation_store(mut self, store: Arc<dyn RevocationStore>) -> Self {
        self.revocation_store = Some(store);
        self
    }

    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.key_cache
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a bearer token at the current wall-clock time.
    ///
    /// Emits exactly one log event and one `fa_token_validations_total`
    /// increment per call.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<VerifiedClaims, ValidationError> {
        self.validate_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Validate a bearer token as of `now` (Unix seconds).
    pub async fn validate_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<VerifiedClaims, ValidationError> {
        let result = self.run_checks(token, now).await;

        match &result {
            Ok(claims) => {
                metrics::record_token_validation("success");
                tracing::info!(
                    target: "fa.auth.jwt",
                    subject = %claims.sub,
                    issuer = %claims.iss,
                    "Token validated"
                );
            }
            Err(err) => {
                metrics::record_token_validation(err.kind());
                tracing::warn!(
                    target: "fa.auth.jwt",
                    error_kind = err.kind(),
                    error = %err,
                    "Token rejected"
                );
            }
        }

        result
    }

    async fn run_checks(&self, token: &str, now: i64) -> Result<VerifiedClaims, ValidationError> {
        let envelope = TokenEnvelope::parse(token)
            .map_err(|e| ValidationError::MalformedToken(e.to_string()))?;

        let expected = self.config.allowed_algorithm;
        if envelope.header.alg != expected.name() {
            return Err(ValidationError::AlgorithmMismatch {
                expected: expected.name().to_string(),
                found: envelope.header.alg.clone(),
            });
        }

        let kid = envelope.kid().ok_or(ValidationError::MissingKeyId)?;
        let key = self.key_cache.get_key(kid).await?;

        verify_signature(&envelope, &key, expected)?;

        let claims: TokenClaims = serde_json::from_value(Value::Object(envelope.payload))
            .map_err(|e| ValidationError::MalformedToken(format!("invalid claims: {e}")))?;

        let exp = check_time_claims(&claims, now, self.config.leeway, self.config.clock_skew)?;
        let iss = check_issuer(&claims, &self.config.allowed_issuers)?;
        let aud = check_audience(&claims, &self.config.allowed_audiences)?;

        let sub = claims
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or(ValidationError::MissingClaim("sub"))?;

        if let (Some(store), Some(jti)) = (&self.revocation_store, &claims.jti) {
            let revoked = store.is_revoked(jti).await.map_err(|e| {
                tracing::error!(target: "fa.revocation", error = %e, "Revocation lookup failed");
                ValidationError::RevocationCheckFailed(e.to_string())
            })?;
            if revoked {
                return Err(ValidationError::TokenRevoked);
            }
        }

        Ok(VerifiedClaims {
            sub,
            iss,
            aud,
            exp,
            nbf: claims.nbf,
            iat: claims.iat,
            jti: claims.jti,
            roles: claims.roles,
            extra: claims.extra,
        })
    }
}

/// Verify the signature with the configured algorithm.
///
/// Every failure collapses into `SignatureInvalid`; details go to debug logs.
fn verify_signature(
    envelope: &TokenEnvelope<'_>,
    key: &VerificationKey,
    expected: SigningAlgorithm,
) -> Result<(), ValidationError> {
    let algorithm = expected.algorithm();

    if let Some(declared) = key.algorithm() {
        if declared != algorithm {
            tracing::debug!(target: "fa.auth.jwt", kid = %key.kid(), declared = ?declared, "JWK declares a different algorithm");
            return Err(ValidationError::SignatureInvalid);
        }
    }

    if !key.family().supports(algorithm) {
        tracing::debug!(target: "fa.auth.jwt", kid = %key.kid(), family = ?key.family(), "JWK family cannot verify algorithm");
        return Err(ValidationError::SignatureInvalid);
    }

    match jsonwebtoken::crypto::verify(
        envelope.signature(),
        envelope.signing_input().as_bytes(),
        key.decoding_key(),
        algorithm,
    ) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ValidationError::SignatureInvalid),
        Err(e) => {
            tracing::debug!(target: "fa.auth.jwt", error = %e, "Signature verification error");
            Err(ValidationError::SignatureInvalid)
        }
    }
}

fn as_seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Check `exp`, `nbf` and `iat` against `now`. Returns `exp` on success.
pub(crate) fn check_time_claims(
    claims: &TokenClaims,
    now: i64,
    leeway: Duration,
    clock_skew: Duration,
) -> Result<i64, ValidationError> {
    let leeway = as_seconds(leeway);

    let exp = claims.exp.ok_or(ValidationError::MissingClaim("exp"))?;
    if now >= exp.saturating_add(leeway) {
        return Err(ValidationError::TokenExpired);
    }

    if let Some(nbf) = claims.nbf {
        if now.saturating_add(leeway) < nbf {
            return Err(ValidationError::TokenNotYetValid);
        }
    }

    if let Some(iat) = claims.iat {
        validate_iat_at(iat, clock_skew, now).map_err(|e| {
            tracing::debug!(target: "fa.auth.jwt", iat = e.iat, max_allowed = e.max_allowed, "Token iat in the future");
            ValidationError::TokenNotYetValid
        })?;
    }

    Ok(exp)
}

fn check_issuer(claims: &TokenClaims, allowed: &[String]) -> Result<String, ValidationError> {
    match &claims.iss {
        Some(iss) if allowed.iter().any(|a| a == iss) => Ok(iss.clone()),
        other => Err(ValidationError::IssuerNotAllowed(other.clone())),
    }
}

fn check_audience(claims: &TokenClaims, allowed: &[String]) -> Result<Vec<String>, ValidationError> {
    let audiences = claims
        .aud
        .clone()
        .map(|aud| aud.into_vec())
        .unwrap_or_default();

    if audiences.iter().any(|aud| allowed.contains(aud)) {
        Ok(audiences)
    } else {
        Err(ValidationError::AudienceNotAllowed)
    }
}
