//! JWKS fetching and the process-wide key cache.
//!
//! The [`KeyCache`] holds the most recently fetched [`KeySet`] together with
//! the time it was fetched. Lookups inside the TTL take a shared read lock and
//! never touch the network. Once the TTL has elapsed the first caller takes
//! the write lock and refreshes; callers queued behind it re-check freshness
//! and reuse the new set instead of fetching again.
//!
//! # Security
//!
//! - Symmetric (`oct`) keys and keys published for encryption are never loaded
//! - A failed refresh keeps serving the previous key set (logged and counted)
//!   and further refreshes are held off for [`FAILED_REFRESH_BACKOFF`]
//! - Every fetch is bounded by the configured timeout

use crate::auth::error::{FetchError, KeyCacheError};
use crate::config::ValidationConfig;
use crate::observability::metrics;
use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::instrument;

/// Public key family, used to refuse a key for an algorithm it cannot serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    EllipticCurve,
    OctetKeyPair,
}

impl KeyFamily {
    /// Whether keys of this family can verify signatures made with `algorithm`.
    pub fn supports(self, algorithm: Algorithm) -> bool {
        match self {
            KeyFamily::Rsa => matches!(
                algorithm,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyFamily::EllipticCurve => matches!(algorithm, Algorithm::ES256 | Algorithm::ES384),
            KeyFamily::OctetKeyPair => algorithm == Algorithm::EdDSA,
        }
    }
}

/// Map a JWK `alg` onto a signature algorithm. Encryption algorithms map to `None`.
fn signature_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// A public key from the key set, ready for signature verification.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Build a verification key from one entry of a JWKS document.
    ///
    /// Returns a human-readable reason when the entry is not usable.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let kid = jwk
            .common
            .key_id
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| "key has no kid".to_string())?;

        if let Some(key_use) = &jwk.common.public_key_use {
            if !matches!(key_use, PublicKeyUse::Signature) {
                return Err(format!("key '{kid}' is not published for signatures"));
            }
        }

        let family = match &jwk.algorithm {
            AlgorithmParameters::RSA(_) => KeyFamily::Rsa,
            AlgorithmParameters::EllipticCurve(_) => KeyFamily::EllipticCurve,
            AlgorithmParameters::OctetKeyPair(_) => KeyFamily::OctetKeyPair,
            AlgorithmParameters::OctetKey(_) => {
                return Err(format!("key '{kid}' is symmetric"));
            }
        };

        let algorithm = match jwk.common.key_algorithm {
            Some(declared) => Some(signature_algorithm(declared).ok_or_else(|| {
                format!("key '{kid}' declares a non-signature algorithm")
            })?),
            None => None,
        };

        let decoding_key = DecodingKey::from_jwk(jwk)
            .map_err(|e| format!("key '{kid}' has unusable material: {e}"))?;

        Ok(Self {
            kid,
            family,
            algorithm,
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Algorithm declared by the key's `alg` member, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

#[derive(Deserialize)]
struct JwksDocument {
    keys: Vec<Value>,
}

/// Immutable mapping from key id to verification key.
///
/// Replaced wholesale on every successful refresh.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    /// Parse a JWKS document.
    ///
    /// Entries that cannot be used for signature verification are skipped
    /// with a warning. A document without a single usable key is an error.
    pub fn from_json(body: &[u8]) -> Result<Self, FetchError> {
        let document: JwksDocument =
            serde_json::from_slice(body).map_err(|e| FetchError::Parse(e.to_string()))?;

        let mut keys = HashMap::with_capacity(document.keys.len());
        for raw in document.keys {
            let parsed = serde_json::from_value::<Jwk>(raw)
                .map_err(|e| format!("unrecognised key: {e}"))
                .and_then(|jwk| VerificationKey::from_jwk(&jwk));

            match parsed {
                Ok(key) => {
                    if keys.contains_key(&key.kid) {
                        tracing::warn!(target: "fa.auth.jwks", kid = %key.kid, "Duplicate kid in JWKS, keeping first");
                        continue;
                    }
                    keys.insert(key.kid.clone(), key);
                }
                Err(reason) => {
                    tracing::warn!(target: "fa.auth.jwks", reason = %reason, "Skipping unusable JWK");
                }
            }
        }

        if keys.is_empty() {
            return Err(FetchError::Parse(
                "key set contains no usable signing keys".to_string(),
            ));
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Source of key sets.
///
/// Production uses [`HttpKeySetFetcher`]; tests substitute scripted fetchers.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<KeySet, FetchError>;
}

/// Fetches key sets over HTTP(S).
pub struct HttpKeySetFetcher {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpKeySetFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "fa.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            http_client,
            timeout,
        }
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, url: &str) -> Result<KeySet, FetchError> {
        let response = self
            .http_client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        KeySet::from_json(&body)
    }
}

/// Snapshot of the cache for readiness reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatus {
    /// Keys in the current set (0 before the first successful fetch).
    pub key_count: usize,

    /// Time since the last successful fetch.
    pub age: Option<Duration>,

    /// Whether the current set is inside its TTL.
    pub fresh: bool,
}

/// Minimum spacing between refresh attempts while a stale set is being served.
pub const FAILED_REFRESH_BACKOFF: Duration = Duration::from_secs(5);

struct CacheState {
    key_set: Option<Arc<KeySet>>,
    last_fetch: Option<Instant>,
    /// Set when a refresh fails, cleared by the next success.
    last_failure: Option<Instant>,
}

impl CacheState {
    fn fresh_set(&self, ttl: Duration) -> Option<&KeySet> {
        match (&self.key_set, self.last_fetch) {
            (Some(key_set), Some(fetched_at)) if fetched_at.elapsed() < ttl => Some(&**key_set),
            _ => None,
        }
    }

    /// The stale set, if a refresh failed within the backoff window.
    fn backed_off_set(&self) -> Option<&KeySet> {
        match (&self.key_set, self.last_failure) {
            (Some(key_set), Some(failed_at)) if failed_at.elapsed() < FAILED_REFRESH_BACKOFF => {
                Some(&**key_set)
            }
            _ => None,
        }
    }
}

/// Time-bounded cache of the published key set.
pub struct KeyCache {
    jwks_url: String,
    fetcher: Arc<dyn KeySetFetcher>,
    ttl: Duration,
    fetch_timeout: Duration,
    state: RwLock<CacheState>,
}

impl KeyCache {
    /// Create an empty cache. Nothing is fetched until [`warm`](Self::warm)
    /// or the first lookup.
    pub fn new(
        jwks_url: String,
        fetcher: Arc<dyn KeySetFetcher>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            jwks_url,
            fetcher,
            ttl,
            fetch_timeout,
            state: RwLock::new(CacheState {
                key_set: None,
                last_fetch: None,
                last_failure: None,
            }),
        }
    }

    /// Create an empty cache backed by [`HttpKeySetFetcher`].
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(
            config.jwks_url.clone(),
            Arc::new(HttpKeySetFetcher::new(config.fetch_timeout)),
            config.cache_ttl,
            config.fetch_timeout,
        )
    }

    /// Create a cache and perform the initial fetch.
    ///
    /// # Errors
    ///
    /// Fails when the first key set cannot be fetched; the caller should
    /// refuse to start.
    pub async fn connect(config: &ValidationConfig) -> Result<Self, KeyCacheError> {
        let cache = Self::from_config(config);
        cache.warm().await?;
        Ok(cache)
    }

    /// Fetch the key set now, regardless of freshness.
    ///
    /// Returns the number of keys loaded.
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    pub async fn warm(&self) -> Result<usize, KeyCacheError> {
        let mut state = self.state.write().await;
        let key_set = self.refresh_locked(&mut state).await?;
        Ok(key_set.len())
    }

    /// Resolve a key id to its verification key.
    ///
    /// # Errors
    ///
    /// Returns `KeyCacheError::KeyNotFound` if the current set lacks `kid`.
    /// Returns `KeyCacheError::Fetch` only when no key set has ever been
    /// fetched; otherwise refresh failures fall back to the stale set, and
    /// no new refresh is attempted for [`FAILED_REFRESH_BACKOFF`].
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<VerificationKey, KeyCacheError> {
        {
            let state = self.state.read().await;
            if let Some(key_set) = state.fresh_set(self.ttl) {
                return lookup(key_set, kid);
            }
        }

        let mut state = self.state.write().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(key_set) = state.fresh_set(self.ttl) {
            tracing::debug!(target: "fa.auth.jwks", "JWKS refreshed by concurrent caller");
            return lookup(key_set, kid);
        }

        // Refresh failed recently, answer from the stale set without fetching
        if let Some(key_set) = state.backed_off_set() {
            metrics::record_jwks_stale_fallback();
            return lookup(key_set, kid);
        }

        match self.refresh_locked(&mut state).await {
            Ok(key_set) => lookup(&key_set, kid),
            Err(err) => match (&state.key_set, state.last_fetch) {
                (Some(stale), last_fetch) => {
                    tracing::warn!(
                        target: "fa.auth.jwks",
                        error = %err,
                        age_seconds = last_fetch.map(|t| t.elapsed().as_secs()),
                        "JWKS refresh failed, serving stale key set"
                    );
                    metrics::record_jwks_stale_fallback();
                    lookup(stale, kid)
                }
                (None, _) => Err(KeyCacheError::Fetch(err)),
            },
        }
    }

    /// Report key count and freshness for the readiness probe.
    pub async fn status(&self) -> CacheStatus {
        let state = self.state.read().await;
        let age = state.last_fetch.map(|t| t.elapsed());
        CacheStatus {
            key_count: state.key_set.as_ref().map_or(0, |set| set.len()),
            age,
            fresh: state.fresh_set(self.ttl).is_some(),
        }
    }

    /// Fetch and install a new key set. Must be called with the write lock held.
    async fn refresh_locked(&self, state: &mut CacheState) -> Result<Arc<KeySet>, FetchError> {
        tracing::debug!(target: "fa.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&self.jwks_url))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
            };
        let elapsed = started.elapsed();

        match outcome {
            Ok(key_set) => {
                let key_set = Arc::new(key_set);
                *state = CacheState {
                    key_set: Some(Arc::clone(&key_set)),
                    last_fetch: Some(Instant::now()),
                    last_failure: None,
                };
                metrics::record_jwks_refresh("success", elapsed);
                tracing::info!(
                    target: "fa.auth.jwks",
                    key_count = key_set.len(),
                    "JWKS cache refreshed"
                );
                Ok(key_set)
            }
            Err(err) => {
                metrics::record_jwks_refresh(err.kind(), elapsed);
                tracing::error!(target: "fa.auth.jwks", error = %err, "Failed to fetch JWKS");
                state.last_failure = Some(Instant::now());
                Err(err)
            }
        }
    }
}

fn lookup(key_set: &KeySet, kid: &str) -> Result<VerificationKey, KeyCacheError> {
    key_set.get(kid).cloned().ok_or_else(|| {
        tracing::debug!(target: "fa.auth.jwks", kid = %kid, "Key not found in JWKS");
        KeyCacheError::KeyNotFound(kid.to_string())
    })
}
