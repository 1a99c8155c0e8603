//! Token revocation list keyed by token identifier (`jti`).
//!
//! The validator consults a [`RevocationStore`] only when one is wired in,
//! and only for tokens that carry a `jti`. A store that cannot answer makes
//! the validation fail closed.

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Prefix for revocation entries in Redis.
pub const REDIS_KEY_PREFIX: &str = "revoked:";

#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("Revocation store connection failed: {0}")]
    Connection(String),

    #[error("Revocation store command failed: {0}")]
    Command(String),
}

/// Lookup and insertion of revoked token identifiers.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Whether the token identifier has been revoked.
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError>;

    /// Revoke a token identifier for `ttl`, normally the token's remaining lifetime.
    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), RevocationError>;
}

/// Revocation list stored in Redis as `revoked:<jti>` keys with an expiry.
#[derive(Clone)]
pub struct RedisRevocationStore {
    connection: ConnectionManager,
}

impl RedisRevocationStore {
    /// Connect to Redis. The URL may carry credentials and is never logged.
    pub async fn connect(url: &SecretString) -> Result<Self, RevocationError> {
        let client = redis::Client::open(url.expose_secret())
            .map_err(|e| RevocationError::Connection(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| RevocationError::Connection(e.to_string()))?;

        tracing::info!(target: "fa.revocation", "Connected to Redis revocation store");
        Ok(Self { connection })
    }

    fn key(jti: &str) -> String {
        format!("{REDIS_KEY_PREFIX}{jti}")
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let mut connection = self.connection.clone();
        connection
            .exists(Self::key(jti))
            .await
            .map_err(|e| RevocationError::Command(e.to_string()))
    }

    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), RevocationError> {
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(Self::key(jti), "revoked", ttl.as_secs().max(1))
            .await
            .map_err(|e| RevocationError::Command(e.to_string()))?;

        tracing::info!(target: "fa.revocation", ttl_seconds = ttl.as_secs(), "Token revoked");
        Ok(())
    }
}

/// Process-local revocation list. Entries disappear after their TTL.
#[derive(Default)]
pub struct InMemoryRevocationStore {
    /// `None` marks an entry whose TTL runs past the clock's range.
    entries: Mutex<HashMap<String, Option<Instant>>>,
}

fn unexpired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.map_or(true, |at| at > now)
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|expires_at| unexpired(**expires_at, now))
            .count()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, expires_at| unexpired(*expires_at, now));
        Ok(entries.contains_key(jti))
    }

    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), RevocationError> {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries.lock().await.insert(jti.to_string(), expires_at);
        Ok(())
    }
}
