//! Builder for test JWT claims
//!
//! Defaults describe a valid token for [`DEFAULT_ISSUER`] and
//! [`DEFAULT_AUDIENCE`] that expires in an hour.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer accepted by the default test configuration.
pub const DEFAULT_ISSUER: &str = "https://issuer.example";

/// Audience accepted by the default test configuration.
pub const DEFAULT_AUDIENCE: &str = "svc";

/// Subject placed in tokens by default.
pub const DEFAULT_SUBJECT: &str = "user-123";

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .for_subject("alice")
///     .issued_by("https://evil.example")
///     .expires_in(-1)
///     .build();
/// ```
pub struct TestClaimsBuilder {
    claims: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Create a new claims builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(DEFAULT_SUBJECT));
        claims.insert("iss".to_string(), json!(DEFAULT_ISSUER));
        claims.insert("aud".to_string(), json!(DEFAULT_AUDIENCE));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        claims.insert("iat".to_string(), json!(now.timestamp()));
        Self { claims }
    }

    pub fn for_subject(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    pub fn issued_by(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Single string audience
    pub fn for_audience(self, audience: &str) -> Self {
        self.with_claim("aud", json!(audience))
    }

    /// Array audience
    pub fn for_audiences(self, audiences: &[&str]) -> Self {
        self.with_claim("aud", json!(audiences))
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_claim("exp", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.with_claim("nbf", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set issued-at timestamp
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.with_claim("iat", json!(timestamp))
    }

    pub fn with_jti(self, jti: &str) -> Self {
        self.with_claim("jti", json!(jti))
    }

    pub fn with_roles(self, roles: &[&str]) -> Self {
        self.with_claim("roles", json!(roles))
    }

    /// Set or replace any claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Drop a claim entirely
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
