//! JWT claims structures.
//!
//! [`TokenClaims`] is the loosely-typed view of an unverified payload used by
//! the validator while checking claims. [`VerifiedClaims`] is what a
//! successful validation hands back. The `sub` field is redacted in Debug
//! output on both.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The `aud` claim, which RFC 7519 allows as a string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

/// Claims as they appear in the payload, before any check has passed.
#[derive(Clone, Deserialize)]
pub(crate) struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,

    #[serde(default)]
    pub iss: Option<String>,

    #[serde(default)]
    pub aud: Option<Audience>,

    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<i64>,

    #[serde(default, deserialize_with = "numeric_date")]
    pub nbf: Option<i64>,

    #[serde(default, deserialize_with = "numeric_date")]
    pub iat: Option<i64>,

    #[serde(default)]
    pub jti: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("jti", &self.jti)
            .finish_non_exhaustive()
    }
}

/// NumericDate per RFC 7519: seconds since the epoch, possibly fractional.
#[allow(clippy::cast_possible_truncation)]
fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(|seconds| seconds.floor() as i64))
}

/// Identity and attributes of a token that passed every check.
///
/// The `sub` field identifies a user or client and is redacted in Debug
/// output.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// Subject. Redacted in Debug output.
    pub sub: String,

    /// Issuer, one of the configured allowed issuers.
    pub iss: String,

    /// Every audience the token names (at least one is allowed).
    pub aud: Vec<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Token identifier, used for revocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Roles granted by the issuer.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Remaining custom claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Custom Debug implementation that redacts the `sub` field.
impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("jti", &self.jti)
            .field("roles", &self.roles)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VerifiedClaims {
    /// Check if the issuer granted a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Look up a custom claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
