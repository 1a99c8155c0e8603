//! Forward-auth gate configuration.
//!
//! Configuration is loaded from environment variables once at startup and is
//! read-only afterwards. The Redis URL is redacted in Debug output.

use axum::http::HeaderName;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default signing algorithm when `ALLOWED_ALG` is unset.
pub const DEFAULT_ALGORITHM: &str = "RS256";

/// Default JWKS cache TTL in seconds (1 hour).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 3600;

/// Default timeout for a single JWKS fetch in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Default header carrying the verified subject to the downstream service.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

/// Asymmetric algorithms the gate can verify with JWKS-published keys.
///
/// HMAC algorithms are deliberately absent: a public key set cannot carry
/// a shared secret.
const SUPPORTED_ALGORITHMS: [(&str, Algorithm); 9] = [
    ("RS256", Algorithm::RS256),
    ("RS384", Algorithm::RS384),
    ("RS512", Algorithm::RS512),
    ("PS256", Algorithm::PS256),
    ("PS384", Algorithm::PS384),
    ("PS512", Algorithm::PS512),
    ("ES256", Algorithm::ES256),
    ("ES384", Algorithm::ES384),
    ("EdDSA", Algorithm::EdDSA),
];

/// The single signing algorithm tokens must declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningAlgorithm {
    name: &'static str,
    algorithm: Algorithm,
}

impl SigningAlgorithm {
    /// Look up a supported algorithm by its JOSE name (case-sensitive).
    pub fn parse(name: &str) -> Option<Self> {
        SUPPORTED_ALGORITHMS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(name, algorithm)| Self {
                name,
                algorithm: *algorithm,
            })
    }

    /// JOSE name as it appears in the token header.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The `jsonwebtoken` algorithm used for signature verification.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Parameters for the key cache and token validator.
///
/// Built once from [`Config`] and shared by `Arc` for the process lifetime.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// URL of the published key set.
    pub jwks_url: String,

    /// Accepted `iss` values. Never empty.
    pub allowed_issuers: Vec<String>,

    /// Accepted `aud` values. Never empty.
    pub allowed_audiences: Vec<String>,

    /// Algorithm every token header must declare.
    pub allowed_algorithm: SigningAlgorithm,

    /// Freshness window of the cached key set.
    pub cache_ttl: Duration,

    /// Upper bound on a single key set fetch.
    pub fetch_timeout: Duration,

    /// Tolerance applied to `exp` and `nbf`.
    pub leeway: Duration,

    /// Tolerance for `iat` in the future.
    pub clock_skew: Duration,
}

/// Forward-auth configuration.
///
/// Loaded from environment variables with defaults for everything except the
/// key set URL, issuers and audiences.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// URL of the JWKS endpoint.
    pub jwks_url: String,

    /// Issuers accepted in the `iss` claim.
    pub allowed_issuers: Vec<String>,

    /// Audiences accepted in the `aud` claim.
    pub allowed_audiences: Vec<String>,

    /// Signing algorithm tokens must use (default: RS256).
    pub allowed_algorithm: SigningAlgorithm,

    /// JWKS cache freshness window in seconds.
    pub jwks_cache_ttl_seconds: u64,

    /// Timeout for one JWKS fetch in seconds.
    pub jwks_fetch_timeout_seconds: u64,

    /// Leeway for `exp`/`nbf` in seconds (default: 0).
    pub jwt_leeway_seconds: u64,

    /// Clock skew tolerance for `iat` in seconds.
    pub jwt_clock_skew_seconds: u64,

    /// Response header that carries the verified subject.
    pub identity_header: HeaderName,

    /// Redis URL for the revocation list. Revocation checks are off when unset.
    pub redis_url: Option<SecretString>,

    /// Seconds to keep serving after a shutdown signal.
    pub shutdown_drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("jwks_url", &self.jwks_url)
            .field("allowed_issuers", &self.allowed_issuers)
            .field("allowed_audiences", &self.allowed_audiences)
            .field("allowed_algorithm", &self.allowed_algorithm.name())
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field(
                "jwks_fetch_timeout_seconds",
                &self.jwks_fetch_timeout_seconds,
            )
            .field("jwt_leeway_seconds", &self.jwt_leeway_seconds)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("identity_header", &self.identity_header)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("shutdown_drain_seconds", &self.shutdown_drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Environment variable {0} must contain at least one non-empty entry")]
    EmptyList(String),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidCacheTtl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid JWT leeway configuration: {0}")]
    InvalidLeeway(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid identity header name: {0}")]
    InvalidIdentityHeader(String),

    #[error("Invalid shutdown drain configuration: {0}")]
    InvalidDrainPeriod(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwks_url = required(vars, "JWKS_URL")?;
        let allowed_issuers = required_list(vars, "ALLOWED_ISSUERS")?;
        let allowed_audiences = required_list(vars, "ALLOWED_AUDIENCES")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let algorithm_name = vars
            .get("ALLOWED_ALG")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_ALGORITHM.to_string());
        let allowed_algorithm = SigningAlgorithm::parse(&algorithm_name)
            .ok_or(ConfigError::UnsupportedAlgorithm(algorithm_name))?;

        let jwks_cache_ttl_seconds = parse_seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
            ConfigError::InvalidCacheTtl,
        )?;
        if jwks_cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidCacheTtl(
                "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }

        let jwks_fetch_timeout_seconds = parse_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
            ConfigError::InvalidFetchTimeout,
        )?;
        if jwks_fetch_timeout_seconds == 0 {
            return Err(ConfigError::InvalidFetchTimeout(
                "JWKS_FETCH_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        let jwt_leeway_seconds =
            parse_seconds(vars, "JWT_LEEWAY_SECONDS", 0, ConfigError::InvalidLeeway)?;
        if jwt_leeway_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidLeeway(format!(
                "JWT_LEEWAY_SECONDS must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                jwt_leeway_seconds
            )));
        }

        let jwt_clock_skew_seconds = parse_seconds(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
            ConfigError::InvalidJwtClockSkew,
        )?;
        if jwt_clock_skew_seconds == 0 {
            return Err(ConfigError::InvalidJwtClockSkew(
                "JWT_CLOCK_SKEW_SECONDS must be positive, got 0".to_string(),
            ));
        }
        if jwt_clock_skew_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidJwtClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                jwt_clock_skew_seconds
            )));
        }

        let identity_header_name = vars
            .get("IDENTITY_HEADER")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_IDENTITY_HEADER.to_string());
        let identity_header = HeaderName::from_bytes(identity_header_name.as_bytes())
            .map_err(|_| ConfigError::InvalidIdentityHeader(identity_header_name))?;

        let redis_url = vars
            .get("REDIS_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| SecretString::from(url.trim().to_string()));

        let shutdown_drain_seconds = parse_seconds(
            vars,
            "SHUTDOWN_DRAIN_SECONDS",
            0,
            ConfigError::InvalidDrainPeriod,
        )?;

        Ok(Config {
            bind_address,
            jwks_url,
            allowed_issuers,
            allowed_audiences,
            allowed_algorithm,
            jwks_cache_ttl_seconds,
            jwks_fetch_timeout_seconds,
            jwt_leeway_seconds,
            jwt_clock_skew_seconds,
            identity_header,
            redis_url,
            shutdown_drain_seconds,
        })
    }

    /// Project the immutable parameters used by the key cache and validator.
    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            jwks_url: self.jwks_url.clone(),
            allowed_issuers: self.allowed_issuers.clone(),
            allowed_audiences: self.allowed_audiences.clone(),
            allowed_algorithm: self.allowed_algorithm,
            cache_ttl: Duration::from_secs(self.jwks_cache_ttl_seconds),
            fetch_timeout: Duration::from_secs(self.jwks_fetch_timeout_seconds),
            leeway: Duration::from_secs(self.jwt_leeway_seconds),
            clock_skew: Duration::from_secs(self.jwt_clock_skew_seconds),
        }
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn required_list(vars: &HashMap<String, String>, name: &str) -> Result<Vec<String>, ConfigError> {
    let raw = required(vars, name)?;
    let entries: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect();

    if entries.is_empty() {
        return Err(ConfigError::EmptyList(name.to_string()));
    }

    Ok(entries)
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    error: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    match vars.get(name) {
        Some(value_str) => value_str.trim().parse().map_err(|e| {
            error(format!(
                "{} must be a valid non-negative integer, got '{}': {}",
                name, value_str, e
            ))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "JWKS_URL".to_string(),
                "https://issuer.example/.well-known/jwks.json".to_string(),
            ),
            (
                "ALLOWED_ISSUERS".to_string(),
                "https://issuer.example".to_string(),
            ),
            ("ALLOWED_AUDIENCES".to_string(), "svc".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(
            config.jwks_url,
            "https://issuer.example/.well-known/jwks.json"
        );
        assert_eq!(config.allowed_issuers, vec!["https://issuer.example"]);
        assert_eq!(config.allowed_audiences, vec!["svc"]);
        assert_eq!(config.allowed_algorithm.name(), "RS256");
        assert_eq!(config.jwks_cache_ttl_seconds, DEFAULT_JWKS_CACHE_TTL_SECONDS);
        assert_eq!(
            config.jwks_fetch_timeout_seconds,
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS
        );
        assert_eq!(config.jwt_leeway_seconds, 0);
        assert_eq!(config.jwt_clock_skew_seconds, DEFAULT_CLOCK_SKEW.as_secs());
        assert_eq!(config.identity_header.as_str(), "x-user-id");
        assert!(config.redis_url.is_none());
        assert_eq!(config.shutdown_drain_seconds, 0);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert(
            "ALLOWED_ISSUERS".to_string(),
            " https://a.example , https://b.example ,".to_string(),
        );
        vars.insert("ALLOWED_AUDIENCES".to_string(), "svc,admin".to_string());
        vars.insert("ALLOWED_ALG".to_string(), "EdDSA".to_string());
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "120".to_string());
        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "3".to_string());
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "30".to_string());
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "60".to_string());
        vars.insert("IDENTITY_HEADER".to_string(), "X-Forwarded-User".to_string());
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:secret@localhost:6379".to_string(),
        );
        vars.insert("SHUTDOWN_DRAIN_SECONDS".to_string(), "5".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(
            config.allowed_issuers,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.allowed_audiences, vec!["svc", "admin"]);
        assert_eq!(config.allowed_algorithm.algorithm(), Algorithm::EdDSA);
        assert_eq!(config.jwks_cache_ttl_seconds, 120);
        assert_eq!(config.jwks_fetch_timeout_seconds, 3);
        assert_eq!(config.jwt_leeway_seconds, 30);
        assert_eq!(config.jwt_clock_skew_seconds, 60);
        assert_eq!(config.identity_header.as_str(), "x-forwarded-user");
        assert_eq!(
            config.redis_url.as_ref().unwrap().expose_secret(),
            "redis://:secret@localhost:6379"
        );
        assert_eq!(config.shutdown_drain_seconds, 5);
    }

    #[test]
    fn test_validation_config_projection() {
        let mut vars = base_vars();
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "90".to_string());
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "2".to_string());

        let validation = Config::from_vars(&vars).unwrap().validation_config();

        assert_eq!(validation.cache_ttl, Duration::from_secs(90));
        assert_eq!(validation.fetch_timeout, Duration::from_secs(10));
        assert_eq!(validation.leeway, Duration::from_secs(2));
        assert_eq!(validation.clock_skew, DEFAULT_CLOCK_SKEW);
        assert_eq!(validation.allowed_algorithm.name(), "RS256");
    }

    #[test]
    fn test_from_vars_missing_required_values() {
        for name in ["JWKS_URL", "ALLOWED_ISSUERS", "ALLOWED_AUDIENCES"] {
            let mut vars = base_vars();
            vars.remove(name);

            let result = Config::from_vars(&vars);
            assert!(
                matches!(&result, Err(ConfigError::MissingEnvVar(v)) if v == name),
                "expected MissingEnvVar({name}), got {result:?}"
            );
        }
    }

    #[test]
    fn test_from_vars_blank_required_value_is_missing() {
        let mut vars = base_vars();
        vars.insert("JWKS_URL".to_string(), "   ".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "JWKS_URL"));
    }

    #[test]
    fn test_from_vars_list_of_only_separators_is_empty() {
        let mut vars = base_vars();
        vars.insert("ALLOWED_AUDIENCES".to_string(), " , ,".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::EmptyList(v)) if v == "ALLOWED_AUDIENCES"));
    }

    #[test]
    fn test_rejects_hmac_algorithm() {
        let mut vars = base_vars();
        vars.insert("ALLOWED_ALG".to_string(), "HS256".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::UnsupportedAlgorithm(v)) if v == "HS256"));
    }

    #[test]
    fn test_algorithm_names_are_case_sensitive() {
        assert!(SigningAlgorithm::parse("rs256").is_none());
        assert!(SigningAlgorithm::parse("none").is_none());
        assert_eq!(SigningAlgorithm::parse("ES384").unwrap().name(), "ES384");
        assert_eq!(SigningAlgorithm::parse("PS256").unwrap().to_string(), "PS256");
    }

    #[test]
    fn test_cache_ttl_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidCacheTtl(msg)) if msg.contains("greater than 0"))
        );
    }

    #[test]
    fn test_cache_ttl_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("JWKS_CACHE_TTL_SECONDS".to_string(), "1h".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidCacheTtl(msg)) if msg.contains("valid non-negative integer"))
        );
    }

    #[test]
    fn test_fetch_timeout_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidFetchTimeout(_))));
    }

    #[test]
    fn test_leeway_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("JWT_LEEWAY_SECONDS".to_string(), "601".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidLeeway(msg)) if msg.contains("must not exceed 600"))
        );
    }

    #[test]
    fn test_jwt_clock_skew_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtClockSkew(msg)) if msg.contains("must be positive"))
        );
    }

    #[test]
    fn test_jwt_clock_skew_rejects_negative() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "-100".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidJwtClockSkew(_))));
    }

    #[test]
    fn test_jwt_clock_skew_accepts_max() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "600".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.jwt_clock_skew_seconds, 600);
    }

    #[test]
    fn test_invalid_identity_header() {
        let mut vars = base_vars();
        vars.insert("IDENTITY_HEADER".to_string(), "not a header".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidIdentityHeader(_))));
    }

    #[test]
    fn test_blank_redis_url_disables_revocation() {
        let mut vars = base_vars();
        vars.insert("REDIS_URL".to_string(), "".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_debug_redacts_redis_url() {
        let mut vars = base_vars();
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:topsecret@cache:6379".to_string(),
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("topsecret"));
    }
}
