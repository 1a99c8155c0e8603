//! Test server harness for E2E testing
//!
//! Provides `TestGateServer` for spawning real gate instances in tests.

use crate::token_builders::{DEFAULT_AUDIENCE, DEFAULT_ISSUER};
use forward_auth::auth::{KeyCache, TokenValidator};
use forward_auth::config::Config;
use forward_auth::observability::metrics::init_metrics_recorder;
use forward_auth::revocation::RevocationStore;
use forward_auth::routes::{self, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global recorder once per test binary.
///
/// Falls back to a detached recorder if another one is already installed.
pub fn test_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Environment for a gate that trusts [`DEFAULT_ISSUER`] and [`DEFAULT_AUDIENCE`].
pub fn test_config_vars(jwks_url: &str) -> HashMap<String, String> {
    HashMap::from([
        ("JWKS_URL".to_string(), jwks_url.to_string()),
        ("ALLOWED_ISSUERS".to_string(), DEFAULT_ISSUER.to_string()),
        ("ALLOWED_AUDIENCES".to_string(), DEFAULT_AUDIENCE.to_string()),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "2".to_string()),
    ])
}

/// Test harness for spawning the gate in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let server = TestGateServer::spawn(&jwks_url(&mock)).await?;
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestGateServer {
    addr: SocketAddr,
    config: Config,
    validator: Arc<TokenValidator>,
    _handle: JoinHandle<()>,
}

impl TestGateServer {
    /// Spawn a gate with the default test configuration.
    pub async fn spawn(jwks_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with(jwks_url, &[], None).await
    }

    /// Spawn a gate with extra environment overrides and an optional
    /// revocation store.
    ///
    /// The key cache is warmed before the server starts, as in production.
    pub async fn spawn_with(
        jwks_url: &str,
        overrides: &[(&str, &str)],
        revocation_store: Option<Arc<dyn RevocationStore>>,
    ) -> Result<Self, anyhow::Error> {
        // Install before the first fetch so startup metrics are captured
        let metrics_handle = test_metrics_handle();

        let mut vars = test_config_vars(jwks_url);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;
        let validation = Arc::new(config.validation_config());

        let key_cache = KeyCache::connect(&validation)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to warm key cache: {}", e))?;

        let mut validator = TokenValidator::new(Arc::new(key_cache), validation);
        if let Some(store) = revocation_store {
            validator = validator.with_revocation_store(store);
        }
        let validator = Arc::new(validator);

        let state = Arc::new(AppState {
            config: config.clone(),
            validator: Arc::clone(&validator),
        });

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            validator,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The validator the server uses, for direct inspection of the key cache.
    pub fn validator(&self) -> &Arc<TokenValidator> {
        &self.validator
    }
}

impl Drop for TestGateServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
