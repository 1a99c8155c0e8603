//! Health check handlers.
//!
//! - `/health`: Liveness probe, returns OK if the process is running
//! - `/ready`: Readiness probe, reports the key cache

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Readiness probe body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// "fresh", "stale" or "unavailable".
    pub jwks: &'static str,

    /// Keys currently cached.
    pub key_count: usize,

    /// Seconds since the last successful fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_age_seconds: Option<u64>,
}

/// Liveness probe handler.
///
/// Does NOT check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Ready as long as a key set is cached, even a stale one: validation keeps
/// working from stale keys while the endpoint is down. Returns 503 only
/// before the first successful fetch.
#[tracing::instrument(skip_all, name = "fa.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.validator.key_cache().status().await;
    let jwks_age_seconds = status.age.map(|age| age.as_secs());

    if status.key_count == 0 {
        tracing::warn!(target: "fa.gate", "Readiness check failed: no JWKS loaded");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                jwks: "unavailable",
                key_count: 0,
                jwks_age_seconds,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            jwks: if status.fresh { "fresh" } else { "stale" },
            key_count: status.key_count,
            jwks_age_seconds,
        }),
    )
}
