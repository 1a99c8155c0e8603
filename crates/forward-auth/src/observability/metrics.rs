//! Metrics definitions for the forward-auth gate.
//!
//! All metrics follow Prometheus naming conventions:
//! - `fa_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods seen by the gate
//! - `endpoint`: the four routes plus `/other`
//! - `outcome`: `success` or a `ValidationError` kind
//! - `status`: `success` or a `FetchError` kind

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    prometheus_builder()?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

fn prometheus_builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        // The gate sits in front of every request, keep it well under 50ms
        .set_buckets_for_metric(
            Matcher::Prefix("fa_http_request".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("fa_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `fa_http_requests_total`, `fa_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status_code` / `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("fa_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("fa_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code for the duration histogram.
///
/// 401 and 403 are the gate doing its job, so they get their own bucket
/// instead of counting as errors.
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        401 | 403 => "denied",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/verify" => "/verify",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => "/other",
    }
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record the outcome of one validation attempt.
///
/// Metric: `fa_token_validations_total`
/// Labels: `outcome` (`success` or the error kind)
pub fn record_token_validation(outcome: &'static str) {
    counter!("fa_token_validations_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a key set fetch attempt.
///
/// Metric: `fa_jwks_refresh_total`, `fa_jwks_refresh_duration_seconds`
/// Labels: `status` (`success` or the fetch error kind)
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    counter!("fa_jwks_refresh_total", "status" => status).increment(1);
    histogram!("fa_jwks_refresh_duration_seconds").record(duration.as_secs_f64());
}

/// Record a lookup answered from a stale key set after a failed refresh.
///
/// Metric: `fa_jwks_stale_fallback_total`
pub fn record_jwks_stale_fallback() {
    counter!("fa_jwks_stale_fallback_total").increment(1);
}
