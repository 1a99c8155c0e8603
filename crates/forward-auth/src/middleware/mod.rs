//! HTTP middleware for the forward-auth gate.

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
