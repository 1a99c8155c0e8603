//! Observability for the forward-auth gate.
//!
//! Provides metrics definitions and the Prometheus recorder.

pub mod metrics;
