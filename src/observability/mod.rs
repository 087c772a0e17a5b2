//! Observability: structured logging and Prometheus metrics.
//!
//! Library code only emits `tracing` events and records metrics; the binary
//! decides where they go by calling [`init_tracing`] and
//! [`metrics::init_metrics`].

pub mod metrics;
mod tracing_init;

pub use tracing_init::*;
