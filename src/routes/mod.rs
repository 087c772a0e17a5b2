//! HTTP surface of the `metrics` command.

mod metrics;

use std::sync::Arc;

use axum::{Router, routing::get};

pub use self::metrics::{MetricsState, pad_counts};
use crate::etherpad::PadService;

/// Build the router serving pad metrics at `path`.
pub fn build_app(service: Arc<dyn PadService>, suffixes: Vec<String>, path: &str) -> Router {
    let state = MetricsState {
        service,
        suffixes: Arc::new(suffixes),
    };

    Router::new()
        .route(path, get(metrics::metrics))
        .with_state(state)
}
