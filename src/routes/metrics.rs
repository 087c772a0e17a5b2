use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    etherpad::PadService,
    observability::metrics::{get_prometheus_handle, record_pad_count},
    purge::{DEFAULT_CLASS, group_by_suffixes},
};

/// State shared by the metrics handler.
#[derive(Clone)]
pub struct MetricsState {
    pub service: Arc<dyn PadService>,
    pub suffixes: Arc<Vec<String>>,
}

/// Count pads per suffix.
///
/// Every configured suffix and `default` get an entry, zero when no pad
/// carries it. A pad matching several suffixes is counted under each.
pub fn pad_counts(pads: &[String], suffixes: &[String]) -> BTreeMap<String, u64> {
    let groups = group_by_suffixes(pads, suffixes);

    suffixes
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .chain(std::iter::once(DEFAULT_CLASS))
        .map(|suffix| {
            let count = groups.get(suffix).map_or(0, |pads| pads.len() as u64);
            (suffix.to_string(), count)
        })
        .collect()
}

/// Refresh the pad count gauge from a fresh listing.
///
/// On listing failure the gauge keeps its previous values.
async fn refresh_pad_counts(state: &MetricsState) {
    match state.service.list_all_pads().await {
        Ok(pads) => {
            for (suffix, count) in pad_counts(&pads, &state.suffixes) {
                record_pad_count(&suffix, count);
            }
            tracing::debug!(pads = pads.len(), "Refreshed pad counts");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list pads for metrics");
        }
    }
}

/// Prometheus metrics endpoint.
///
/// Returns metrics in Prometheus text format.
#[tracing::instrument(name = "metrics.scrape", skip(state))]
pub async fn metrics(State(state): State<MetricsState>) -> Response {
    refresh_pad_counts(&state).await;

    match get_prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain")],
            "Metrics not initialized".to_string(),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pads(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn suffixes(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_counts_per_suffix() {
        let counts = pad_counts(
            &pads(&["a-keep", "b-keep", "c-temp", "d"]),
            &suffixes(&["keep", "temp"]),
        );
        assert_eq!(counts["keep"], 2);
        assert_eq!(counts["temp"], 1);
        assert_eq!(counts["default"], 1);
    }

    #[test]
    fn test_zero_for_suffix_without_pads() {
        let counts = pad_counts(&pads(&["notes-keep"]), &suffixes(&["keep", "temp"]));
        assert_eq!(counts["temp"], 0);
        assert_eq!(counts["default"], 0);
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn test_repeated_suffix_not_double_counted() {
        let counts = pad_counts(
            &pads(&["a-keep", "b-keep", "c"]),
            &suffixes(&["keep", "keep"]),
        );
        assert_eq!(counts["keep"], 2);
        assert_eq!(counts["default"], 1);
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_no_pads() {
        let counts = pad_counts(&[], &suffixes(&[]));
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["default"], 0);
    }
}
