//! Prometheus metrics for the toolkit.
//!
//! Provides metrics for:
//! - Purge outcomes per pad class
//! - Purge run durations
//! - Pad counts per suffix (served by the `metrics` command)
//!
//! The `metrics` command serves the handle over HTTP. A `purge` run is a
//! one-shot process, so it dumps the rendered metrics to a textfile instead.

use std::path::Path;
#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Gauge holding the number of pads per suffix.
pub const PAD_COUNT_GAUGE: &str = "etherpad_toolkit_pads";

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &config.duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Write the rendered metrics to `path`.
///
/// The file is written next to its destination and renamed into place, so a
/// collector never reads a partial file.
#[cfg(feature = "prometheus")]
pub fn write_textfile(path: &Path) -> Result<(), MetricsError> {
    let handle = get_prometheus_handle()
        .ok_or_else(|| MetricsError::Setup("Metrics not initialized".to_string()))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, handle.render())
        .and_then(|()| std::fs::rename(&tmp, path))
        .map_err(|e| MetricsError::Write(e, path.to_path_buf()))
}

/// Write the rendered metrics (unavailable without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn write_textfile(_path: &Path) -> Result<(), MetricsError> {
    Err(MetricsError::Setup("Prometheus metrics not enabled".to_string()))
}

/// Record the outcome of processing one pad during a purge.
pub fn record_purge_outcome(class: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "etherpad_purge_pads_total",
            "class" => class.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (class, outcome);
    }
}

/// Record a completed purge run.
pub fn record_purge_run(dry_run: bool, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        let mode = if dry_run { "dry_run" } else { "delete" };
        counter!("etherpad_purge_runs_total", "mode" => mode).increment(1);
        histogram!("etherpad_purge_run_duration_seconds", "mode" => mode).record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (dry_run, duration_secs);
    }
}

/// Set the number of pads carrying a suffix.
pub fn record_pad_count(suffix: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        gauge!(PAD_COUNT_GAUGE, "suffix" => suffix.to_string()).set(count as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (suffix, count);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[error("Failed to write metrics to {1}: {0}")]
    Write(std::io::Error, std::path::PathBuf),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

/// Install the process-wide recorder once for all tests that render metrics.
#[cfg(all(test, feature = "prometheus"))]
pub(crate) fn init_test_metrics() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        init_metrics(&MetricsConfig::default()).expect("test recorder installs");
    });
}
