use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Observability configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include file/line information.
    #[serde(default)]
    pub file_line: bool,

    /// Filter directives (e.g., "etherpad_toolkit=debug,reqwest=warn").
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            timestamps: true,
            file_line: false,
            filter: None,
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable multi-line format.
    Pretty,
    /// Compact single-line format.
    #[default]
    #[serde(alias = "text")]
    Compact,
    /// JSON format (for log aggregation).
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable metrics gathering.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address the `metrics` command listens on.
    /// Default: "0.0.0.0:9012"
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path for the metrics endpoint.
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Suffixes to group pads by in the pad count gauge.
    /// Default: ["keep", "temp"]
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,

    /// Histogram buckets for purge run durations (in seconds).
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets_secs: Vec<f64>,

    /// File the `purge` command writes its metrics to when it finishes, in
    /// Prometheus text format (for node_exporter's textfile collector).
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_listen_addr(),
            path: default_metrics_path(),
            suffixes: default_suffixes(),
            duration_buckets_secs: default_duration_buckets(),
            textfile: None,
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:9012".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_suffixes() -> Vec<String> {
    vec!["keep".to_string(), "temp".to_string()]
}

fn default_duration_buckets() -> Vec<f64> {
    vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]
}

fn default_true() -> bool {
    true
}
