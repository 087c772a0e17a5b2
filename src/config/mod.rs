//! Configuration for the toolkit.
//!
//! All settings have defaults, so a configuration file is optional. When one
//! is given it is TOML, with support for environment variable interpolation
//! using `${VAR_NAME}` syntax. Command-line flags override file values.
//!
//! # Example
//!
//! ```toml
//! [etherpad]
//! url = "https://pad.example.org"
//! api_key = "${ETHERPAD_APIKEY}"
//!
//! [purge]
//! expiration = "default:720h,temp:24h,keep:8760h"
//! concurrency = 4
//!
//! [observability.logging]
//! level = "info"
//! format = "json"
//! ```

mod etherpad;
mod observability;
mod purge;

use std::path::Path;

pub use etherpad::*;
pub use observability::*;
pub use purge::*;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolkitConfig {
    /// Etherpad API connection.
    #[serde(default)]
    pub etherpad: EtherpadConfig,

    /// Retention purge settings.
    #[serde(default)]
    pub purge: PurgeConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ToolkitConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Values are not validated here: command-line flags may still replace
    /// them, so callers validate once the final values are known.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        toml::from_str(&expanded).map_err(ConfigError::Parse)
    }

    /// Validate every section.
    ///
    /// Commands that only use part of the configuration validate just those
    /// sections instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.etherpad.validate()?;
        self.purge.validate()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR}` references, leaving anything after a `#` comment alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
