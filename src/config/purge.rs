//! Purge configuration.
//!
//! # Example
//!
//! ```toml
//! [purge]
//! expiration = "default:720h,temp:24h,keep:8760h"
//! concurrency = 4
//! dry_run = false
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::purge::{PolicyError, RetentionPolicy};

/// Retention purge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeConfig {
    /// Retention windows per pad class as `class:duration` pairs.
    /// Pads are assigned to a class by their `-<class>` suffix; `default`
    /// is mandatory and applies to all other pads.
    /// Default: "default:720h,temp:24h,keep:8760h"
    #[serde(default = "default_expiration")]
    pub expiration: String,

    /// Number of workers per pad class.
    /// Default: 4
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// If true, log what would be deleted without deleting.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            expiration: default_expiration(),
            concurrency: default_concurrency(),
            dry_run: false,
        }
    }
}

fn default_expiration() -> String {
    "default:720h,temp:24h,keep:8760h".to_string()
}

fn default_concurrency() -> usize {
    4
}

impl PurgeConfig {
    /// Parse the configured expiration into a retention policy.
    pub fn policy(&self) -> Result<RetentionPolicy, PolicyError> {
        RetentionPolicy::parse(&self.expiration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "purge.concurrency must be at least 1".into(),
            ));
        }
        self.policy()
            .map_err(|e| ConfigError::Validation(format!("purge.expiration: {e}")))?;
        Ok(())
    }
}
