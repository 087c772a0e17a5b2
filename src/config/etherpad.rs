//! Etherpad API connection settings.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Etherpad connection configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EtherpadConfig {
    /// Base URL of the Etherpad instance.
    /// Default: "http://localhost:9001"
    #[serde(default = "default_url")]
    pub url: String,

    /// API key (the contents of Etherpad's `APIKEY.txt`).
    #[serde(default)]
    pub api_key: String,

    /// HTTP API version to call.
    /// Default: "1.2.14"
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-request timeout in seconds.
    /// Default: 30
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EtherpadConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: String::new(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// The API key is a credential and stays out of debug output.
impl std::fmt::Debug for EtherpadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtherpadConfig")
            .field("url", &self.url)
            .field("api_key", &"****")
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_url() -> String {
    "http://localhost:9001".to_string()
}

fn default_api_version() -> String {
    crate::etherpad::API_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl EtherpadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Validation("etherpad.url must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "etherpad.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EtherpadConfig::default();
        assert_eq!(config.url, "http://localhost:9001");
        assert_eq!(config.api_version, "1.2.14");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = EtherpadConfig {
            api_key: "super-secret".into(),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let config = EtherpadConfig {
            url: " ".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
