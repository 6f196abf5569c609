//! Service configuration with TOML file support.

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Configuration shared by the API and fanout processes.
///
/// Can be loaded from a TOML file via [`LivepollConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so an
/// empty file is a valid configuration running purely in-process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LivepollConfig {
    /// Port the vote-submission API listens on.
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Port the real-time fanout server listens on.
    #[serde(default = "default_fanout_port")]
    pub fanout_port: u16,

    /// Redis connection URL for the shared nonce and rate-limit counters.
    /// Absent means in-process maps, scoped to a single instance.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Base URL of the fanout server, for tally notifications. Absent means
    /// publishing is disabled; vote admission is unaffected.
    #[serde(default)]
    pub fanout_url: Option<String>,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_api_port() -> u16 {
    8080
}

fn default_fanout_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "human".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl LivepollConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ServerError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ServerError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ServerError> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("LivepollConfig is always serializable to TOML")
    }
}

impl Default for LivepollConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            fanout_port: default_fanout_port(),
            redis_url: None,
            fanout_url: None,
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = LivepollConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = LivepollConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.api_port, config.api_port);
        assert_eq!(parsed.fanout_port, config.fanout_port);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = LivepollConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.fanout_port, 8081);
        assert!(config.redis_url.is_none());
        assert!(config.fanout_url.is_none());
        assert_eq!(config.log_format, "human");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            api_port = 9999
            redis_url = "redis://localhost:6379"
        "#;
        let config = LivepollConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.api_port, 9999);
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.log_level, "info"); // default
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let result = LivepollConfig::from_toml_str("api_port = \"not a number\"");
        assert!(result.is_err());
    }
}
