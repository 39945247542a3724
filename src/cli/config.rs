// Server Configuration Module
// Handles configuration from YAML files; CLI flags and environment
// variables are layered on top by the binary.

use crate::generator::{FakeGenerator, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::passthrough::{PassthroughConfig, PassthroughOverrides};
use crate::tracker::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub fake: FakeConfig,
    #[serde(default)]
    pub passthrough: PassthroughSection,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.capacity == 0 {
            return Err(ConfigError::Validation(
                "history.capacity must be at least 1".to_string(),
            ));
        }
        if self.fake.embedding_dimensions == 0 {
            return Err(ConfigError::Validation(
                "fake.embedding_dimensions must be at least 1".to_string(),
            ));
        }
        if self.passthrough.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "passthrough.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Fake generator built from the `fake` section
    pub fn generator(&self) -> FakeGenerator {
        FakeGenerator::new(
            Duration::from_millis(self.fake.latency_ms),
            self.fake.embedding_dimensions,
        )
    }

    pub fn stream_delay(&self) -> Duration {
        Duration::from_millis(self.fake.stream_delay_ms)
    }

    /// Passthrough config from the `passthrough` section
    pub fn passthrough_config(&self) -> PassthroughConfig {
        PassthroughConfig::from_overrides(self.passthrough.overrides())
    }
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8032
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Request history configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    /// Entries kept before the oldest is evicted
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Fake response configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FakeConfig {
    /// Delay before a unary fake response (ms)
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    /// Pause between streamed chunks (ms)
    #[serde(default = "default_stream_delay_ms")]
    pub stream_delay_ms: u64,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

fn default_latency_ms() -> u64 {
    100
}

fn default_stream_delay_ms() -> u64 {
    50
}

fn default_embedding_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            stream_delay_ms: default_stream_delay_ms(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

/// Upstream passthrough configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassthroughSection {
    /// Defaults to on exactly when an API key is present
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Forced upstream model
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl Default for PassthroughSection {
    fn default() -> Self {
        Self {
            enabled: None,
            api_key: None,
            base_url: None,
            model: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl PassthroughSection {
    pub fn overrides(&self) -> PassthroughOverrides {
        PassthroughOverrides {
            enabled: self.enabled,
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            timeout: Some(Duration::from_millis(self.timeout_ms)),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(String),
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8032);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.history.capacity, 100);
        assert_eq!(config.fake.latency_ms, 100);
        assert_eq!(config.fake.stream_delay_ms, 50);
        assert_eq!(config.fake.embedding_dimensions, 768);
        assert_eq!(config.passthrough.timeout_ms, 60_000);
        assert!(!config.passthrough_config().enabled);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  port: 9000
  host: "127.0.0.1"

history:
  capacity: 10

fake:
  latency_ms: 0
  embedding_dimensions: 16

passthrough:
  api_key: "sk-test"
  base_url: "http://localhost:1234/v1"
  timeout_ms: 5000
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.history.capacity, 10);
        assert_eq!(config.fake.latency_ms, 0);
        assert_eq!(config.fake.stream_delay_ms, 50);
        assert_eq!(config.generator().dimensions(), 16);

        let passthrough = config.passthrough_config();
        assert!(passthrough.enabled);
        assert_eq!(passthrough.base_url, "http://localhost:1234/v1");
        assert_eq!(passthrough.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_explicitly_disabled_passthrough() {
        let yaml = r#"
passthrough:
  enabled: false
  api_key: "sk-test"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let passthrough = config.passthrough_config();
        assert!(!passthrough.enabled);
        assert!(passthrough.has_api_key());
    }

    #[test]
    fn test_validation() {
        let err = Config::from_yaml("history:\n  capacity: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = Config::from_yaml("fake:\n  embedding_dimensions: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = Config::from_yaml("server: [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
