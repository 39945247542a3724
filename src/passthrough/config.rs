// Passthrough Configuration
// Immutable upstream settings; updates build a new value field by field.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_UPSTREAM_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_UPSTREAM_COMPLETION_MODEL: &str = "gpt-3.5-turbo-instruct";
pub const DEFAULT_UPSTREAM_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Upstream provider settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    /// Forces this model on every forwarded request
    pub model: Option<String>,
    pub timeout: Duration,
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Optional values layered over a `PassthroughConfig`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassthroughOverrides {
    pub enabled: Option<bool>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<Duration>,
}

impl PassthroughConfig {
    /// Build the config from optional settings.
    ///
    /// Passthrough is on by default exactly when an API key is present.
    pub fn from_overrides(overrides: PassthroughOverrides) -> Self {
        let mut config = Self::default().merge(PassthroughOverrides {
            enabled: None,
            ..overrides.clone()
        });
        config.enabled = overrides.enabled.unwrap_or(config.has_api_key()) && config.has_api_key();
        config
    }

    /// New config where every `Some` override replaces the current value
    pub fn merge(&self, overrides: PassthroughOverrides) -> Self {
        Self {
            enabled: overrides.enabled.unwrap_or(self.enabled),
            api_key: overrides
                .api_key
                .filter(|k| !k.is_empty())
                .or_else(|| self.api_key.clone()),
            base_url: overrides
                .base_url
                .unwrap_or_else(|| self.base_url.clone()),
            model: overrides.model.or_else(|| self.model.clone()),
            timeout: overrides.timeout.unwrap_or(self.timeout),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// `<base_url>/<endpoint>` without doubled slashes
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Model sent upstream: the forced model, else the requested one, else the default
    pub fn effective_model(&self, requested: Option<&str>, default: &str) -> String {
        self.model
            .as_deref()
            .or(requested)
            .unwrap_or(default)
            .to_string()
    }
}

/// Display-safe view of the config (the key is masked)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassthroughStatus {
    pub enabled: bool,
    pub has_api_key: bool,
    pub api_key_hint: Option<String>,
    pub base_url: String,
    pub model: Option<String>,
    pub timeout_ms: u64,
}

impl From<&PassthroughConfig> for PassthroughStatus {
    fn from(config: &PassthroughConfig) -> Self {
        Self {
            enabled: config.enabled,
            has_api_key: config.has_api_key(),
            api_key_hint: config.api_key.as_deref().map(mask_key),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            timeout_ms: config.timeout.as_millis() as u64,
        }
    }
}

/// Keep the last four characters of a key
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PassthroughConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_enabled_iff_key_present() {
        let with_key = PassthroughConfig::from_overrides(PassthroughOverrides {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        });
        assert!(with_key.enabled);

        let without_key = PassthroughConfig::from_overrides(PassthroughOverrides::default());
        assert!(!without_key.enabled);

        // explicit enable without a key still stays off
        let forced = PassthroughConfig::from_overrides(PassthroughOverrides {
            enabled: Some(true),
            ..Default::default()
        });
        assert!(!forced.enabled);

        let disabled = PassthroughConfig::from_overrides(PassthroughOverrides {
            enabled: Some(false),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        });
        assert!(!disabled.enabled);
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let base = PassthroughConfig {
            model: Some("gpt-4o".to_string()),
            ..Default::default()
        };
        let merged = base.merge(PassthroughOverrides {
            base_url: Some("http://localhost:9000/v1".to_string()),
            ..Default::default()
        });
        assert_eq!(merged.base_url, "http://localhost:9000/v1");
        assert_eq!(merged.model.as_deref(), Some("gpt-4o"));
        assert_eq!(base.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_effective_model() {
        let config = PassthroughConfig::default();
        assert_eq!(config.effective_model(Some("gpt-4"), "d"), "gpt-4");
        assert_eq!(config.effective_model(None, "d"), "d");

        let forced = config.merge(PassthroughOverrides {
            model: Some("forced".to_string()),
            ..Default::default()
        });
        assert_eq!(forced.effective_model(Some("gpt-4"), "d"), "forced");
    }

    #[test]
    fn test_endpoint_url() {
        let config = PassthroughConfig {
            base_url: "http://127.0.0.1:1234/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint_url("/chat/completions"),
            "http://127.0.0.1:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdef1234"), "****1234");
        assert_eq!(mask_key("abc"), "****");
    }
}
