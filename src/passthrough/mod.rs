//! Upstream passthrough: runtime switch, config and HTTP client.
//!
//! [`Passthrough`] owns the current [`PassthroughConfig`] and hands out a
//! [`PassthroughClient`] bound to a snapshot of it whenever forwarding is on.

pub mod client;
pub mod config;
pub mod tool_calls;

pub use client::{PassthroughClient, PassthroughError, StreamSummary, UpstreamReply};
pub use config::{PassthroughConfig, PassthroughOverrides, PassthroughStatus};
pub use tool_calls::ToolCallAccumulator;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Runtime passthrough switch shared by handlers and the dashboard
#[derive(Debug)]
pub struct Passthrough {
    http: reqwest::Client,
    config: RwLock<PassthroughConfig>,
}

impl Passthrough {
    pub fn new(config: PassthroughConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: RwLock::new(config),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, PassthroughConfig> {
        self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PassthroughConfig> {
        self.config.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_enabled(&self) -> bool {
        let config = self.read();
        config.enabled && config.has_api_key()
    }

    pub fn has_api_key(&self) -> bool {
        self.read().has_api_key()
    }

    /// Turn forwarding on; refused without an API key
    pub fn enable(&self) -> bool {
        let mut config = self.write();
        if config.has_api_key() {
            *config = config.merge(PassthroughOverrides {
                enabled: Some(true),
                ..Default::default()
            });
        }
        config.enabled
    }

    pub fn disable(&self) {
        let mut config = self.write();
        *config = config.merge(PassthroughOverrides {
            enabled: Some(false),
            ..Default::default()
        });
    }

    /// Flip forwarding and return the new state. Never turns on without a key.
    pub fn toggle(&self) -> bool {
        let mut config = self.write();
        let enabled = !config.enabled && config.has_api_key();
        *config = config.merge(PassthroughOverrides {
            enabled: Some(enabled),
            ..Default::default()
        });
        enabled
    }

    /// Install a new API key (an empty key clears it and disables forwarding)
    pub fn set_api_key(&self, key: impl Into<String>) {
        let key = key.into();
        let mut config = self.write();
        if key.is_empty() {
            *config = PassthroughConfig {
                enabled: false,
                api_key: None,
                ..config.clone()
            };
        } else {
            *config = config.merge(PassthroughOverrides {
                api_key: Some(key),
                ..Default::default()
            });
        }
    }

    /// Snapshot of the current config
    pub fn config(&self) -> PassthroughConfig {
        self.read().clone()
    }

    pub fn status(&self) -> PassthroughStatus {
        PassthroughStatus::from(&*self.read())
    }

    /// A client for the current config, or `None` while forwarding is off
    pub fn client(&self) -> Option<PassthroughClient> {
        let config = self.read();
        if !(config.enabled && config.has_api_key()) {
            return None;
        }
        Some(PassthroughClient::new(self.http.clone(), config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed() -> Passthrough {
        Passthrough::new(PassthroughConfig::from_overrides(PassthroughOverrides {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        }))
    }

    #[test]
    fn test_enabled_by_default_with_key() {
        assert!(keyed().is_enabled());
        assert!(keyed().client().is_some());
        let bare = Passthrough::new(PassthroughConfig::default());
        assert!(!bare.is_enabled());
        assert!(bare.client().is_none());
    }

    #[test]
    fn test_toggle() {
        let passthrough = keyed();
        assert!(!passthrough.toggle());
        assert!(!passthrough.is_enabled());
        assert!(passthrough.toggle());
        assert!(passthrough.is_enabled());
    }

    #[test]
    fn test_toggle_without_key_stays_off() {
        let passthrough = Passthrough::new(PassthroughConfig::default());
        assert!(!passthrough.toggle());
        assert!(!passthrough.toggle());
        assert!(!passthrough.enable());
    }

    #[test]
    fn test_set_api_key_then_enable() {
        let passthrough = Passthrough::new(PassthroughConfig::default());
        passthrough.set_api_key("sk-new");
        assert!(passthrough.has_api_key());
        assert!(!passthrough.is_enabled());
        assert!(passthrough.enable());
        assert_eq!(passthrough.config().api_key.as_deref(), Some("sk-new"));

        passthrough.set_api_key("");
        assert!(!passthrough.has_api_key());
        assert!(!passthrough.is_enabled());
    }

    #[test]
    fn test_config_snapshot_is_independent() {
        let passthrough = keyed();
        let before = passthrough.config();
        passthrough.disable();
        assert!(before.enabled);
        assert!(!passthrough.config().enabled);
        assert_eq!(passthrough.status().api_key_hint.as_deref(), Some("****test"));
    }
}
