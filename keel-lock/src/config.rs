//! Lock configuration

use keel_core::config::{duration_ms, env_duration_ms};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lease lock configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Namespace for lock keys in the store
    pub key_prefix: String,
    /// TTL used by `acquire_default`
    #[serde(with = "duration_ms")]
    pub default_ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key_prefix: "lock".to_string(),
            default_ttl: Duration::from_secs(30),
        }
    }
}

impl LockConfig {
    /// Create a new configuration builder
    pub fn builder() -> LockConfigBuilder {
        LockConfigBuilder::default()
    }

    /// Load configuration from `KEEL_LOCK_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(prefix) = std::env::var("KEEL_LOCK_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(ttl) = env_duration_ms("KEEL_LOCK_TTL_MS") {
            config.default_ttl = ttl;
        }

        config
    }
}

/// Builder for [`LockConfig`]
#[derive(Debug, Default)]
pub struct LockConfigBuilder {
    config: LockConfig,
}

impl LockConfigBuilder {
    /// Set the key prefix
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Set the default lease TTL
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    /// Build the configuration
    pub fn build(self) -> LockConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = LockConfig::builder()
            .key_prefix("jobs")
            .default_ttl(Duration::from_secs(60))
            .build();

        assert_eq!(config.key_prefix, "jobs");
        assert_eq!(config.default_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_serde_ttl_in_millis() {
        let json = serde_json::to_string(&LockConfig::default()).unwrap();
        assert!(json.contains("\"default_ttl\":30000"));

        let config: LockConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, LockConfig::default());
    }
}
