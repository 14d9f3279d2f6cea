//! Limiter configuration and builder

use crate::error::{RateLimitError, RateLimitResult};
use keel_core::config::{duration_ms, env_duration_ms, env_parse};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the sliding-window limiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Namespace for window keys in the store
    pub key_prefix: String,
    /// Calls admitted per window
    pub limit: u64,
    /// Window length
    #[serde(with = "duration_ms")]
    pub window: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ratelimit".to_string(),
            limit: 5,
            window: Duration::from_secs(3),
        }
    }
}

impl LimiterConfig {
    /// Create a new configuration builder
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder::new()
    }

    /// Load configuration from `KEEL_RATELIMIT_*` environment variables.
    pub fn from_env() -> LimiterConfigBuilder {
        let mut builder = LimiterConfigBuilder::new();

        if let Ok(prefix) = std::env::var("KEEL_RATELIMIT_PREFIX") {
            builder = builder.key_prefix(prefix);
        }
        if let Some(limit) = env_parse("KEEL_RATELIMIT_LIMIT") {
            builder = builder.limit(limit);
        }
        if let Some(window) = env_duration_ms("KEEL_RATELIMIT_WINDOW_MS") {
            builder = builder.window(window);
        }

        builder
    }

    /// Check the configuration
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.window < Duration::from_millis(1) {
            return Err(RateLimitError::config("window must be at least 1ms"));
        }
        if self.key_prefix.is_empty() {
            return Err(RateLimitError::config("key prefix must not be empty"));
        }
        Ok(())
    }
}

/// Builder for [`LimiterConfig`]
#[derive(Debug, Default)]
pub struct LimiterConfigBuilder {
    config: LimiterConfig,
}

impl LimiterConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: LimiterConfig::default(),
        }
    }

    /// Set the key prefix
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Set the calls admitted per window
    pub fn limit(mut self, limit: u64) -> Self {
        self.config.limit = limit;
        self
    }

    /// Set the window length
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> RateLimitResult<LimiterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
