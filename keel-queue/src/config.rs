//! Queue and worker configuration.

use crate::error::{QueueError, QueueResult};
use keel_core::config::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name; items in different queues never see each other
    pub queue_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "default".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create a configuration for a named queue.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
        }
    }

    /// Load configuration from `KEEL_QUEUE_NAME`.
    pub fn from_env() -> Self {
        std::env::var("KEEL_QUEUE_NAME")
            .map(Self::new)
            .unwrap_or_default()
    }

    /// Check the configuration.
    pub fn validate(&self) -> QueueResult<()> {
        if self.queue_name.trim().is_empty() {
            return Err(QueueError::Config("queue name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long to sleep when the queue is empty or the store fails
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Handler time budget; an item that runs over is marked failed
    #[serde(with = "duration_ms")]
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue() {
        let config = QueueConfig::default();
        assert_eq!(config.queue_name, "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            QueueConfig::new("  ").validate(),
            Err(QueueError::Config(_))
        ));
    }

    #[test]
    fn test_worker_config_serde() {
        let config: WorkerConfig =
            serde_json::from_str(r#"{"poll_interval":250,"job_timeout":60000}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.job_timeout, Duration::from_secs(60));
    }
}
