//! Sliding window admission limiter
//!
//! ## How It Works
//!
//! Each key owns a sorted set of event timestamps in the shared store. One
//! atomic store step per call:
//!
//! 1. Removes events at or before `now - window`
//! 2. Records this call at `now` (member made unique with a random suffix)
//! 3. Counts the events left in the window
//! 4. Expires the whole key after `window + 1s` of inactivity
//!
//! The call is admitted if the count is at most `limit`. A rejected call is
//! still recorded: this is a counting limiter, so a client that keeps hammering
//! a full window keeps it full.

use crate::config::LimiterConfig;
use crate::error::{RateLimitError, RateLimitResult};
use keel_core::AtomicStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use uuid::Uuid;

/// Extra lifetime of an idle window key beyond the window itself.
const IDLE_GRACE: Duration = Duration::from_secs(1);

/// Store timestamps are whole milliseconds.
const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Result of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the call was admitted
    pub allowed: bool,
    /// Events in the window, including this one
    pub count: u64,
    /// Configured limit
    pub limit: u64,
}

impl Decision {
    /// Calls still admissible in the current window
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// Distributed sliding-window limiter
pub struct SlidingWindowLimiter {
    store: Arc<dyn AtomicStore>,
    config: LimiterConfig,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the default configuration
    pub fn new(store: Arc<dyn AtomicStore>) -> Self {
        Self {
            store,
            config: LimiterConfig::default(),
        }
    }

    /// Create a limiter with a custom configuration
    pub fn with_config(
        store: Arc<dyn AtomicStore>,
        config: LimiterConfig,
    ) -> RateLimitResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    async fn record(&self, key: &str, limit: u64, window: Duration) -> RateLimitResult<Decision> {
        if window < MIN_WINDOW {
            return Err(RateLimitError::config("window must be at least 1ms"));
        }

        let suffix = Uuid::new_v4().simple().to_string();
        let count = self
            .store
            .record_in_window(
                &self.key(key),
                &suffix,
                window,
                window.saturating_add(IDLE_GRACE),
            )
            .await?;

        let decision = Decision {
            allowed: count <= limit,
            count,
            limit,
        };

        if decision.allowed {
            trace!(key = %key, count = count, limit = limit, "Sliding window: allowed");
        } else {
            trace!(key = %key, count = count, limit = limit, "Sliding window: denied");
        }

        Ok(decision)
    }

    /// Record one call against `key` and report whether it fits in the window.
    ///
    /// Store failures are returned as errors, never as an admission.
    pub async fn admit(&self, key: &str, limit: u64, window: Duration) -> RateLimitResult<bool> {
        Ok(self.record(key, limit, window).await?.allowed)
    }

    /// [`admit`](Self::admit) with the configured limit and window.
    pub async fn check(&self, key: &str) -> RateLimitResult<Decision> {
        self.record(key, self.config.limit, self.config.window).await
    }

    /// Like [`check`](Self::check), but a full window is an error.
    pub async fn try_admit(&self, key: &str) -> RateLimitResult<()> {
        let decision = self.check(key).await?;
        if decision.allowed {
            Ok(())
        } else {
            Err(RateLimitError::LimitExceeded {
                key: key.to_string(),
                limit: self.config.limit,
                window: self.config.window,
            })
        }
    }

    /// Events currently in the configured window, without recording one.
    ///
    /// Keys fed through [`admit`](Self::admit) with their own window should be
    /// read with [`current_in`](Self::current_in) instead.
    pub async fn current(&self, key: &str) -> RateLimitResult<u64> {
        self.current_in(key, self.config.window).await
    }

    /// Events recorded for `key` within the last `window`, without recording one.
    pub async fn current_in(&self, key: &str, window: Duration) -> RateLimitResult<u64> {
        if window < MIN_WINDOW {
            return Err(RateLimitError::config("window must be at least 1ms"));
        }
        Ok(self.store.count_in_window(&self.key(key), window).await?)
    }

    /// Forget every event recorded for `key`.
    pub async fn reset(&self, key: &str) -> RateLimitResult<()> {
        self.store.delete(&self.key(key)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("backend", &self.store.backend())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::MemoryStore;
    use keel_core::testing::FailingStore;

    fn limiter() -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_basic_limit() {
        let limiter = limiter();

        for i in (0..5).rev() {
            let decision = limiter.check("test").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining(), i);
        }

        let decision = limiter.check("test").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_calls_still_count() {
        let limiter = limiter();
        let window = Duration::from_secs(10);

        assert!(limiter.admit("k", 1, window).await.unwrap());
        assert!(!limiter.admit("k", 1, window).await.unwrap());
        assert!(!limiter.admit("k", 1, window).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!limiter.admit("k", 1, window).await.unwrap());
        assert_eq!(limiter.current("k").await.unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        assert!(limiter.admit("key1", 1, window).await.unwrap());
        assert!(!limiter.admit("key1", 1, window).await.unwrap());
        assert!(limiter.admit("key2", 1, window).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_rejects_everything() {
        let limiter = limiter();
        assert!(!limiter.admit("k", 0, Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_window_is_config_error() {
        let limiter = limiter();
        let result = limiter.admit("k", 5, Duration::ZERO).await;
        assert!(matches!(result, Err(RateLimitError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_millisecond_window_is_config_error() {
        let limiter = limiter();
        let result = limiter.admit("k", 5, Duration::from_micros(500)).await;
        assert!(matches!(result, Err(RateLimitError::Config(_))));

        let result = limiter.current_in("k", Duration::from_nanos(1)).await;
        assert!(matches!(result, Err(RateLimitError::Config(_))));
        assert_eq!(limiter.current("k").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_window_does_not_panic() {
        let limiter = limiter();

        assert!(limiter.admit("k", 5, Duration::MAX).await.unwrap());
        assert!(limiter.admit("k", 1, Duration::MAX).await.is_ok());
        assert_eq!(limiter.current_in("k", Duration::MAX).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_in_uses_given_window() {
        let limiter = limiter();
        let window = Duration::from_secs(10);

        limiter.admit("k", 5, window).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.admit("k", 5, window).await.unwrap();

        // default window is 3s
        assert_eq!(limiter.current("k").await.unwrap(), 1);
        assert_eq!(limiter.current_in("k", window).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error_not_a_decision() {
        let store = Arc::new(FailingStore::new());
        let limiter = SlidingWindowLimiter::new(store.clone());

        match limiter.admit("k", 5, Duration::from_secs(1)).await {
            Err(RateLimitError::Store(e)) => assert!(e.is_unavailable()),
            other => panic!("expected store error, got {:?}", other),
        }
        match limiter.check("k").await {
            Err(RateLimitError::Store(e)) => assert!(e.is_unavailable()),
            other => panic!("expected store error, got {:?}", other),
        }
        let err = limiter.try_admit("k").await.unwrap_err();
        assert!(!err.is_limit_exceeded());
        assert!(matches!(limiter.current("k").await, Err(RateLimitError::Store(_))));
        assert_eq!(store.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_admit_reports_limit() {
        let config = LimiterConfig::builder()
            .limit(1)
            .window(Duration::from_secs(1))
            .build()
            .unwrap();
        let limiter =
            SlidingWindowLimiter::with_config(Arc::new(MemoryStore::new()), config).unwrap();

        limiter.try_admit("user").await.unwrap();
        let err = limiter.try_admit("user").await.unwrap_err();
        assert!(err.is_limit_exceeded());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let limiter = limiter();
        for _ in 0..6 {
            limiter.check("test").await.unwrap();
        }
        assert!(!limiter.check("test").await.unwrap().allowed);

        limiter.reset("test").await.unwrap();
        assert_eq!(limiter.current("test").await.unwrap(), 0);
        assert!(limiter.check("test").await.unwrap().allowed);
    }

    #[test]
    fn test_with_config_validates() {
        let config = LimiterConfig {
            window: Duration::ZERO,
            ..LimiterConfig::default()
        };
        let result = SlidingWindowLimiter::with_config(Arc::new(MemoryStore::new()), config);
        assert!(result.is_err());
    }
}
