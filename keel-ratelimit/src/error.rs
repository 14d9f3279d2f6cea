//! Error types for rate limiting

use keel_core::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The window for this key is full
    #[error("Rate limit exceeded for '{key}': more than {limit} calls in {window:?}")]
    LimitExceeded {
        /// Limiter key
        key: String,
        /// Allowed calls per window
        limit: u64,
        /// Window length
        window: Duration,
    },

    /// Configuration error
    #[error("Rate limit configuration error: {0}")]
    Config(String),

    /// The store could not answer; the call was neither admitted nor rejected
    #[error("Rate limit store error: {0}")]
    Store(#[from] StoreError),
}

impl RateLimitError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is a rate limit exceeded error
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Window length to wait out before the key is guaranteed to be clear.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::LimitExceeded { window, .. } => Some(*window),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_exceeded_error() {
        let error = RateLimitError::LimitExceeded {
            key: "api".to_string(),
            limit: 5,
            window: Duration::from_secs(3),
        };

        assert!(error.is_limit_exceeded());
        assert_eq!(error.retry_after(), Some(Duration::from_secs(3)));
        assert!(error.to_string().contains("'api'"));
    }

    #[test]
    fn test_store_error_is_not_a_rejection() {
        let error: RateLimitError = StoreError::unavailable("connection refused").into();
        assert!(!error.is_limit_exceeded());
        assert_eq!(error.retry_after(), None);
    }
}
