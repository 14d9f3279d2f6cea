//! # Keel Rate Limiting
//!
//! A sliding-window admission limiter shared by every process that talks to
//! the same atomic store.
//!
//! ## Features
//!
//! - **Sliding Window Log**: exact per-key counts over a moving window
//! - **Store Agnostic**: any [`keel_core::AtomicStore`] (in-memory or Redis)
//! - **Fail Closed**: a store failure is an error, never an admission
//!
//! ## Quick Start
//!
//! ```rust
//! use keel_core::MemoryStore;
//! use keel_ratelimit::SlidingWindowLimiter;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let limiter = SlidingWindowLimiter::new(Arc::new(MemoryStore::new()));
//!
//! // Two calls per second for this key
//! let window = Duration::from_secs(1);
//! assert!(limiter.admit("outbound-api", 2, window).await.unwrap());
//! assert!(limiter.admit("outbound-api", 2, window).await.unwrap());
//! assert!(!limiter.admit("outbound-api", 2, window).await.unwrap());
//! # });
//! ```
//!
//! Rejected calls are recorded too, so a caller that keeps retrying against
//! a full window keeps it full until it backs off for a whole window.

pub mod config;
pub mod error;
pub mod limiter;

pub use config::{LimiterConfig, LimiterConfigBuilder};
pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{Decision, SlidingWindowLimiter};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::LimiterConfig;
    pub use crate::error::{RateLimitError, RateLimitResult};
    pub use crate::limiter::{Decision, SlidingWindowLimiter};
}
