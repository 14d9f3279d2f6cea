//! # Keel Redis
//!
//! Redis backend for the Keel coordination primitives.
//!
//! ## Features
//!
//! - **Atomic scripts**: compare-and-delete, compare-and-expire, the sliding
//!   window step and every queue transition run as single Lua scripts
//! - **Store-side time**: scripts read `TIME` on the server, so client clock
//!   skew never decides an expiry or a window boundary
//! - **Explicit handle**: the store wraps one `ConnectionManager` that callers
//!   create at startup and pass to each primitive
//!
//! Requires Redis 5 or newer (scripts that read `TIME` before writing rely on
//! effect replication).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel_redis::{RedisConfig, RedisStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::from_env().key_prefix("billing").build();
//!     let store = Arc::new(RedisStore::with_config(config).await?);
//!
//!     // Hand the same store to every primitive that needs it.
//!     let _ = store;
//!     Ok(())
//! }
//! ```

mod config;
mod scripts;
mod store;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use store::RedisStore;

// Re-export redis crate for convenience
pub use redis;
