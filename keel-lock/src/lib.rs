//! Exclusive lease locks for Keel.
//!
//! At most one live holder per lock name, across every process that shares
//! the store. A holder that crashes loses the lease when its TTL runs out.
//!
//! ## Example
//!
//! ```
//! use keel_core::MemoryStore;
//! use keel_lock::LeaseLock;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let lock = LeaseLock::new(Arc::new(MemoryStore::new()));
//!
//! let token = lock.acquire("invoice-export", Duration::from_secs(30)).await.unwrap();
//! let token = token.expect("lock is free");
//! assert!(lock.acquire("invoice-export", Duration::from_secs(30)).await.unwrap().is_none());
//! assert!(lock.release("invoice-export", &token).await.unwrap());
//! # });
//! ```
//!
//! Lease safety relies on TTLs, so a holder paused longer than its TTL can
//! overlap with the next holder. Keep guarded work well inside the lease or
//! renew it with [`LeaseLock::extend`].

pub mod config;
pub mod error;
pub mod lock;

pub use config::{LockConfig, LockConfigBuilder};
pub use error::{LockError, LockResult};
pub use lock::{LeaseLock, LeaseToken};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::LockConfig;
    pub use crate::error::{LockError, LockResult};
    pub use crate::lock::{LeaseLock, LeaseToken};
}
