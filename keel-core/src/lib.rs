//! Core abstractions for Keel coordination primitives.
//!
//! Keel coordinates independent processes through one shared atomic store.
//! This crate defines what the primitives need from that store and ships an
//! in-memory implementation.
//!
//! ## Features
//!
//! - **`AtomicStore`** - conditional writes with TTL and an atomic sliding-window step
//! - **`QueueStore`** - a work table with a skip-locked claim
//! - **`MemoryStore`** - in-process backend for tests and single-node use
//!
//! ## Example
//!
//! ```
//! use keel_core::{AtomicStore, MemoryStore};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//!
//! assert!(store.set_if_absent("job", "me", Duration::from_secs(30)).await.unwrap());
//! assert!(!store.set_if_absent("job", "you", Duration::from_secs(30)).await.unwrap());
//! assert!(store.compare_and_delete("job", "me").await.unwrap());
//! # });
//! ```

pub mod config;
pub mod error;
pub mod item;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{StoreError, StoreResult};
pub use item::{ItemId, ItemPayload, ItemStatus, QueueItem, Transition};
pub use store::{AtomicStore, MemoryStore, QueueStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::item::{ItemId, ItemPayload, ItemStatus, QueueItem, Transition};
    pub use crate::store::{AtomicStore, MemoryStore, QueueStore};
}
