//! Work queue claims for Keel.
//!
//! A table of work items shared by many consumers. Each pending item is
//! claimed by exactly one consumer, oldest first, and finished with an
//! idempotent terminal transition.
//!
//! ## Features
//!
//! - **Skip-locked claims** - concurrent consumers never wait on or share an item
//! - **Idempotent completion** - finishing twice reports the earlier outcome
//! - **Workers** - handler registry with polling, timeouts and graceful shutdown
//!
//! ## Quick Start
//!
//! ```
//! use keel_core::MemoryStore;
//! use keel_queue::{Completion, WorkQueue};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let queue = WorkQueue::new(Arc::new(MemoryStore::new()), "emails");
//!
//! queue.enqueue("send_welcome", json!({"to": "user@example.com"})).await.unwrap();
//!
//! let item = queue.claim_next().await.unwrap().unwrap();
//! assert_eq!(queue.mark_done(item.id).await.unwrap(), Completion::Applied);
//! # });
//! ```
//!
//! Items whose consumer dies after claiming stay `in_progress`; nothing here
//! returns them to `pending`.

pub mod config;
pub mod error;
pub mod queue;
pub mod worker;

pub use config::{QueueConfig, WorkerConfig};
pub use error::{QueueError, QueueResult};
pub use queue::{Completion, WorkQueue};
pub use worker::{ItemHandler, Worker};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{QueueConfig, WorkerConfig};
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::queue::{Completion, WorkQueue};
    pub use crate::worker::Worker;
}
