//! PostgreSQL work-queue backend for Keel.
//!
//! Implements [`keel_core::QueueStore`] on a single table. Claiming the next
//! item is one transaction:
//!
//! ```sql
//! SELECT id FROM keel_queue_items
//! WHERE queue = $1 AND status = 'pending'
//! ORDER BY created_at, id
//! LIMIT 1
//! FOR UPDATE SKIP LOCKED;
//!
//! UPDATE keel_queue_items SET status = 'in_progress', updated_at = now() WHERE id = $1;
//! ```
//!
//! Rows locked by another claimant are skipped rather than waited on, so any
//! number of workers can poll the same queue concurrently.
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_postgres::{PgQueueStore, PostgresConfig};
//!
//! let store = PgQueueStore::connect(PostgresConfig::from_env()).await?;
//! store.migrate().await?;
//! ```

mod config;
mod store;

pub use config::PostgresConfig;
pub use store::PgQueueStore;

// Re-export sqlx for callers that share the pool
pub use sqlx;
