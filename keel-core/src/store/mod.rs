//! Atomic store abstractions
//!
//! The coordination primitives never talk to a backend directly. They are
//! written against two traits:
//!
//! - [`AtomicStore`]: single-key conditional writes with TTL, plus an atomic
//!   sliding-window step over a sorted set
//! - [`QueueStore`]: a work table with a skip-locked claim
//!
//! Every method is one indivisible operation from the point of view of a
//! single key. Backends that cannot guarantee that cannot implement these
//! traits correctly. All time comparisons are made against the store's clock.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreResult;
use crate::item::{ItemId, ItemPayload, ItemStatus, QueueItem, Transition};
use async_trait::async_trait;
use std::time::Duration;

/// Key-value and sorted-set operations used by the lock and the limiter.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// `SET key value NX` with an expiry. Returns `true` if the key was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// `GET key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Delete `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Reset the expiry of `key` only if it currently holds `expected`.
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration)
    -> StoreResult<bool>;

    /// Record one event in the sliding window stored at `key`.
    ///
    /// Atomically removes members scored at or before `now - window`, adds a
    /// member scored at `now` whose value ends with `member_suffix`, reads the
    /// cardinality and sets the key to expire after `expire_after`. Returns the
    /// cardinality including the new member.
    async fn record_in_window(
        &self,
        key: &str,
        member_suffix: &str,
        window: Duration,
        expire_after: Duration,
    ) -> StoreResult<u64>;

    /// Count members newer than `now - window` without recording anything.
    async fn count_in_window(&self, key: &str, window: Duration) -> StoreResult<u64>;

    /// `DEL key`. Returns `true` if something was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Backend name for diagnostics
    fn backend(&self) -> &'static str;
}

/// Work table operations used by the queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new pending item. The store assigns id and timestamps.
    async fn push(&self, queue: &str, name: &str, payload: &ItemPayload) -> StoreResult<QueueItem>;

    /// Select the oldest pending item, skipping items locked by concurrent
    /// claimants, and mark it in progress in the same transaction.
    async fn claim_oldest_pending(&self, queue: &str) -> StoreResult<Option<QueueItem>>;

    /// Move an item from `from` to `to` if it currently has status `from`.
    async fn transition(
        &self,
        queue: &str,
        id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    ) -> StoreResult<Transition>;

    /// Load an item.
    async fn fetch(&self, queue: &str, id: ItemId) -> StoreResult<Option<QueueItem>>;

    /// Number of items with the given status.
    async fn count(&self, queue: &str, status: ItemStatus) -> StoreResult<u64>;

    /// Backend name for diagnostics
    fn backend(&self) -> &'static str;
}
