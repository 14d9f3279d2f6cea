//! Test doubles for code written against the store traits.
//!
//! Enabled with the `testing` feature.

use crate::error::{StoreError, StoreResult};
use crate::item::{ItemId, ItemPayload, ItemStatus, QueueItem, Transition};
use crate::store::{AtomicStore, QueueStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A store whose every call fails with [`StoreError::Unavailable`].
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    /// Create a new failing store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls attempted so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self, op: &str) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::unavailable(format!("{} failed: connection refused", op)))
    }
}

#[async_trait]
impl AtomicStore for FailingStore {
    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<bool> {
        self.fail("set_if_absent")
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        self.fail("get")
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &str) -> StoreResult<bool> {
        self.fail("compare_and_delete")
    }

    async fn compare_and_expire(
        &self,
        _key: &str,
        _expected: &str,
        _ttl: Duration,
    ) -> StoreResult<bool> {
        self.fail("compare_and_expire")
    }

    async fn record_in_window(
        &self,
        _key: &str,
        _member_suffix: &str,
        _window: Duration,
        _expire_after: Duration,
    ) -> StoreResult<u64> {
        self.fail("record_in_window")
    }

    async fn count_in_window(&self, _key: &str, _window: Duration) -> StoreResult<u64> {
        self.fail("count_in_window")
    }

    async fn delete(&self, _key: &str) -> StoreResult<bool> {
        self.fail("delete")
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl QueueStore for FailingStore {
    async fn push(
        &self,
        _queue: &str,
        _name: &str,
        _payload: &ItemPayload,
    ) -> StoreResult<QueueItem> {
        self.fail("push")
    }

    async fn claim_oldest_pending(&self, _queue: &str) -> StoreResult<Option<QueueItem>> {
        self.fail("claim_oldest_pending")
    }

    async fn transition(
        &self,
        _queue: &str,
        _id: ItemId,
        _from: ItemStatus,
        _to: ItemStatus,
    ) -> StoreResult<Transition> {
        self.fail("transition")
    }

    async fn fetch(&self, _queue: &str, _id: ItemId) -> StoreResult<Option<QueueItem>> {
        self.fail("fetch")
    }

    async fn count(&self, _queue: &str, _status: ItemStatus) -> StoreResult<u64> {
        self.fail("count")
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}
