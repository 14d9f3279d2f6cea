//! In-memory atomic store
//!
//! Uses DashMap for per-key atomicity and a mutex around the work tables.
//! Suitable for tests and single-process deployments. Expiry is judged by the
//! store's own `tokio::time::Instant`, so tests can pause and advance time.

use crate::error::StoreResult;
use crate::item::{ItemId, ItemPayload, ItemStatus, QueueItem, Transition};
use crate::store::{AtomicStore, QueueStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Expiry used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn deadline(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

/// A plain value with an expiry.
#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Sorted-set state for one window key. Members are appended in store-clock
/// order, so the front is always the oldest.
#[derive(Debug)]
struct WindowLog {
    events: VecDeque<(Instant, String)>,
    expires_at: Instant,
}

impl WindowLog {
    fn prune(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while let Some((at, _)) = self.events.front() {
            if *at <= cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, Default)]
struct QueueTable {
    items: HashMap<ItemId, QueueItem>,
    pending: BTreeSet<(DateTime<Utc>, ItemId)>,
}

/// In-memory store implementing both [`AtomicStore`] and [`QueueStore`].
pub struct MemoryStore {
    epoch: Instant,
    slots: DashMap<String, Slot>,
    windows: DashMap<String, WindowLog>,
    queues: Mutex<HashMap<String, QueueTable>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory coordination store");
        Self {
            epoch: Instant::now(),
            slots: DashMap::new(),
            windows: DashMap::new(),
            queues: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(0),
        }
    }

    /// Number of tracked keys, expired or not (for monitoring)
    pub fn key_count(&self) -> usize {
        self.slots.len() + self.windows.len()
    }

    /// Drop expired keys. Reads already ignore them; this only frees memory.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.slots.retain(|_, slot| slot.is_live(now));
        self.windows.retain(|_, log| now < log.expires_at);
        debug!(key_count = self.key_count(), "Purged expired keys");
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("key_count", &self.key_count())
            .finish()
    }
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let entry = self.slots.entry(key.to_string());
        let now = Instant::now();
        let slot = Slot {
            value: value.to_string(),
            expires_at: deadline(now, ttl),
        };

        match entry {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(slot);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone()))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let removed = self
            .slots
            .remove_if(key, |_, slot| slot.is_live(now) && slot.value == expected);
        Ok(removed.is_some())
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let Some(mut slot) = self.slots.get_mut(key) else {
            return Ok(false);
        };
        let now = Instant::now();
        if !slot.is_live(now) || slot.value != expected {
            return Ok(false);
        }
        slot.expires_at = deadline(now, ttl);
        Ok(true)
    }

    async fn record_in_window(
        &self,
        key: &str,
        member_suffix: &str,
        window: Duration,
        expire_after: Duration,
    ) -> StoreResult<u64> {
        // Read the clock under the entry lock so events land in time order.
        let mut log = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowLog {
                events: VecDeque::new(),
                expires_at: Instant::now(),
            });
        let now = Instant::now();

        if now >= log.expires_at {
            log.events.clear();
        }
        log.prune(now, window);

        let score = now.duration_since(self.epoch).as_secs_f64();
        log.events.push_back((now, format!("{:.6}-{}", score, member_suffix)));
        log.expires_at = deadline(now, expire_after);

        let count = log.events.len() as u64;
        trace!(key = %key, count = count, "Recorded window event");
        Ok(count)
    }

    async fn count_in_window(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let now = Instant::now();
        let Some(log) = self.windows.get(key) else {
            return Ok(0);
        };
        if now >= log.expires_at {
            return Ok(0);
        }

        let count = match now.checked_sub(window) {
            Some(cutoff) => log.events.iter().filter(|(at, _)| *at > cutoff).count(),
            None => log.events.len(),
        };
        Ok(count as u64)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let slot = self.slots.remove(key).is_some();
        let window = self.windows.remove(key).is_some();
        Ok(slot || window)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, queue: &str, name: &str, payload: &ItemPayload) -> StoreResult<QueueItem> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let item = QueueItem {
            id,
            queue: queue.to_string(),
            name: name.to_string(),
            payload: payload.clone(),
            status: ItemStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let mut queues = self.queues.lock();
        let table = queues.entry(queue.to_string()).or_default();
        table.pending.insert(item.claim_order());
        table.items.insert(id, item.clone());

        Ok(item)
    }

    async fn claim_oldest_pending(&self, queue: &str) -> StoreResult<Option<QueueItem>> {
        let mut queues = self.queues.lock();
        let Some(table) = queues.get_mut(queue) else {
            return Ok(None);
        };

        while let Some((_, id)) = table.pending.pop_first() {
            if let Some(item) = table.items.get_mut(&id)
                && item.status == ItemStatus::Pending
            {
                item.status = ItemStatus::InProgress;
                item.updated_at = Utc::now();
                return Ok(Some(item.clone()));
            }
        }

        Ok(None)
    }

    async fn transition(
        &self,
        queue: &str,
        id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    ) -> StoreResult<Transition> {
        let mut queues = self.queues.lock();
        let Some(table) = queues.get_mut(queue) else {
            return Ok(Transition::Missing);
        };
        let Some(item) = table.items.get_mut(&id) else {
            return Ok(Transition::Missing);
        };

        if item.status != from {
            return Ok(Transition::Rejected(item.status));
        }

        let order = item.claim_order();
        item.status = to;
        item.updated_at = Utc::now();

        if from == ItemStatus::Pending {
            table.pending.remove(&order);
        }
        if to == ItemStatus::Pending {
            table.pending.insert(order);
        }

        Ok(Transition::Applied)
    }

    async fn fetch(&self, queue: &str, id: ItemId) -> StoreResult<Option<QueueItem>> {
        let queues = self.queues.lock();
        Ok(queues
            .get(queue)
            .and_then(|table| table.items.get(&id))
            .cloned())
    }

    async fn count(&self, queue: &str, status: ItemStatus) -> StoreResult<u64> {
        let queues = self.queues.lock();
        let count = queues
            .get(queue)
            .map(|table| {
                table
                    .items
                    .values()
                    .filter(|item| item.status == status)
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_live_value() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        assert!(store.set_if_absent("k", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "b", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_value_is_absent_and_replaceable() {
        let store = MemoryStore::new();

        store
            .set_if_absent("k", "a", Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(
            store
                .set_if_absent("k", "b", Duration::from_secs(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_and_delete_checks_value() {
        let store = MemoryStore::new();
        store
            .set_if_absent("k", "owner", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(!store.compare_and_delete("k", "other").await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());

        assert!(store.compare_and_delete("k", "owner").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_and_delete_ignores_expired_value() {
        let store = MemoryStore::new();
        store
            .set_if_absent("k", "owner", Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!store.compare_and_delete("k", "owner").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_and_expire_extends_only_for_owner() {
        let store = MemoryStore::new();
        store
            .set_if_absent("k", "owner", Duration::from_secs(2))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(
            !store
                .compare_and_expire("k", "other", Duration::from_secs(5))
                .await
                .unwrap()
        );
        assert!(
            store
                .compare_and_expire("k", "owner", Duration::from_secs(5))
                .await
                .unwrap()
        );

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("owner"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_in_window_prunes_old_events() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(3);
        let expire = Duration::from_secs(4);

        assert_eq!(store.record_in_window("w", "a", window, expire).await.unwrap(), 1);
        assert_eq!(store.record_in_window("w", "b", window, expire).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.record_in_window("w", "c", window, expire).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_key_expires_when_idle() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);

        store
            .record_in_window("w", "a", window, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(store.count_in_window("w", window).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.count_in_window("w", window).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_durations_do_not_overflow() {
        let store = MemoryStore::new();

        assert!(store.set_if_absent("k", "a", Duration::MAX).await.unwrap());
        assert!(store.compare_and_expire("k", "a", Duration::MAX).await.unwrap());
        assert_eq!(
            store
                .record_in_window("w", "a", Duration::MAX, Duration::MAX)
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.count_in_window("w", Duration::MAX).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_window_events_all_age_out() {
        let store = Arc::new(MemoryStore::new());
        let window = Duration::from_millis(50);
        let expire = Duration::from_secs(10);

        let handles: Vec<_> = (0..8)
            .map(|task| {
                let store = store.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        let suffix = format!("{}-{}", task, i);
                        store
                            .record_in_window("busy", &suffix, window, expire)
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            store
                .record_in_window("busy", "last", window, expire)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_purge() {
        let store = MemoryStore::new();
        store
            .set_if_absent("a", "1", Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set_if_absent("b", "1", Duration::from_secs(100))
            .await
            .unwrap();

        assert!(store.delete("b").await.unwrap());
        assert!(!store.delete("b").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        store.purge_expired();
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let store = MemoryStore::new();
        let first = store.push("q", "one", &json!({})).await.unwrap();
        let second = store.push("q", "two", &json!({})).await.unwrap();

        let claimed = store.claim_oldest_pending("q").await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, ItemStatus::InProgress);

        let claimed = store.claim_oldest_pending("q").await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(store.claim_oldest_pending("q").await.unwrap().is_none());
        assert!(store.claim_oldest_pending("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let store = MemoryStore::new();
        let item = store.push("q", "task", &json!({"n": 1})).await.unwrap();

        let result = store
            .transition("q", item.id, ItemStatus::InProgress, ItemStatus::Done)
            .await
            .unwrap();
        assert_eq!(result, Transition::Rejected(ItemStatus::Pending));

        store.claim_oldest_pending("q").await.unwrap();
        let result = store
            .transition("q", item.id, ItemStatus::InProgress, ItemStatus::Done)
            .await
            .unwrap();
        assert_eq!(result, Transition::Applied);

        let result = store
            .transition("q", item.id, ItemStatus::InProgress, ItemStatus::Failed)
            .await
            .unwrap();
        assert_eq!(result, Transition::Rejected(ItemStatus::Done));

        let result = store
            .transition("q", 999, ItemStatus::InProgress, ItemStatus::Done)
            .await
            .unwrap();
        assert_eq!(result, Transition::Missing);
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let store = MemoryStore::new();
        store.push("q", "a", &json!({})).await.unwrap();
        store.push("q", "b", &json!({})).await.unwrap();
        store.claim_oldest_pending("q").await.unwrap();

        assert_eq!(store.count("q", ItemStatus::Pending).await.unwrap(), 1);
        assert_eq!(store.count("q", ItemStatus::InProgress).await.unwrap(), 1);
        assert_eq!(store.count("missing", ItemStatus::Pending).await.unwrap(), 0);
    }

    #[test]
    fn test_backend_name() {
        let store = MemoryStore::new();
        assert_eq!(AtomicStore::backend(&store), "memory");
        assert_eq!(QueueStore::backend(&store), "memory");
    }
}
