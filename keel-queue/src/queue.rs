//! Work queue over a shared queue store.
//!
//! Producers `enqueue`; any number of consumers `claim_next`. The store hands
//! each pending item to exactly one claimant, oldest first, and moves it to
//! `in_progress` in the same step. Finishing an item is a conditional
//! transition out of `in_progress`, so repeating it is harmless.

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use keel_core::{ItemId, ItemPayload, ItemStatus, QueueItem, QueueStore, Transition};
use std::sync::Arc;
use tracing::{debug, trace};

/// Outcome of finishing a claimed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// This call moved the item to its terminal status
    Applied,
    /// The item was already terminal and was left untouched
    AlreadyTerminal(ItemStatus),
}

/// Handle to one named queue.
#[derive(Clone)]
pub struct WorkQueue {
    store: Arc<dyn QueueStore>,
    config: QueueConfig,
}

impl WorkQueue {
    /// Create a handle for `queue_name`.
    pub fn new(store: Arc<dyn QueueStore>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            config: QueueConfig::new(queue_name),
        }
    }

    /// Create a handle with a checked configuration.
    pub fn with_config(store: Arc<dyn QueueStore>, config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.config.queue_name
    }

    /// Add a pending item.
    pub async fn enqueue(
        &self,
        name: impl Into<String>,
        payload: ItemPayload,
    ) -> QueueResult<QueueItem> {
        let name = name.into();
        let item = self.store.push(self.name(), &name, &payload).await?;
        debug!(queue = %self.name(), id = item.id, name = %item.name, "Enqueued item");
        Ok(item)
    }

    /// Claim the oldest pending item, if any.
    pub async fn claim_next(&self) -> QueueResult<Option<QueueItem>> {
        let item = self.store.claim_oldest_pending(self.name()).await?;
        match &item {
            Some(item) => trace!(queue = %self.name(), id = item.id, "Claimed item"),
            None => trace!(queue = %self.name(), "No pending items"),
        }
        Ok(item)
    }

    /// Mark a claimed item as done.
    pub async fn mark_done(&self, id: ItemId) -> QueueResult<Completion> {
        self.finish(id, ItemStatus::Done).await
    }

    /// Mark a claimed item as failed.
    pub async fn mark_failed(&self, id: ItemId) -> QueueResult<Completion> {
        self.finish(id, ItemStatus::Failed).await
    }

    async fn finish(&self, id: ItemId, to: ItemStatus) -> QueueResult<Completion> {
        let outcome = self
            .store
            .transition(self.name(), id, ItemStatus::InProgress, to)
            .await?;

        match outcome {
            Transition::Applied => {
                debug!(queue = %self.name(), id = id, status = %to, "Finished item");
                Ok(Completion::Applied)
            }
            Transition::Rejected(current) if current.is_terminal() => {
                debug!(queue = %self.name(), id = id, status = %current, "Item already finished");
                Ok(Completion::AlreadyTerminal(current))
            }
            Transition::Rejected(_) => Err(QueueError::NotClaimed(id)),
            Transition::Missing => Err(QueueError::NotFound(id)),
        }
    }

    /// Load an item by id.
    pub async fn get(&self, id: ItemId) -> QueueResult<Option<QueueItem>> {
        Ok(self.store.fetch(self.name(), id).await?)
    }

    /// Number of items waiting to be claimed.
    pub async fn pending_count(&self) -> QueueResult<u64> {
        self.count(ItemStatus::Pending).await
    }

    /// Number of items with the given status.
    pub async fn count(&self, status: ItemStatus) -> QueueResult<u64> {
        Ok(self.store.count(self.name(), status).await?)
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("queue", &self.config.queue_name)
            .field("backend", &self.store.backend())
            .finish()
    }
}
