//! Polling worker that drains a queue through registered handlers.

use crate::config::WorkerConfig;
use crate::error::{QueueError, QueueResult};
use crate::queue::WorkQueue;
use keel_core::QueueItem;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Item handler function type.
pub type ItemHandler =
    Arc<dyn Fn(QueueItem) -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> + Send + Sync>;

/// Worker for processing items from a queue.
///
/// Handlers are looked up by item name. An item with no handler is marked
/// failed rather than left in progress.
pub struct Worker {
    queue: WorkQueue,
    handlers: HashMap<String, ItemHandler>,
    config: WorkerConfig,
}

impl Worker {
    /// Create a new worker.
    pub fn new(queue: WorkQueue) -> Self {
        Self::with_config(queue, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(queue: WorkQueue, config: WorkerConfig) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register a handler for items called `name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use keel_core::MemoryStore;
    /// use keel_queue::{WorkQueue, Worker};
    /// use std::sync::Arc;
    ///
    /// let queue = WorkQueue::new(Arc::new(MemoryStore::new()), "emails");
    /// let mut worker = Worker::new(queue);
    ///
    /// worker.register_handler("send_email", |item| async move {
    ///     println!("Sending email: {:?}", item.payload);
    ///     Ok(())
    /// });
    /// ```
    pub fn register_handler<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(QueueItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        let wrapped: ItemHandler = Arc::new(
            move |item: QueueItem| -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> {
                Box::pin(handler(item))
            },
        );
        self.handlers.insert(name.into(), wrapped);
    }

    /// Get the queue this worker drains
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Claim and process at most one item. Returns whether an item was found.
    pub async fn run_once(&self) -> QueueResult<bool> {
        let Some(item) = self.queue.claim_next().await? else {
            return Ok(false);
        };

        let id = item.id;
        let Some(handler) = self.handlers.get(&item.name).cloned() else {
            warn!(queue = %self.queue.name(), id = id, name = %item.name, "No handler for item");
            self.queue.mark_failed(id).await?;
            return Ok(true);
        };

        debug!(queue = %self.queue.name(), id = id, name = %item.name, "Processing item");

        match tokio::time::timeout(self.config.job_timeout, handler(item)).await {
            Ok(Ok(())) => {
                self.queue.mark_done(id).await?;
                debug!(queue = %self.queue.name(), id = id, "Item completed");
            }
            Ok(Err(e)) => {
                warn!(queue = %self.queue.name(), id = id, error = %e, "Item failed");
                self.queue.mark_failed(id).await?;
            }
            Err(_) => {
                let e = QueueError::handler("timed out");
                warn!(queue = %self.queue.name(), id = id, error = %e, "Item failed");
                self.queue.mark_failed(id).await?;
            }
        }

        Ok(true)
    }

    /// Process items until `shutdown` resolves.
    ///
    /// Shutdown is only observed between items, so an item is never left
    /// half-processed by the worker itself.
    pub async fn run<S>(&self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(queue = %self.queue.name(), handlers = self.handlers.len(), "Worker started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = std::future::ready(()) => {}
            }

            let idle = match self.run_once().await {
                Ok(processed) => !processed,
                Err(e) => {
                    error!(queue = %self.queue.name(), error = %e, "Worker iteration failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(queue = %self.queue.name(), "Worker stopped");
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Worker")
            .field("queue", &self.queue)
            .field("handlers", &names)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::testing::FailingStore;
    use keel_core::{ItemStatus, MemoryStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn queue() -> WorkQueue {
        WorkQueue::new(Arc::new(MemoryStore::new()), "jobs")
    }

    #[test]
    fn test_worker_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.job_timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_run_once_surfaces_store_failure() {
        let worker = Worker::new(WorkQueue::new(Arc::new(FailingStore::new()), "jobs"));
        assert!(matches!(worker.run_once().await, Err(QueueError::Store(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_polling_through_store_failures() {
        let store = Arc::new(FailingStore::new());
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(100),
            ..WorkerConfig::default()
        };
        let worker = Worker::with_config(WorkQueue::new(store.clone(), "jobs"), config);

        worker.run(tokio::time::sleep(Duration::from_millis(350))).await;
        assert_eq!(store.call_count(), 4);
    }

    #[tokio::test]
    async fn test_run_once_empty_queue() {
        let worker = Worker::new(queue());
        assert!(!worker.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_handler_success_marks_done() {
        let queue = queue();
        let calls = Arc::new(AtomicU32::new(0));
        let mut worker = Worker::new(queue.clone());

        let counter = calls.clone();
        worker.register_handler("greet", move |item| {
            let counter = counter.clone();
            async move {
                assert_eq!(item.payload, json!({"name": "ada"}));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let item = queue.enqueue("greet", json!({"name": "ada"})).await.unwrap();
        assert!(worker.run_once().await.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stored = queue.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Done);
    }

    #[tokio::test]
    async fn test_handler_error_marks_failed() {
        let queue = queue();
        let mut worker = Worker::new(queue.clone());
        worker.register_handler("explode", |_| async { Err(QueueError::handler("boom")) });

        let item = queue.enqueue("explode", json!(null)).await.unwrap();
        assert!(worker.run_once().await.unwrap());

        let stored = queue.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_handler_marks_failed() {
        let queue = queue();
        let worker = Worker::new(queue.clone());

        let item = queue.enqueue("unknown", json!(null)).await.unwrap();
        assert!(worker.run_once().await.unwrap());

        let stored = queue.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_failed() {
        let queue = queue();
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            job_timeout: Duration::from_secs(1),
        };
        let mut worker = Worker::with_config(queue.clone(), config);
        worker.register_handler("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });

        let item = queue.enqueue("slow", json!(null)).await.unwrap();
        assert!(worker.run_once().await.unwrap());

        let stored = queue.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_until_shutdown() {
        let queue = queue();
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(100),
            job_timeout: Duration::from_secs(5),
        };
        let mut worker = Worker::with_config(queue.clone(), config);
        worker.register_handler("noop", |_| async { Ok(()) });

        for _ in 0..3 {
            queue.enqueue("noop", json!(null)).await.unwrap();
        }

        worker
            .run(tokio::time::sleep(Duration::from_secs(1)))
            .await;

        assert_eq!(queue.pending_count().await.unwrap(), 0);
        assert_eq!(queue.count(ItemStatus::Done).await.unwrap(), 3);
    }
}
