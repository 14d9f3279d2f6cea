//! Error types for queue operations.

use keel_core::{ItemId, StoreError};
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No item with this id in the queue
    #[error("Queue item not found: {0}")]
    NotFound(ItemId),

    /// The item is still pending; only claimed items can be finished
    #[error("Queue item {0} has not been claimed")]
    NotClaimed(ItemId),

    /// Store error
    #[error("Queue store error: {0}")]
    Store(#[from] StoreError),

    /// A worker handler reported failure
    #[error("Handler failed: {0}")]
    Handler(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Create a handler failure
    pub fn handler<S: Into<String>>(msg: S) -> Self {
        Self::Handler(msg.into())
    }
}
