//! Queue item definition and status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Queue item identifier, assigned by the store in increasing order.
pub type ItemId = i64;

/// Item payload.
pub type ItemPayload = serde_json::Value;

/// Item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting to be claimed
    Pending,
    /// Claimed by exactly one worker
    InProgress,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl ItemStatus {
    /// Wire name, shared by every backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "in_progress" => Ok(ItemStatus::InProgress),
            "done" => Ok(ItemStatus::Done),
            "failed" => Ok(ItemStatus::Failed),
            other => Err(StoreError::corrupt(format!("unknown item status '{}'", other))),
        }
    }
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Store-assigned identifier
    pub id: ItemId,

    /// Queue the item belongs to
    pub queue: String,

    /// Task name
    pub name: String,

    /// Task payload
    pub payload: ItemPayload,

    /// Current status
    pub status: ItemStatus,

    /// When the store accepted the item
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Claim order: oldest first, id breaks ties.
    pub fn claim_order(&self) -> (DateTime<Utc>, ItemId) {
        (self.created_at, self.id)
    }
}

/// Outcome of a conditional status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The item had the expected status and was moved.
    Applied,
    /// The item exists but had a different status; nothing changed.
    Rejected(ItemStatus),
    /// No such item.
    Missing,
}
