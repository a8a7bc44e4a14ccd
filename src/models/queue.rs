//! Merge queue document and entry types (C7's data shape).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const QUEUE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeType {
    Operation,
    Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Conflict,
    Resumed,
}

impl QueueStatus {
    pub fn is_active(self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub operation: String,
    pub merge_type: MergeType,
    pub priority: i64,
    pub status: QueueStatus,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub worktree: Option<String>,
    pub issue_id: Option<String>,
    #[serde(default)]
    pub conflict_retried: bool,
}

impl QueueEntry {
    pub fn new(operation: impl Into<String>, priority: i64) -> Self {
        let operation = operation.into();
        let merge_type = if operation.contains('/') {
            MergeType::Branch
        } else {
            MergeType::Operation
        };
        let now = Utc::now();
        Self {
            operation,
            merge_type,
            priority,
            status: QueueStatus::Pending,
            enqueued_at: now,
            updated_at: now,
            worktree: None,
            issue_id: None,
            conflict_retried: false,
        }
    }

    /// Total order used for dequeue: lower priority first, then earlier
    /// enqueue time first.
    pub fn sort_key(&self) -> (i64, DateTime<Utc>) {
        (self.priority, self.enqueued_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDocument {
    pub version: u32,
    pub entries: Vec<QueueEntry>,
}

impl Default for QueueDocument {
    fn default() -> Self {
        Self {
            version: QUEUE_SCHEMA_VERSION,
            entries: Vec::new(),
        }
    }
}
