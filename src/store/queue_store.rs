//! C7: the merge queue document, mutated through filter-expression updates
//! under the queue lock.

use anyhow::Result;

use crate::config::Config;
use crate::fs::atomic_store::{AtomicStore, StorePolicy};
use crate::models::queue::{QueueDocument, QueueEntry, QueueStatus};

pub struct QueueStore {
    config: Config,
    store: AtomicStore,
}

impl QueueStore {
    pub fn new(config: Config) -> Self {
        let policy = StorePolicy {
            lock_retries: config.lock_retry_budget,
            lock_backoff_base: config.lock_retry_backoff_base,
        };
        Self {
            config,
            store: AtomicStore::new(policy),
        }
    }

    fn path(&self) -> std::path::PathBuf {
        self.config.queue_path()
    }

    fn read_doc(&self) -> Result<QueueDocument> {
        Ok(self.store.read(&self.path())?.unwrap_or_default())
    }

    fn write_doc(&self, doc: &QueueDocument) -> Result<()> {
        self.store.write(&self.path(), doc)
    }

    /// Enqueue `operation`. No-op if an active (pending/processing) entry
    /// already exists for it; a resumed or terminal entry for the same
    /// operation is superseded by a fresh pending entry.
    pub fn enqueue(&self, operation: &str, priority: i64) -> Result<()> {
        let mut doc = self.read_doc()?;
        let has_active = doc
            .entries
            .iter()
            .any(|e| e.operation == operation && e.status.is_active());
        if has_active {
            return Ok(());
        }
        doc.entries.retain(|e| e.operation != operation);
        doc.entries.push(QueueEntry::new(operation, priority));
        self.write_doc(&doc)
    }

    pub fn update_status(&self, operation: &str, status: QueueStatus) -> Result<()> {
        let mut doc = self.read_doc()?;
        for entry in doc.entries.iter_mut().filter(|e| e.operation == operation) {
            entry.status = status;
            entry.updated_at = chrono::Utc::now();
        }
        self.write_doc(&doc)
    }

    pub fn mark_conflict_retried(&self, operation: &str) -> Result<()> {
        let mut doc = self.read_doc()?;
        for entry in doc.entries.iter_mut().filter(|e| e.operation == operation) {
            entry.conflict_retried = true;
            entry.status = QueueStatus::Pending;
            entry.updated_at = chrono::Utc::now();
        }
        self.write_doc(&doc)
    }

    /// Move a `resumed` entry back to `pending` once its blocker has
    /// cleared, so the dispatcher considers it again.
    pub fn requeue(&self, operation: &str) -> Result<()> {
        let mut doc = self.read_doc()?;
        for entry in doc
            .entries
            .iter_mut()
            .filter(|e| e.operation == operation && e.status == QueueStatus::Resumed)
        {
            entry.status = QueueStatus::Pending;
            entry.updated_at = chrono::Utc::now();
        }
        self.write_doc(&doc)
    }

    /// The pending entry minimizing (priority, enqueued_at), if any.
    pub fn next_pending(&self) -> Result<Option<QueueEntry>> {
        let doc = self.read_doc()?;
        Ok(doc
            .entries
            .into_iter()
            .filter(|e| e.status == QueueStatus::Pending)
            .min_by_key(|e| e.sort_key()))
    }

    pub fn list(&self) -> Result<Vec<QueueEntry>> {
        Ok(self.read_doc()?.entries)
    }

    pub fn remove(&self, operation: &str) -> Result<()> {
        let mut doc = self.read_doc()?;
        doc.entries.retain(|e| e.operation != operation);
        self.write_doc(&doc)
    }
}
