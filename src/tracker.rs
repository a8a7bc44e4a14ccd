//! The issue-tracker contract: an external collaborator the core consumes
//! for blocker relationships and plan-issue gating. Specified as a trait so
//! production code can shell out to the real tool while tests use an
//! in-memory fake.

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStatus {
    Todo,
    InProgress,
    Done,
}

impl IssueStatus {
    pub fn is_open(self) -> bool {
        matches!(self, IssueStatus::Todo | IssueStatus::InProgress)
    }
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub id: String,
    pub label: String,
    pub status: IssueStatus,
    pub blocks: Vec<String>,
    pub assignee: Option<String>,
}

pub trait IssueTracker {
    fn create(&self, kind: &str, label: &str) -> Result<String>;
    fn list_by_label(&self, label: &str) -> Result<Vec<Issue>>;
    fn show(&self, id: &str) -> Result<Option<Issue>>;
    fn show_many(&self, ids: &[String]) -> Result<Vec<Issue>>;
    fn close(&self, id: &str) -> Result<()>;
    fn reopen(&self, id: &str) -> Result<()>;
    fn add_note(&self, id: &str, note: &str) -> Result<()>;
    fn set_assignee(&self, id: &str, assignee: &str) -> Result<()>;
    /// Record that `id` is blocked by `blocker_id`.
    fn add_blocker(&self, id: &str, blocker_id: &str) -> Result<()>;
}

/// Sentinel assignee used to hand an issue back to a human after a
/// note-without-fix exit.
pub const HUMAN_ASSIGNEE: &str = "worker:human";

/// A JSON-backed tracker for deployments with no external issue tracker
/// configured, stored through the same atomic-store primitive as every
/// other core document.
pub mod local {
    use super::*;
    use crate::fs::atomic_store::{AtomicStore, StorePolicy};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct StoredIssue {
        id: String,
        label: String,
        status: StoredStatus,
        blocks: Vec<String>,
        assignee: Option<String>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    enum StoredStatus {
        Todo,
        InProgress,
        Done,
    }

    impl From<StoredStatus> for IssueStatus {
        fn from(s: StoredStatus) -> Self {
            match s {
                StoredStatus::Todo => IssueStatus::Todo,
                StoredStatus::InProgress => IssueStatus::InProgress,
                StoredStatus::Done => IssueStatus::Done,
            }
        }
    }

    impl From<IssueStatus> for StoredStatus {
        fn from(s: IssueStatus) -> Self {
            match s {
                IssueStatus::Todo => StoredStatus::Todo,
                IssueStatus::InProgress => StoredStatus::InProgress,
                IssueStatus::Done => StoredStatus::Done,
            }
        }
    }

    impl From<&StoredIssue> for Issue {
        fn from(s: &StoredIssue) -> Self {
            Issue {
                id: s.id.clone(),
                label: s.label.clone(),
                status: s.status.into(),
                blocks: s.blocks.clone(),
                assignee: s.assignee.clone(),
            }
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Document {
        next_id: u32,
        issues: HashMap<String, StoredIssue>,
    }

    pub struct LocalTracker {
        path: PathBuf,
        store: AtomicStore,
    }

    impl LocalTracker {
        pub fn new(build_root: &Path, lock_retries: u32, lock_backoff_base: std::time::Duration) -> Self {
            Self {
                path: build_root.join("tracker.json"),
                store: AtomicStore::new(StorePolicy {
                    lock_retries,
                    lock_backoff_base,
                }),
            }
        }

        fn read_doc(&self) -> Result<Document> {
            Ok(self.store.read(&self.path)?.unwrap_or_default())
        }

        fn write_doc(&self, doc: &Document) -> Result<()> {
            self.store.write(&self.path, doc)
        }
    }

    impl IssueTracker for LocalTracker {
        fn create(&self, _kind: &str, label: &str) -> Result<String> {
            let mut doc = self.read_doc()?;
            doc.next_id += 1;
            let id = format!("issue-{}", doc.next_id);
            doc.issues.insert(
                id.clone(),
                StoredIssue {
                    id: id.clone(),
                    label: label.to_string(),
                    status: StoredStatus::Todo,
                    blocks: Vec::new(),
                    assignee: None,
                },
            );
            self.write_doc(&doc)?;
            Ok(id)
        }

        fn list_by_label(&self, label: &str) -> Result<Vec<Issue>> {
            let doc = self.read_doc()?;
            Ok(doc
                .issues
                .values()
                .filter(|i| i.label == label)
                .map(Issue::from)
                .collect())
        }

        fn show(&self, id: &str) -> Result<Option<Issue>> {
            let doc = self.read_doc()?;
            Ok(doc.issues.get(id).map(Issue::from))
        }

        fn show_many(&self, ids: &[String]) -> Result<Vec<Issue>> {
            let doc = self.read_doc()?;
            Ok(ids.iter().filter_map(|id| doc.issues.get(id).map(Issue::from)).collect())
        }

        fn close(&self, id: &str) -> Result<()> {
            let mut doc = self.read_doc()?;
            if let Some(issue) = doc.issues.get_mut(id) {
                issue.status = StoredStatus::Done;
            }
            self.write_doc(&doc)
        }

        fn reopen(&self, id: &str) -> Result<()> {
            let mut doc = self.read_doc()?;
            if let Some(issue) = doc.issues.get_mut(id) {
                issue.status = StoredStatus::Todo;
            }
            self.write_doc(&doc)
        }

        fn add_note(&self, _id: &str, _note: &str) -> Result<()> {
            Ok(())
        }

        fn set_assignee(&self, id: &str, assignee: &str) -> Result<()> {
            let mut doc = self.read_doc()?;
            if let Some(issue) = doc.issues.get_mut(id) {
                issue.assignee = Some(assignee.to_string());
            }
            self.write_doc(&doc)
        }

        fn add_blocker(&self, id: &str, blocker_id: &str) -> Result<()> {
            let mut doc = self.read_doc()?;
            if let Some(issue) = doc.issues.get_mut(id) {
                if !issue.blocks.contains(&blocker_id.to_string()) {
                    issue.blocks.push(blocker_id.to_string());
                }
            }
            self.write_doc(&doc)
        }
    }

}


#[cfg(test)]
mod tests {
    use super::fake::FakeTracker;
    use super::*;

    #[test]
    fn issue_status_open_check() {
        assert!(IssueStatus::Todo.is_open());
        assert!(IssueStatus::InProgress.is_open());
        assert!(!IssueStatus::Done.is_open());
    }

    #[test]
    fn fake_tracker_round_trips() {
        let tracker = FakeTracker::new();
        let id = tracker.create("feature", "plan-1").unwrap();
        let issue = tracker.show(&id).unwrap().unwrap();
        assert_eq!(issue.status, IssueStatus::Todo);
        tracker.close(&id).unwrap();
        assert_eq!(tracker.show(&id).unwrap().unwrap().status, IssueStatus::Done);
    }
}
