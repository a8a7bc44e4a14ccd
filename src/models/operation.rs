//! The operation state document (C3's payload, the unit C4 transitions).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::Phase;

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Feature,
    Fix,
    Chore,
}

impl OperationKind {
    /// The branch-naming prefix convention for this kind.
    pub fn branch_prefix(self) -> &'static str {
        match self {
            OperationKind::Feature => "feature",
            OperationKind::Fix => "fix",
            OperationKind::Chore => "chore",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub kind: OperationKind,
    pub phase: Phase,
    #[serde(default)]
    pub held: bool,
    #[serde(default = "default_true")]
    pub merge_queued: bool,
    pub plan_file: Option<String>,
    pub epic_id: Option<String>,
    pub worktree: Option<String>,
    pub branch: Option<String>,
    pub merge_commit: Option<String>,
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub held_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    pub session_name: Option<String>,
    pub worker_pid: Option<u32>,
    pub worker_started_at: Option<DateTime<Utc>>,
    pub worker_log: Option<String>,

    #[serde(default)]
    pub _schema_version: u32,
    pub _migrated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Operation {
    pub fn new(name: impl Into<String>, kind: OperationKind) -> Self {
        let now = Utc::now();
        let name = name.into();
        Self {
            branch: Some(format!("{}/{}", kind.branch_prefix(), name)),
            name,
            kind,
            phase: Phase::Init,
            held: false,
            merge_queued: true,
            plan_file: None,
            epic_id: None,
            worktree: None,
            merge_commit: None,
            failure_reason: None,
            created_at: now,
            completed_at: None,
            merged_at: None,
            held_at: None,
            updated_at: now,
            session_name: None,
            worker_pid: None,
            worker_started_at: None,
            worker_log: None,
            _schema_version: CURRENT_SCHEMA_VERSION,
            _migrated_at: None,
        }
    }

    pub fn is_merge_ready_phase(&self) -> bool {
        matches!(self.phase, Phase::Completed | Phase::PendingMerge)
    }
}
