//! C6: readiness evaluation for merge dispatch and stale-entry cleanup.

use anyhow::Result;
use std::path::Path;

use crate::models::operation::Operation;
use crate::models::phase::Phase;
use crate::tracker::IssueTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReady {
    Phase(Phase),
    WorktreeMissing,
    SessionActive,
    OpenIssues(usize),
}

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotReady::Phase(p) => write!(f, "phase:{p}"),
            NotReady::WorktreeMissing => write!(f, "worktree:missing"),
            NotReady::SessionActive => write!(f, "session:active"),
            NotReady::OpenIssues(n) => write!(f, "open_issues:{n}"),
        }
    }
}

/// Whether a session is active for a given operation; abstracted so the
/// evaluator doesn't depend on the worker supervisor's concrete state.
pub trait SessionLookup {
    fn is_session_active(&self, operation: &str) -> bool;
}

pub fn is_merge_ready<T: IssueTracker, S: SessionLookup>(
    operation: &Operation,
    tracker: &T,
    sessions: &S,
) -> Result<Result<(), NotReady>> {
    if !operation.is_merge_ready_phase() {
        return Ok(Err(NotReady::Phase(operation.phase)));
    }

    let has_worktree = operation
        .worktree
        .as_deref()
        .map(|w| Path::new(w).is_dir())
        .unwrap_or(false);
    let bare_branch_ok = operation.branch.as_deref().map(|b| b.contains('/')).unwrap_or(false)
        && operation.worktree.is_none();
    if !has_worktree && !bare_branch_ok {
        return Ok(Err(NotReady::WorktreeMissing));
    }

    if sessions.is_session_active(&operation.name) {
        return Ok(Err(NotReady::SessionActive));
    }

    if let Some(plan_label) = plan_label(operation) {
        let open_count = tracker
            .list_by_label(&plan_label)?
            .into_iter()
            .filter(|i| i.status.is_open())
            .count();
        if open_count > 0 {
            return Ok(Err(NotReady::OpenIssues(open_count)));
        }
    }

    Ok(Ok(()))
}

fn plan_label(operation: &Operation) -> Option<String> {
    operation.plan_file.as_ref().map(|_| operation.name.clone())
}

/// Reason a queue entry is stale and should be removed without a merge
/// attempt. Distinguishes absence of a ref (stale) from lookup failure
/// (which must propagate as an error instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    AlreadyMerged,
    BranchVanished,
}

pub fn stale_reason(operation: &Operation, branch_exists_remote: Option<bool>) -> Option<StaleReason> {
    if operation.merged_at.is_some() {
        return Some(StaleReason::AlreadyMerged);
    }
    match branch_exists_remote {
        Some(false) => Some(StaleReason::BranchVanished),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::operation::OperationKind;
    use crate::tracker::fake::FakeTracker;

    struct NoSessionsActive;
    impl SessionLookup for NoSessionsActive {
        fn is_session_active(&self, _operation: &str) -> bool {
            false
        }
    }

    struct AlwaysActive;
    impl SessionLookup for AlwaysActive {
        fn is_session_active(&self, _operation: &str) -> bool {
            true
        }
    }

    #[test]
    fn wrong_phase_is_not_ready() {
        let op = Operation::new("op1", OperationKind::Feature);
        let tracker = FakeTracker::new();
        let result = is_merge_ready(&op, &tracker, &NoSessionsActive).unwrap();
        assert_eq!(result, Err(NotReady::Phase(Phase::Init)));
    }

    #[test]
    fn missing_worktree_is_not_ready() {
        let mut op = Operation::new("op1", OperationKind::Feature);
        op.phase = Phase::Completed;
        let tracker = FakeTracker::new();
        let result = is_merge_ready(&op, &tracker, &NoSessionsActive).unwrap();
        assert_eq!(result, Err(NotReady::WorktreeMissing));
    }

    #[test]
    fn active_session_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut op = Operation::new("op1", OperationKind::Feature);
        op.phase = Phase::Completed;
        op.worktree = Some(dir.path().to_string_lossy().to_string());
        let tracker = FakeTracker::new();
        let result = is_merge_ready(&op, &tracker, &AlwaysActive).unwrap();
        assert_eq!(result, Err(NotReady::SessionActive));
    }

    #[test]
    fn ready_when_worktree_present_and_issues_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut op = Operation::new("op1", OperationKind::Feature);
        op.phase = Phase::Completed;
        op.worktree = Some(dir.path().to_string_lossy().to_string());
        let tracker = FakeTracker::new();
        let result = is_merge_ready(&op, &tracker, &NoSessionsActive).unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn stale_when_already_merged() {
        let mut op = Operation::new("op1", OperationKind::Feature);
        op.merged_at = Some(chrono::Utc::now());
        assert_eq!(stale_reason(&op, None), Some(StaleReason::AlreadyMerged));
    }

    #[test]
    fn stale_when_branch_vanished() {
        let op = Operation::new("op1", OperationKind::Feature);
        assert_eq!(
            stale_reason(&op, Some(false)),
            Some(StaleReason::BranchVanished)
        );
    }

    #[test]
    fn lookup_failure_is_not_stale() {
        let op = Operation::new("op1", OperationKind::Feature);
        assert_eq!(stale_reason(&op, None), None);
    }
}
