//! Operation lifecycle phases and the legal-transition table.
//!
//! Transition validation lives on the enum itself, in the style used
//! throughout this codebase for status types: a `predecessors` table drives
//! both `can_transition_to` and `try_transition`, so the table is defined
//! once and never drifts out of sync with the check.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Planned,
    Queued,
    Blocked,
    Executing,
    Completed,
    PendingMerge,
    Merged,
    Failed,
    Interrupted,
    Cancelled,
    Conflict,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::Planned => "planned",
            Phase::Queued => "queued",
            Phase::Blocked => "blocked",
            Phase::Executing => "executing",
            Phase::Completed => "completed",
            Phase::PendingMerge => "pending_merge",
            Phase::Merged => "merged",
            Phase::Failed => "failed",
            Phase::Interrupted => "interrupted",
            Phase::Cancelled => "cancelled",
            Phase::Conflict => "conflict",
        };
        f.write_str(s)
    }
}

impl Phase {
    /// Phases from which `self` may be reached directly.
    pub fn predecessors(self) -> &'static [Phase] {
        use Phase::*;
        match self {
            Init => &[Failed, Interrupted],
            Planned => &[Init, Blocked, Failed, Interrupted],
            Queued => &[Planned, Blocked, Failed, Interrupted],
            Blocked => &[Init, Planned],
            Executing => &[Queued],
            Completed => &[Executing],
            PendingMerge => &[Completed, Conflict],
            Merged => &[Completed, PendingMerge],
            Failed => &[Init, Planned, Queued, Executing, Completed, PendingMerge, Conflict],
            Interrupted => &[Executing],
            Cancelled => &[Init, Planned, Queued, Executing],
            Conflict => &[PendingMerge],
        }
    }

    pub fn can_transition_to(self, target: Phase) -> bool {
        target.predecessors().contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Merged | Phase::Cancelled)
    }

    pub fn valid_transitions(self) -> Vec<Phase> {
        use Phase::*;
        [
            Init, Planned, Queued, Blocked, Executing, Completed, PendingMerge, Merged, Failed,
            Interrupted, Cancelled, Conflict,
        ]
        .into_iter()
        .filter(|&p| self.can_transition_to(p))
        .collect()
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Phase::Init),
            "planned" => Ok(Phase::Planned),
            "queued" => Ok(Phase::Queued),
            "blocked" => Ok(Phase::Blocked),
            "executing" => Ok(Phase::Executing),
            "completed" => Ok(Phase::Completed),
            "pending_merge" => Ok(Phase::PendingMerge),
            "merged" => Ok(Phase::Merged),
            "failed" => Ok(Phase::Failed),
            "interrupted" => Ok(Phase::Interrupted),
            "cancelled" => Ok(Phase::Cancelled),
            "conflict" => Ok(Phase::Conflict),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_chain_is_legal() {
        assert!(Phase::Init.can_transition_to(Phase::Planned));
        assert!(Phase::Planned.can_transition_to(Phase::Queued));
        assert!(Phase::Queued.can_transition_to(Phase::Executing));
        assert!(Phase::Executing.can_transition_to(Phase::Completed));
        assert!(Phase::Completed.can_transition_to(Phase::PendingMerge));
        assert!(Phase::PendingMerge.can_transition_to(Phase::Merged));
    }

    #[test]
    fn merged_is_terminal() {
        assert!(Phase::Merged.is_terminal());
        assert!(Phase::Merged.valid_transitions().is_empty());
    }

    #[test]
    fn cancelled_is_terminal() {
        assert!(Phase::Cancelled.is_terminal());
    }

    #[test]
    fn conflict_can_retry_once_via_pending_merge() {
        assert!(Phase::PendingMerge.can_transition_to(Phase::Conflict));
        assert!(Phase::Conflict.can_transition_to(Phase::PendingMerge));
        assert!(Phase::Conflict.can_transition_to(Phase::Failed));
    }

    #[test]
    fn resume_transitions_from_failed_and_interrupted() {
        assert!(Phase::Failed.can_transition_to(Phase::Init));
        assert!(Phase::Failed.can_transition_to(Phase::Planned));
        assert!(Phase::Failed.can_transition_to(Phase::Queued));
        assert!(Phase::Interrupted.can_transition_to(Phase::Init));
    }

    #[test]
    fn cannot_skip_executing() {
        assert!(!Phase::Queued.can_transition_to(Phase::Completed));
        assert!(!Phase::Planned.can_transition_to(Phase::Merged));
    }

    #[test]
    fn cannot_leave_merged_or_cancelled() {
        for target in Phase::Merged.valid_transitions() {
            panic!("merged should have no valid transitions, got {target:?}");
        }
        assert!(Phase::Cancelled.valid_transitions().is_empty());
    }

    #[test]
    fn blocked_resolves_to_planned_or_queued() {
        assert!(Phase::Blocked.can_transition_to(Phase::Planned));
        assert!(Phase::Blocked.can_transition_to(Phase::Queued));
        assert!(!Phase::Blocked.can_transition_to(Phase::Cancelled));
    }

    #[test]
    fn executing_can_cancel_but_blocked_cannot() {
        assert!(Phase::Executing.can_transition_to(Phase::Cancelled));
        assert!(!Phase::Blocked.can_transition_to(Phase::Cancelled));
    }

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(Phase::PendingMerge.to_string(), "pending_merge");
        assert_eq!(Phase::Init.to_string(), "init");
    }

    #[test]
    fn from_str_round_trips_with_display() {
        use std::str::FromStr;
        assert_eq!(Phase::from_str("pending_merge").unwrap(), Phase::PendingMerge);
        assert!(Phase::from_str("bogus").is_err());
    }
}
