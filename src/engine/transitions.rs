//! C4: the transition engine. The single entry point through which an
//! operation's phase ever changes.

use anyhow::{Context, Result};
use chrono::Utc;

use crate::error::CoreError;
use crate::models::operation::Operation;
use crate::models::phase::Phase;
use crate::store::OperationStore;

pub struct TransitionEngine<'a> {
    store: &'a OperationStore,
}

impl<'a> TransitionEngine<'a> {
    pub fn new(store: &'a OperationStore) -> Self {
        Self { store }
    }

    /// Attempt `operation -> to`. Loads the current document, validates the
    /// transition and hold state, applies phase-specific effects, persists,
    /// and appends an event.
    pub fn transition(&self, name: &str, to: Phase) -> Result<Operation> {
        self.transition_with(name, to, None, None)
    }

    pub fn fail(&self, name: &str, reason: impl Into<String>) -> Result<Operation> {
        self.transition_with(name, Phase::Failed, Some(reason.into()), None)
    }

    pub fn merge(&self, name: &str, merge_commit: impl Into<String>) -> Result<Operation> {
        self.transition_with(name, Phase::Merged, None, Some(merge_commit.into()))
    }

    fn transition_with(
        &self,
        name: &str,
        to: Phase,
        failure_reason: Option<String>,
        merge_commit: Option<String>,
    ) -> Result<Operation> {
        let mut operation = self
            .store
            .load(name)?
            .with_context(|| format!("no such operation: {name}"))?;
        let from = operation.phase;

        if !from.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                operation: name.to_string(),
                from,
                to,
            }
            .into());
        }

        let hold_exempt = matches!(to, Phase::Failed | Phase::Cancelled | Phase::Merged);
        if operation.held && !hold_exempt {
            return Err(CoreError::Held {
                operation: name.to_string(),
            }
            .into());
        }

        if to == Phase::Merged && merge_commit.is_none() && operation.merge_commit.is_none() {
            anyhow::bail!("transition to merged requires a merge_commit");
        }

        let now = Utc::now();
        operation.phase = to;
        operation.updated_at = now;
        match to {
            Phase::Completed => operation.completed_at = Some(now),
            Phase::Merged => {
                operation.merged_at = Some(now);
                if let Some(commit) = merge_commit {
                    operation.merge_commit = Some(commit);
                }
            }
            Phase::Failed => operation.failure_reason = failure_reason,
            _ => {}
        }
        if to != Phase::Failed {
            // a successful transition clears any stale diagnostic
            if !matches!(to, Phase::Conflict) {
                operation.failure_reason = None;
            }
        }

        self.store.save(&operation)?;
        self.store
            .event_log(name)
            .append("transition", &format!("{from} -> {to}"))?;

        Ok(operation)
    }

    pub fn hold(&self, name: &str) -> Result<Operation> {
        let mut operation = self
            .store
            .load(name)?
            .with_context(|| format!("no such operation: {name}"))?;
        if !operation.held {
            operation.held = true;
            operation.held_at = Some(Utc::now());
            self.store.save(&operation)?;
            self.store.event_log(name).append("held", "")?;
        }
        Ok(operation)
    }

    pub fn resume_hold(&self, name: &str) -> Result<Operation> {
        let mut operation = self
            .store
            .load(name)?
            .with_context(|| format!("no such operation: {name}"))?;
        operation.held = false;
        self.store.save(&operation)?;
        self.store.event_log(name).append("hold:resumed", "")?;
        Ok(operation)
    }

    /// Derive the phase to resume into from `failed`/`interrupted`/`cancelled`.
    pub fn resume_target(operation: &Operation) -> Phase {
        if operation.epic_id.is_some() {
            Phase::Queued
        } else if operation.plan_file.is_some() {
            Phase::Planned
        } else {
            Phase::Init
        }
    }

    pub fn resume(&self, name: &str) -> Result<Operation> {
        let operation = self
            .store
            .load(name)?
            .with_context(|| format!("no such operation: {name}"))?;
        let target = Self::resume_target(&operation);
        self.transition(name, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::operation::OperationKind;

    fn engine_in(dir: &std::path::Path) -> OperationStore {
        let mut config = Config::default();
        config.build_root = dir.to_path_buf();
        OperationStore::new(config)
    }

    #[test]
    fn happy_path_transition_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = engine_in(dir.path());
        store.create("op1", OperationKind::Feature).unwrap();
        let engine = TransitionEngine::new(&store);

        engine.transition("op1", Phase::Planned).unwrap();
        engine.transition("op1", Phase::Queued).unwrap();
        engine.transition("op1", Phase::Executing).unwrap();
        let op = engine.transition("op1", Phase::Completed).unwrap();
        assert_eq!(op.phase, Phase::Completed);
        assert!(op.completed_at.is_some());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = engine_in(dir.path());
        store.create("op1", OperationKind::Feature).unwrap();
        let engine = TransitionEngine::new(&store);

        let result = engine.transition("op1", Phase::Merged);
        assert!(result.is_err());
    }

    #[test]
    fn held_operation_suppresses_non_terminal_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = engine_in(dir.path());
        store.create("op1", OperationKind::Feature).unwrap();
        let engine = TransitionEngine::new(&store);
        engine.hold("op1").unwrap();

        let result = engine.transition("op1", Phase::Planned);
        assert!(result.is_err());

        // failed/cancelled still permitted while held
        let failed = engine.fail("op1", "broke").unwrap();
        assert_eq!(failed.phase, Phase::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("broke"));
    }

    #[test]
    fn hold_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = engine_in(dir.path());
        store.create("op1", OperationKind::Feature).unwrap();
        let engine = TransitionEngine::new(&store);
        engine.hold("op1").unwrap();
        let first_held_at = store.load("op1").unwrap().unwrap().held_at;
        engine.hold("op1").unwrap();
        let second_held_at = store.load("op1").unwrap().unwrap().held_at;
        assert_eq!(first_held_at, second_held_at);
    }

    #[test]
    fn merge_requires_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = engine_in(dir.path());
        store.create("op1", OperationKind::Feature).unwrap();
        let engine = TransitionEngine::new(&store);
        engine.transition("op1", Phase::Planned).unwrap();
        engine.transition("op1", Phase::Queued).unwrap();
        engine.transition("op1", Phase::Executing).unwrap();
        engine.transition("op1", Phase::Completed).unwrap();

        let op = engine.merge("op1", "abc123").unwrap();
        assert_eq!(op.phase, Phase::Merged);
        assert_eq!(op.merge_commit.as_deref(), Some("abc123"));
        assert!(op.merged_at.is_some());
    }

    #[test]
    fn resume_target_prefers_queued_over_planned_over_init() {
        let dir = tempfile::tempdir().unwrap();
        let store = engine_in(dir.path());
        store.create("op1", OperationKind::Feature).unwrap();
        let mut op = store.load("op1").unwrap().unwrap();
        assert_eq!(TransitionEngine::resume_target(&op), Phase::Init);
        op.plan_file = Some("plan.md".to_string());
        assert_eq!(TransitionEngine::resume_target(&op), Phase::Planned);
        op.epic_id = Some("epic-1".to_string());
        assert_eq!(TransitionEngine::resume_target(&op), Phase::Queued);
    }
}
