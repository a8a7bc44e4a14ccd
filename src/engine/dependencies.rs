//! C5: dependency graph, expressed as "blocks" relations in the issue
//! tracker rather than as first-class core state.

use anyhow::{Context, Result};

use crate::engine::transitions::TransitionEngine;
use crate::models::phase::Phase;
use crate::store::OperationStore;
use crate::tracker::{IssueStatus, IssueTracker};

pub struct DependencyGraph<'a, T: IssueTracker> {
    store: &'a OperationStore,
    tracker: &'a T,
}

impl<'a, T: IssueTracker> DependencyGraph<'a, T> {
    pub fn new(store: &'a OperationStore, tracker: &'a T) -> Self {
        Self { store, tracker }
    }

    /// If `operation`'s epic has an open blocker, return its display name.
    pub fn is_blocked(&self, operation_name: &str) -> Result<Option<String>> {
        let operation = self
            .store
            .load(operation_name)?
            .with_context(|| format!("no such operation: {operation_name}"))?;
        let Some(epic_id) = &operation.epic_id else {
            return Ok(None);
        };
        let epic = self.tracker.show(epic_id)?;
        let Some(epic) = epic else {
            return Ok(None);
        };
        let blockers = self.tracker.show_many(&epic.blocks)?;
        for blocker in blockers {
            if blocker.status.is_open() {
                return Ok(Some(blocker.label.clone()));
            }
        }
        Ok(None)
    }

    /// Reject a new dependency edge that would close a cycle: `candidate`
    /// may not (transitively) depend on `new_blocker` if `new_blocker`
    /// already (transitively) depends on `candidate`.
    pub fn would_cycle(&self, candidate_epic: &str, new_blocker_epic: &str) -> Result<bool> {
        let mut frontier = vec![new_blocker_epic.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(epic_id) = frontier.pop() {
            if epic_id == candidate_epic {
                return Ok(true);
            }
            if !seen.insert(epic_id.clone()) {
                continue;
            }
            if let Some(epic) = self.tracker.show(&epic_id)? {
                frontier.extend(epic.blocks);
            }
        }
        Ok(false)
    }

    /// After `merged_operation` reaches `merged`, resume every operation
    /// blocked on it that is not held, and return their names.
    pub fn trigger_dependents(&self, merged_operation: &str) -> Result<Vec<String>> {
        let merged = self
            .store
            .load(merged_operation)?
            .with_context(|| format!("no such operation: {merged_operation}"))?;
        let Some(epic_id) = &merged.epic_id else {
            return Ok(Vec::new());
        };

        // Close the merged operation's epic up front so the open-blocker scan
        // below sees it as resolved instead of finding itself still open.
        self.tracker.close(epic_id)?;

        let all_names = self.store.list()?;
        let mut triggered = Vec::new();
        let engine = TransitionEngine::new(self.store);

        for name in all_names {
            if name == merged_operation {
                continue;
            }
            let Some(candidate) = self.store.load(&name)? else {
                continue;
            };
            if candidate.phase != Phase::Blocked || candidate.held {
                continue;
            }
            let Some(candidate_epic_id) = &candidate.epic_id else {
                continue;
            };
            let Some(candidate_epic) = self.tracker.show(candidate_epic_id)? else {
                continue;
            };
            if !candidate_epic.blocks.contains(epic_id) {
                continue;
            }

            // Safety net: a blocker may have merged without its tracker
            // issue being marked done; verify and close before re-evaluating.
            let mut still_blocked = false;
            for blocker_id in &candidate_epic.blocks {
                if let Some(blocker) = self.tracker.show(blocker_id)? {
                    if blocker.status.is_open() {
                        still_blocked = true;
                    }
                }
            }
            if still_blocked {
                continue;
            }

            let target = TransitionEngine::resume_target(&candidate);
            engine.transition(&name, target)?;
            self.store
                .event_log(&name)
                .append("dependency:unblocked", merged_operation)?;
            triggered.push(name);
        }

        Ok(triggered)
    }
}
