//! C11: builds display tuples from the operation store, the merge queue,
//! and a session-liveness source, batching tracker lookups through an
//! in-memory cache so a full status refresh costs at most two tracker
//! round trips regardless of operation count.

use anyhow::Result;
use std::collections::HashMap;

use crate::engine::readiness::SessionLookup;
use crate::models::operation::Operation;
use crate::models::phase::Phase;
use crate::models::queue::QueueStatus;
use crate::store::{OperationStore, QueueStore};
use crate::tracker::{Issue, IssueTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Green,
    Yellow,
    Red,
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeIcon {
    None,
    Queued,
    Merging,
    Conflict,
    Merged,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub name: String,
    pub display_phase: String,
    pub color: Color,
    pub merge_icon: MergeIcon,
    pub blocked_on: Option<String>,
}

pub struct StatusProjector<'a, T: IssueTracker, S: SessionLookup> {
    operations: &'a OperationStore,
    queue: &'a QueueStore,
    tracker: &'a T,
    sessions: &'a S,
}

impl<'a, T: IssueTracker, S: SessionLookup> StatusProjector<'a, T, S> {
    pub fn new(
        operations: &'a OperationStore,
        queue: &'a QueueStore,
        tracker: &'a T,
        sessions: &'a S,
    ) -> Self {
        Self {
            operations,
            queue,
            tracker,
            sessions,
        }
    }

    pub fn build(&self) -> Result<Vec<StatusRow>> {
        let names = self.operations.list()?;
        let queue_entries = self.queue.list()?;
        let queue_by_op: HashMap<_, _> = queue_entries
            .iter()
            .map(|e| (e.operation.clone(), e.status))
            .collect();

        let operations: Vec<Operation> = names
            .iter()
            .filter_map(|n| self.operations.load(n).ok().flatten())
            .collect();

        let epic_ids: Vec<String> = operations.iter().filter_map(|o| o.epic_id.clone()).collect();
        let epics = self.tracker.show_many(&epic_ids)?;
        let epic_by_id: HashMap<_, _> = epics.into_iter().map(|e| (e.id.clone(), e)).collect();

        let blocker_ids: Vec<String> = epic_by_id
            .values()
            .flat_map(|e| e.blocks.clone())
            .collect();
        let blockers = self.tracker.show_many(&blocker_ids)?;
        let blocker_by_id: HashMap<String, Issue> =
            blockers.into_iter().map(|b| (b.id.clone(), b)).collect();

        let mut rows = Vec::with_capacity(operations.len());
        for operation in operations {
            let queue_status = queue_by_op.get(&operation.name).copied();
            let blocked_on = epic_by_id
                .get(operation.epic_id.as_deref().unwrap_or_default())
                .and_then(|epic| {
                    epic.blocks
                        .iter()
                        .find_map(|id| blocker_by_id.get(id))
                        .filter(|b| b.status.is_open())
                        .map(|b| b.label.clone())
                });

            rows.push(StatusRow {
                color: color_for(&operation, queue_status, self.sessions),
                merge_icon: merge_icon_for(queue_status),
                display_phase: operation.phase.to_string(),
                blocked_on,
                name: operation.name,
            });
        }
        Ok(rows)
    }
}

fn color_for<S: SessionLookup>(
    operation: &Operation,
    queue_status: Option<QueueStatus>,
    sessions: &S,
) -> Color {
    if operation.held {
        return Color::Gray;
    }
    match operation.phase {
        Phase::Merged => Color::Green,
        Phase::Failed | Phase::Cancelled => Color::Red,
        Phase::Conflict => Color::Red,
        Phase::Executing if sessions.is_session_active(&operation.name) => Color::Green,
        _ => match queue_status {
            Some(QueueStatus::Failed) | Some(QueueStatus::Conflict) => Color::Red,
            Some(QueueStatus::Processing) => Color::Yellow,
            _ => Color::Yellow,
        },
    }
}

fn merge_icon_for(queue_status: Option<QueueStatus>) -> MergeIcon {
    match queue_status {
        None => MergeIcon::None,
        Some(QueueStatus::Pending) | Some(QueueStatus::Resumed) => MergeIcon::Queued,
        Some(QueueStatus::Processing) => MergeIcon::Merging,
        Some(QueueStatus::Conflict) => MergeIcon::Conflict,
        Some(QueueStatus::Completed) => MergeIcon::Merged,
        Some(QueueStatus::Failed) => MergeIcon::Failed,
    }
}
