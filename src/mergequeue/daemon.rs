//! C8: the merge queue daemon. A single-consumer poll loop enforced as a
//! process-wide singleton by a PID file, following the same
//! read-pid/check-alive/take-over pattern used for detecting stale locks.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::engine::dependencies::DependencyGraph;
use crate::engine::readiness::{is_merge_ready, stale_reason, NotReady, SessionLookup, StaleReason};
use crate::engine::transitions::TransitionEngine;
use crate::error::CoreError;
use crate::mergequeue::git_ops;
use crate::models::phase::Phase;
use crate::models::queue::{QueueEntry, QueueStatus};
use crate::notify::NotificationLog;
use crate::store::{OperationStore, QueueStore};
use crate::tracker::IssueTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    NotRunning,
    Running,
}

/// Parameters specific to the shared git workspace the daemon advances;
/// distinct from the document-layout `Config`.
pub struct WorkspaceConfig {
    pub repo_root: PathBuf,
    pub remote: String,
    pub shared_branch: String,
    pub require_remote_verify: bool,
}

pub struct MergeDaemon<'a, T: IssueTracker, S: SessionLookup> {
    config: &'a Config,
    workspace: &'a WorkspaceConfig,
    operations: &'a OperationStore,
    queue: &'a QueueStore,
    tracker: &'a T,
    sessions: &'a S,
    notifications: NotificationLog,
}

pub fn pid_path(config: &Config) -> PathBuf {
    config.daemon_pid_path()
}

pub fn check_status(config: &Config) -> DaemonStatus {
    let path = pid_path(config);
    match std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
    {
        Some(pid) if crate::process::is_process_alive(pid) => DaemonStatus::Running,
        Some(_) => {
            std::fs::remove_file(&path).ok();
            DaemonStatus::NotRunning
        }
        None => DaemonStatus::NotRunning,
    }
}

/// Claim the singleton by writing our own pid. Fails if another live
/// process already holds it.
pub fn claim_singleton(config: &Config) -> Result<()> {
    if check_status(config) == DaemonStatus::Running {
        anyhow::bail!("merge daemon already running");
    }
    let path = pid_path(config);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, std::process::id().to_string())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn release_singleton(config: &Config) {
    std::fs::remove_file(pid_path(config)).ok();
}

impl<'a, T: IssueTracker, S: SessionLookup> MergeDaemon<'a, T, S> {
    pub fn new(
        config: &'a Config,
        workspace: &'a WorkspaceConfig,
        operations: &'a OperationStore,
        queue: &'a QueueStore,
        tracker: &'a T,
        sessions: &'a S,
    ) -> Self {
        Self {
            config,
            workspace,
            operations,
            queue,
            tracker,
            sessions,
            notifications: NotificationLog::new(&config.build_root),
        }
    }

    /// Run poll cycles until `should_stop` returns true, sleeping
    /// `config.poll_interval` between cycles.
    pub fn run<F: Fn() -> bool>(&self, should_stop: F) -> Result<()> {
        while !should_stop() {
            self.cycle()?;
            std::thread::sleep(self.config.poll_interval);
        }
        Ok(())
    }

    /// A single poll cycle: retry-gate, resume-gate, cleanup, dispatch, and
    /// (if an entry was claimed) merge execution.
    pub fn cycle(&self) -> Result<()> {
        self.retry_gate()?;
        self.resume_gate()?;
        self.cleanup_pass()?;
        if let Some(entry) = self.dispatch_pass()? {
            self.execute_merge(&entry)?;
        }
        Ok(())
    }

    fn retry_gate(&self) -> Result<()> {
        let engine = TransitionEngine::new(self.operations);
        for entry in self.queue.list()? {
            if entry.status == QueueStatus::Conflict && !entry.conflict_retried {
                self.queue.mark_conflict_retried(&entry.operation)?;
                if let Some(operation) = self.operations.load(&entry.operation)? {
                    if operation.phase == Phase::Conflict {
                        engine.transition(&entry.operation, Phase::PendingMerge)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Entries parked `resumed` by a prior dispatch pass because their
    /// operation was still blocked. Once the blocker has cleared, move them
    /// back to `pending` so `dispatch_pass` considers them again.
    fn resume_gate(&self) -> Result<()> {
        let dependents = DependencyGraph::new(self.operations, self.tracker);
        for entry in self.queue.list()? {
            if entry.status == QueueStatus::Resumed && dependents.is_blocked(&entry.operation)?.is_none() {
                self.queue.requeue(&entry.operation)?;
            }
        }
        Ok(())
    }

    fn cleanup_pass(&self) -> Result<()> {
        let engine = TransitionEngine::new(self.operations);
        for entry in self.queue.list()? {
            if entry.status != QueueStatus::Pending {
                continue;
            }
            let Some(operation) = self.operations.load(&entry.operation)? else {
                continue;
            };
            let branch_remote = operation
                .branch
                .as_ref()
                .and_then(|b| {
                    git_ops::branch_exists_remote(&self.workspace.repo_root, &self.workspace.remote, b)
                        .ok()
                });
            match stale_reason(&operation, branch_remote) {
                Some(StaleReason::AlreadyMerged) => {
                    self.queue.remove(&entry.operation)?;
                }
                Some(StaleReason::BranchVanished) => {
                    self.queue.remove(&entry.operation)?;
                    if !operation.phase.is_terminal() {
                        engine.transition(&entry.operation, Phase::Cancelled)?;
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    fn dispatch_pass(&self) -> Result<Option<QueueEntry>> {
        loop {
            let Some(entry) = self.queue.next_pending()? else {
                return Ok(None);
            };
            let Some(operation) = self.operations.load(&entry.operation)? else {
                self.queue.remove(&entry.operation)?;
                continue;
            };

            let dependents = DependencyGraph::new(self.operations, self.tracker);
            if dependents.is_blocked(&entry.operation)?.is_some() {
                self.queue.update_status(&entry.operation, QueueStatus::Resumed)?;
                return Ok(None);
            }

            match is_merge_ready(&operation, self.tracker, self.sessions)? {
                Ok(()) => {
                    self.queue
                        .update_status(&entry.operation, QueueStatus::Processing)?;
                    return Ok(Some(entry));
                }
                Err(reason) => {
                    tracing::info!(operation = %entry.operation, %reason, "merge not ready, skipping");
                    return Ok(None);
                }
            }
        }
    }

    fn execute_merge(&self, entry: &QueueEntry) -> Result<()> {
        let engine = TransitionEngine::new(self.operations);
        let result = self.try_merge(entry);

        match result {
            Ok(commit) => {
                self.queue
                    .update_status(&entry.operation, QueueStatus::Completed)?;
                engine.merge(&entry.operation, commit)?;
                let deps = DependencyGraph::new(self.operations, self.tracker);
                deps.trigger_dependents(&entry.operation)?;
                if let Some(operation) = self.operations.load(&entry.operation)? {
                    if let Some(branch) = &operation.branch {
                        git_ops::delete_remote_branch(
                            &self.workspace.repo_root,
                            &self.workspace.remote,
                            branch,
                        )
                        .ok();
                    }
                }
                self.notifications.record(
                    "merge completed",
                    &format!("{} merged successfully", entry.operation),
                )?;
                Ok(())
            }
            Err(e) => {
                if let Some(CoreError::MergeConflict { .. }) = e.downcast_ref::<CoreError>() {
                    self.queue
                        .update_status(&entry.operation, QueueStatus::Conflict)?;
                    engine.transition(&entry.operation, Phase::Conflict)?;
                } else {
                    self.queue
                        .update_status(&entry.operation, QueueStatus::Failed)?;
                    engine.fail(&entry.operation, e.to_string())?;
                }
                self.notifications.record(
                    "merge failed",
                    &format!("{}: {e}", entry.operation),
                )?;
                Ok(())
            }
        }
    }

    fn try_merge(&self, entry: &QueueEntry) -> Result<String> {
        let repo_root = &self.workspace.repo_root;
        let remote = &self.workspace.remote;
        let shared = &self.workspace.shared_branch;

        git_ops::fetch(repo_root, remote)?;
        git_ops::checkout(repo_root, shared)?;
        git_ops::reset_hard(repo_root, &format!("{remote}/{shared}"))?;

        let operation = self
            .operations
            .load(&entry.operation)?
            .with_context(|| format!("no such operation: {}", entry.operation))?;
        let branch = operation
            .branch
            .clone()
            .context("operation has no branch to merge")?;

        if git_ops::would_conflict(repo_root, shared, &branch).unwrap_or(false) {
            let files = git_ops::conflicting_files(repo_root).unwrap_or_default();
            return Err(CoreError::MergeConflict {
                operation: entry.operation.clone(),
                files,
            }
            .into());
        }

        let outcome = git_ops::integrate(repo_root, shared, &branch)?;
        let commit = match outcome {
            git_ops::IntegrationOutcome::FastForward { commit }
            | git_ops::IntegrationOutcome::RebaseThenFastForward { commit }
            | git_ops::IntegrationOutcome::MergeCommit { commit } => commit,
        };

        git_ops::push_with_retry(repo_root, remote, shared, self.config.push_retries)?;
        git_ops::verify_merged(
            repo_root,
            remote,
            shared,
            &commit,
            self.workspace.require_remote_verify,
            self.config.verify_retries,
        )?;

        Ok(commit)
    }
}
