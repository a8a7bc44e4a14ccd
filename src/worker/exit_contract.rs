//! C10: the session exit contract. The core publishes `done`/`incomplete`
//! scripts into each agent's working directory and answers the runtime's
//! stop-hook query with an approve/block decision.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DONE_SCRIPT: &str = "#!/bin/sh\ntouch .done-exit\nkill -TERM $PPID\n";
const INCOMPLETE_SCRIPT: &str = "#!/bin/sh\necho \"incomplete: $*\" >> .incomplete-reason\nkill -TERM $PPID\n";

const APPROVE_SUBSTRINGS: &[&str] = &[
    "auth",
    "login",
    "credential",
    "credit",
    "subscription",
    "billing",
    "payment",
];

pub fn install_scripts(session_dir: &Path) -> Result<()> {
    write_executable(&session_dir.join("done"), DONE_SCRIPT)?;
    write_executable(&session_dir.join("incomplete"), INCOMPLETE_SCRIPT)?;
    Ok(())
}

fn write_executable(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct StopHookInput {
    #[serde(default)]
    pub stop_hook_active: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum StopDecision {
    Approve,
    Block { reason: String },
}

pub struct WorktreeState {
    pub has_uncommitted_changes: bool,
}

/// Evaluate the stop-hook contract against the input and the worker's
/// current state. `open_issue_ids` lists issues still todo/in_progress for
/// this operation's plan label that are not covered by a note-without-fix
/// handoff.
pub fn evaluate_stop(
    input: &StopHookInput,
    open_issue_ids: &[String],
    worktree: &WorktreeState,
) -> StopDecision {
    if input.stop_hook_active {
        return StopDecision::Approve;
    }

    if let Some(reason) = &input.reason {
        let lower = reason.to_lowercase();
        if APPROVE_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
            return StopDecision::Approve;
        }
    }

    if !open_issue_ids.is_empty() {
        let listed: Vec<&String> = open_issue_ids.iter().take(3).collect();
        let ids = listed
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return StopDecision::Block {
            reason: format!("open issues remain: {ids}"),
        };
    }

    if worktree.has_uncommitted_changes {
        return StopDecision::Block {
            reason: "uncommitted changes in worktree; commit and push before exiting".to_string(),
        };
    }

    StopDecision::Approve
}
