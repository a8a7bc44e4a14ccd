//! C9 session mechanics: spawns and tracks the managed, terminal-multiplexed
//! process an agent runs in. Grounded on this codebase's tmux backend —
//! detached session, pane-pid lookup, pipe-pane logging — narrowed to the
//! single `tmux` backend since the core has no native-PTY requirement.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use uuid::Uuid;

fn check_tmux_available() -> Result<()> {
    which::which("tmux")
        .map(|_| ())
        .map_err(|_| anyhow!("tmux is not installed; install it to spawn worker sessions"))
}

/// A freshly minted, collision-resistant session name scoped to `operation`.
pub fn session_name_for(operation: &str) -> String {
    format!("v0-{operation}-{}", Uuid::new_v4().simple())
}

pub struct SpawnedSession {
    pub name: String,
    pub log_path: PathBuf,
    pub pane_pid: Option<u32>,
}

/// Spawn `command` inside a fresh detached tmux session rooted at
/// `working_dir`, with the pane piped to `log_path`.
pub fn spawn(session_name: &str, working_dir: &Path, log_path: &Path, command: &str) -> Result<SpawnedSession> {
    check_tmux_available()?;

    if session_is_running(session_name)? {
        kill_session(session_name)?;
    }

    let create = Command::new("tmux")
        .args([
            "new-session",
            "-d",
            "-s",
            session_name,
            "-c",
            &working_dir.to_string_lossy(),
        ])
        .output()
        .context("failed to spawn tmux session")?;
    if !create.status.success() {
        return Err(anyhow!(
            "failed to create tmux session: {}",
            String::from_utf8_lossy(&create.stderr)
        ));
    }

    enable_pane_logging(session_name, log_path)?;
    send_command(session_name, command)?;

    Ok(SpawnedSession {
        name: session_name.to_string(),
        log_path: log_path.to_path_buf(),
        pane_pid: pane_pid(session_name)?,
    })
}

pub fn session_is_running(session_name: &str) -> Result<bool> {
    let output = Command::new("tmux")
        .args(["has-session", "-t", session_name])
        .output()
        .context("failed to query tmux session")?;
    Ok(output.status.success())
}

/// `true` when the pane's active process still looks like an agent runtime
/// (as opposed to an idle shell left behind after exit).
pub fn is_agent_running(session_name: &str) -> Result<bool> {
    let output = Command::new("tmux")
        .args(["display-message", "-t", session_name, "-p", "#{pane_current_command}"])
        .output()
        .context("failed to query tmux pane command")?;
    if !output.status.success() {
        return Ok(false);
    }
    let cmd = String::from_utf8_lossy(&output.stdout).trim().to_lowercase();
    Ok(cmd.contains("node") || cmd.contains("claude"))
}

pub fn pane_pid(session_name: &str) -> Result<Option<u32>> {
    let output = Command::new("tmux")
        .args(["list-panes", "-t", session_name, "-F", "#{pane_pid}"])
        .output()
        .context("failed to query tmux pane pid")?;
    if !output.status.success() {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.parse().context("pane pid was not numeric")?))
}

pub fn kill_session(session_name: &str) -> Result<()> {
    let output = Command::new("tmux")
        .args(["kill-session", "-t", session_name])
        .output()
        .context("failed to kill tmux session")?;
    if !output.status.success() {
        return Err(anyhow!(
            "failed to kill tmux session: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

fn enable_pane_logging(session_name: &str, log_path: &Path) -> Result<()> {
    let output = Command::new("tmux")
        .args([
            "pipe-pane",
            "-t",
            session_name,
            "-o",
            &format!("cat >> {}", log_path.display()),
        ])
        .output()
        .context("failed to enable pipe-pane logging")?;
    if !output.status.success() {
        return Err(anyhow!(
            "failed to enable pane logging: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

fn send_command(session_name: &str, command: &str) -> Result<()> {
    let output = Command::new("tmux")
        .args(["send-keys", "-t", session_name, command, "Enter"])
        .output()
        .context("failed to send command to tmux session")?;
    if !output.status.success() {
        return Err(anyhow!(
            "failed to send command: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}
