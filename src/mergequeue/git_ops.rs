//! Git operations the merge daemon needs, shelled via `git` the way the rest
//! of this codebase talks to git: no git library, just `Command` plus
//! exit-status/output parsing.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

use crate::error::CoreError;

/// Default ceiling on any single network-touching git invocation (fetch,
/// push). A hung credential prompt or a dead remote must not wedge the
/// merge daemon's poll loop forever.
const NETWORK_TIMEOUT: Duration = Duration::from_secs(120);

fn git(repo_root: &Path, args: &[&str]) -> Result<std::process::Output> {
    Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()
        .with_context(|| format!("failed to run git {}", args.join(" ")))
}

/// Like `git`, but kills the process and returns an error instead of
/// blocking forever if it outlives `timeout`. Used for fetch/push, the only
/// operations here that talk to a remote.
fn git_with_timeout(repo_root: &Path, args: &[&str], timeout: Duration) -> Result<std::process::Output> {
    let mut child = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn git {}", args.join(" ")))?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });

    let status = match child
        .wait_timeout(timeout)
        .context("failed to wait on git process")?
    {
        Some(status) => status,
        None => {
            child.kill().ok();
            child.wait().ok();
            bail!("git {} timed out after {:?}", args.join(" "), timeout);
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    Ok(std::process::Output {
        status,
        stdout,
        stderr,
    })
}

pub fn fetch(repo_root: &Path, remote: &str) -> Result<()> {
    let output = git_with_timeout(repo_root, &["fetch", remote], NETWORK_TIMEOUT)?;
    if !output.status.success() {
        bail!(
            "git fetch failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

pub fn checkout(repo_root: &Path, branch: &str) -> Result<()> {
    let output = git(repo_root, &["checkout", branch])?;
    if !output.status.success() {
        bail!(
            "git checkout {branch} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

pub fn reset_hard(repo_root: &Path, reference: &str) -> Result<()> {
    let output = git(repo_root, &["reset", "--hard", reference])?;
    if !output.status.success() {
        bail!(
            "git reset --hard {reference} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

pub fn branch_exists_remote(repo_root: &Path, remote: &str, branch: &str) -> Result<bool> {
    let output = git(
        repo_root,
        &["ls-remote", "--exit-code", "--heads", remote, branch],
    )?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(2) => Ok(false),
        _ => bail!(
            "git ls-remote failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

pub fn current_commit(repo_root: &Path, reference: &str) -> Result<String> {
    let output = git(repo_root, &["rev-parse", reference])?;
    if !output.status.success() {
        bail!(
            "git rev-parse {reference} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn is_ancestor(repo_root: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
    let output = git(
        repo_root,
        &["merge-base", "--is-ancestor", ancestor, descendant],
    )?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => bail!(
            "git merge-base --is-ancestor failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

/// Cheap pre-check: would merging `branch` into the current HEAD conflict?
/// Uses `merge-tree` so it never touches the working tree.
pub fn would_conflict(repo_root: &Path, base: &str, branch: &str) -> Result<bool> {
    let output = git(repo_root, &["merge-tree", base, branch])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.contains("<<<<<<<"))
}

pub fn conflicting_files(repo_root: &Path) -> Result<Vec<String>> {
    let output = git(repo_root, &["diff", "--name-only", "--diff-filter=U"])?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

pub fn abort_merge(repo_root: &Path) -> Result<()> {
    git(repo_root, &["merge", "--abort"]).map(|_| ())
}

pub fn abort_rebase(repo_root: &Path) -> Result<()> {
    git(repo_root, &["rebase", "--abort"]).map(|_| ())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationOutcome {
    FastForward { commit: String },
    RebaseThenFastForward { commit: String },
    MergeCommit { commit: String },
}

/// Ordered integration strategy (spec's merge algorithm): first attempt
/// fast-forward; on non-fast-forward, rebase the operation branch onto the
/// shared branch and retry fast-forward; on rebase failure, abort the
/// rebase and attempt a merge commit.
pub fn integrate(repo_root: &Path, shared_branch: &str, operation_branch: &str) -> Result<IntegrationOutcome> {
    checkout(repo_root, shared_branch)?;

    let ff = git(
        repo_root,
        &["merge", "--ff-only", operation_branch],
    )?;
    if ff.status.success() {
        let commit = current_commit(repo_root, "HEAD")?;
        return Ok(IntegrationOutcome::FastForward { commit });
    }

    checkout(repo_root, operation_branch)?;
    let rebase = git(repo_root, &["rebase", shared_branch])?;
    if rebase.status.success() {
        checkout(repo_root, shared_branch)?;
        let ff2 = git(repo_root, &["merge", "--ff-only", operation_branch])?;
        if ff2.status.success() {
            let commit = current_commit(repo_root, "HEAD")?;
            return Ok(IntegrationOutcome::RebaseThenFastForward { commit });
        }
        bail!("fast-forward retry after rebase unexpectedly failed");
    }

    abort_rebase(repo_root).ok();
    checkout(repo_root, shared_branch)?;

    let message = format!("Merge {operation_branch} into {shared_branch}");
    let merge = Command::new("git")
        .args(["merge", "--no-ff", "-m", &message, operation_branch])
        .current_dir(repo_root)
        .output()
        .context("failed to run git merge --no-ff")?;

    if merge.status.success() {
        let commit = current_commit(repo_root, "HEAD")?;
        return Ok(IntegrationOutcome::MergeCommit { commit });
    }

    let stderr = String::from_utf8_lossy(&merge.stderr);
    let stdout = String::from_utf8_lossy(&merge.stdout);
    if stderr.contains("CONFLICT") || stdout.contains("CONFLICT") {
        let files = conflicting_files(repo_root)?;
        abort_merge(repo_root).ok();
        return Err(CoreError::MergeConflict {
            operation: operation_branch.to_string(),
            files,
        }
        .into());
    }

    bail!("git merge --no-ff failed: {stderr}");
}

/// Push `shared_branch` to `remote`, retrying with growing delays.
pub fn push_with_retry(
    repo_root: &Path,
    remote: &str,
    shared_branch: &str,
    retries: u32,
) -> Result<()> {
    let mut delay = Duration::from_secs(2);
    for attempt in 0..=retries {
        let output = git_with_timeout(repo_root, &["push", remote, shared_branch], NETWORK_TIMEOUT)?;
        if output.status.success() {
            return Ok(());
        }
        if attempt < retries {
            std::thread::sleep(delay);
            delay *= 2;
        } else {
            return Err(CoreError::PushFailed {
                branch: shared_branch.to_string(),
                retries,
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            }
            .into());
        }
    }
    unreachable!("loop always returns")
}

/// Verify `commit` is an ancestor of the local shared branch and, if
/// `require_remote`, of the remote shared branch too (fetching fresh each
/// retry).
pub fn verify_merged(
    repo_root: &Path,
    remote: &str,
    shared_branch: &str,
    commit: &str,
    require_remote: bool,
    retries: u32,
) -> Result<()> {
    for attempt in 0..=retries {
        if require_remote {
            fetch(repo_root, remote).ok();
        }
        let local_ok = is_ancestor(repo_root, commit, shared_branch).unwrap_or(false);
        let remote_ok = if require_remote {
            let remote_ref = format!("{remote}/{shared_branch}");
            is_ancestor(repo_root, commit, &remote_ref).unwrap_or(false)
        } else {
            true
        };
        if local_ok && remote_ok {
            return Ok(());
        }
        if attempt < retries {
            std::thread::sleep(Duration::from_secs(2));
        }
    }
    Err(CoreError::VerifyFailed {
        commit: commit.to_string(),
        target: shared_branch.to_string(),
        retries,
    }
    .into())
}

pub fn delete_remote_branch(repo_root: &Path, remote: &str, branch: &str) -> Result<()> {
    git(repo_root, &["push", remote, "--delete", branch]).map(|_| ())
}
