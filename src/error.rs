//! Typed error kinds for the core.
//!
//! Fallible steps that chain several collaborators (I/O, serialization,
//! subprocess calls) return `anyhow::Result` and attach a `CoreError` at the
//! call site where the kind is actually known, the way the rest of the crate
//! uses `anyhow::Context`. Callers that need to branch on kind recover it with
//! `anyhow::Error::downcast_ref::<CoreError>()`.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::phase::Phase;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("cannot transition {operation} from {from:?} to {to:?}")]
    InvalidTransition {
        operation: String,
        from: Phase,
        to: Phase,
    },

    #[error("{operation} is held")]
    Held { operation: String },

    #[error("could not acquire lock on {path} after {retries} attempts")]
    LockContention { path: PathBuf, retries: u32 },

    #[error("document at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("workspace problem at {path}: {reason}")]
    Workspace { path: PathBuf, reason: String },

    #[error("ref missing: {reference}")]
    RefMissing { reference: String },

    #[error("merge conflict in {operation}: {files:?}")]
    MergeConflict {
        operation: String,
        files: Vec<String>,
    },

    #[error("push of {branch} failed after {retries} attempts: {reason}")]
    PushFailed {
        branch: String,
        retries: u32,
        reason: String,
    },

    #[error("could not verify {commit} reached {target} after {retries} attempts")]
    VerifyFailed {
        commit: String,
        target: String,
        retries: u32,
    },

    #[error("agent session for {operation} crashed: {reason}")]
    AgentCrash { operation: String, reason: String },

    #[error("no progress after {crashes} consecutive crashes for {worker}")]
    NoProgress { worker: String, crashes: u32 },

    #[error("queue entry for {operation} is stale: {reason}")]
    StaleEntry { operation: String, reason: String },

    #[error("issue tracker call failed: {call}: {reason}")]
    Tracker { call: String, reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
