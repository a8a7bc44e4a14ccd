//! C1: read/modify/write JSON documents under an advisory per-document lock,
//! with crash-safe atomic replacement.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;
use crate::fs::doc_lock::DocLock;
use crate::fs::locking::{locked_read, locked_write};

/// Shared lock/retry policy for the store; distinct from `crate::Config`
/// so the store has no dependency on the rest of the crate's config shape.
#[derive(Debug, Clone, Copy)]
pub struct StorePolicy {
    pub lock_retries: u32,
    pub lock_backoff_base: Duration,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            lock_retries: 20,
            lock_backoff_base: Duration::from_millis(100),
        }
    }
}

pub struct AtomicStore {
    policy: StorePolicy,
}

impl AtomicStore {
    pub fn new(policy: StorePolicy) -> Self {
        Self { policy }
    }

    /// Read and parse the document at `path`. Fails with `CoreError::Corrupt`
    /// if the file exists but does not parse.
    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = locked_read(path).with_context(|| format!("io error at {}", path.display()))?;
        let value = serde_json::from_str(&raw).map_err(|e| CoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    /// Replace the document at `path` wholesale with `value`.
    pub fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let _lock = DocLock::acquire(path, self.policy.lock_retries, self.policy.lock_backoff_base)?;
        let raw = serde_json::to_string_pretty(value).context("Failed to serialize document")?;
        locked_write(path, &raw)
    }

    /// Read-modify-write under a single lock acquisition: `f` receives the
    /// current document (or `Value::Null` if absent) and returns the new
    /// document. The whole cycle is atomic with respect to other callers
    /// using this store against the same path.
    pub fn update<F>(&self, path: &Path, f: F) -> Result<Value>
    where
        F: FnOnce(Value) -> Result<Value>,
    {
        let _lock = DocLock::acquire(path, self.policy.lock_retries, self.policy.lock_backoff_base)?;
        let current = if path.exists() {
            let raw =
                locked_read(path).with_context(|| format!("io error at {}", path.display()))?;
            serde_json::from_str(&raw).map_err(|e| CoreError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            Value::Null
        };
        let updated = f(current)?;
        let raw = serde_json::to_string_pretty(&updated).context("Failed to serialize document")?;
        locked_write(path, &raw)?;
        Ok(updated)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    pub fn delete(&self, path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        let lock_path = path.with_file_name(format!(
            "{}.lock",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        std::fs::remove_file(&lock_path).ok();
        Ok(())
    }

    pub fn list_dirs(&self, parent: &Path) -> Result<Vec<PathBuf>> {
        if !parent.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(parent)
            .with_context(|| format!("Failed to list {}", parent.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.path());
            }
        }
        out.sort();
        Ok(out)
    }
}
