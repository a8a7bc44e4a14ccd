//! Per-document advisory lock with stale-holder detection.
//!
//! A lock is a file at `<document>.lock` holding `pid=<n>\ntimestamp=<rfc3339>`.
//! Acquisition retries with exponential backoff up to a configured budget; if
//! the recorded pid is not alive, the lock is broken and retaken immediately.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;
use crate::process::is_process_alive;

pub struct DocLock {
    lock_path: PathBuf,
    held: bool,
}

impl DocLock {
    /// Acquire the lock for `doc_path`, retrying up to `retries` times with
    /// doubling backoff starting at `backoff_base`. A lock whose recorded
    /// owner process is no longer alive is broken immediately, regardless of
    /// age.
    pub fn acquire(
        doc_path: &Path,
        retries: u32,
        backoff_base: Duration,
    ) -> Result<Self> {
        let lock_path = lock_path_for(doc_path);
        let mut delay = backoff_base;

        for attempt in 0..=retries {
            match Self::try_acquire(&lock_path) {
                Ok(lock) => return Ok(lock),
                Err(_) if attempt < retries => {
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                Err(_) => {
                    return Err(CoreError::LockContention {
                        path: doc_path.to_path_buf(),
                        retries,
                    }
                    .into())
                }
            }
        }
        unreachable!("loop always returns")
    }

    fn try_acquire(lock_path: &Path) -> Result<Self> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                let pid = std::process::id();
                let timestamp = chrono::Utc::now().to_rfc3339();
                writeln!(file, "pid={pid}")?;
                writeln!(file, "timestamp={timestamp}")?;
                file.sync_all().ok();
                Ok(Self {
                    lock_path: lock_path.to_path_buf(),
                    held: true,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if Self::holder_is_dead(lock_path) {
                    fs::remove_file(lock_path).ok();
                    Self::try_acquire(lock_path)
                } else {
                    Err(anyhow::anyhow!("lock held by a live process"))
                }
            }
            Err(e) => Err(e).context("Failed to create lock file"),
        }
    }

    fn holder_is_dead(lock_path: &Path) -> bool {
        let Ok(contents) = fs::read_to_string(lock_path) else {
            return true;
        };
        let pid = contents
            .lines()
            .find_map(|line| line.strip_prefix("pid="))
            .and_then(|s| s.parse::<u32>().ok());
        match pid {
            Some(pid) => !is_process_alive(pid),
            None => true,
        }
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.held {
            fs::remove_file(&self.lock_path).ok();
            self.held = false;
        }
    }
}

impl Drop for DocLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn lock_path_for(doc_path: &Path) -> PathBuf {
    let file_name = doc_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "doc".to_string());
    doc_path.with_file_name(format!("{file_name}.lock"))
}
