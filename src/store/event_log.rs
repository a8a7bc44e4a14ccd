//! Append-only, line-oriented event log for one operation, with rotation.
//!
//! Format: `[YYYY-MM-DDTHH:MM:SSZ] <event>: <details>`. Rotation keeps up to
//! `generations` numbered backups (`events.log.1` is most recent).

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::fs::locking::locked_append;

pub struct EventLog {
    path: PathBuf,
    max_bytes: u64,
    generations: u32,
}

impl EventLog {
    pub fn new(dir: &Path, max_bytes: u64, generations: u32) -> Self {
        Self {
            path: dir.join("events.log"),
            max_bytes,
            generations,
        }
    }

    pub fn append(&self, event: &str, details: &str) -> Result<()> {
        self.rotate_if_needed()?;
        let line = format!(
            "[{}] {event}: {details}",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        );
        locked_append(&self.path, &line)
    }

    fn rotate_if_needed(&self) -> Result<()> {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return Ok(());
        };
        if meta.len() < self.max_bytes {
            return Ok(());
        }

        for gen in (1..self.generations).rev() {
            let from = self.generation_path(gen);
            let to = self.generation_path(gen + 1);
            if from.exists() {
                std::fs::rename(&from, &to)
                    .with_context(|| format!("Failed to rotate {}", from.display()))?;
            }
        }
        let first = self.generation_path(1);
        std::fs::rename(&self.path, &first)
            .with_context(|| format!("Failed to rotate {}", self.path.display()))?;
        Ok(())
    }

    fn generation_path(&self, gen: u32) -> PathBuf {
        self.path.with_extension(format!("log.{gen}"))
    }

    pub fn read_current(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    /// Every rotated generation plus the current file, oldest first, for
    /// operators reconstructing an operation's full event history.
    pub fn read_history(&self) -> Result<String> {
        let pattern = format!("{}.*", self.path.display());
        let mut generations: Vec<(u32, PathBuf)> = glob::glob(&pattern)
            .context("invalid event log rotation glob")?
            .filter_map(|entry| entry.ok())
            .filter_map(|path| {
                let gen: u32 = path.extension()?.to_str()?.parse().ok()?;
                Some((gen, path))
            })
            .collect();
        generations.sort_by(|a, b| b.0.cmp(&a.0));

        let mut combined = String::new();
        for (_, path) in generations {
            combined.push_str(&std::fs::read_to_string(&path).unwrap_or_default());
        }
        combined.push_str(&self.read_current()?);
        Ok(combined)
    }
}
