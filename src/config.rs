//! Layered configuration: hard-coded defaults, overridden by a TOML file,
//! overridden again by environment variables. Constructed once in `main`
//! and threaded by reference; library code never re-reads the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub build_root: PathBuf,
    pub poll_interval: Duration,
    pub supervisor_interval: Duration,
    pub lock_retry_budget: u32,
    pub lock_retry_backoff_base: Duration,
    pub lock_stale_timeout: Duration,
    pub max_conflict_retries: u32,
    pub idle_ticks: u32,
    pub max_crash_count: u32,
    pub push_retries: u32,
    pub verify_retries: u32,
    pub event_log_max_bytes: u64,
    pub event_log_generations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build_root: PathBuf::from(".v0"),
            poll_interval: Duration::from_secs(30),
            supervisor_interval: Duration::from_secs(5),
            lock_retry_budget: 20,
            lock_retry_backoff_base: Duration::from_millis(100),
            lock_stale_timeout: Duration::from_secs(300),
            max_conflict_retries: 1,
            idle_ticks: 6,
            max_crash_count: 2,
            push_retries: 3,
            verify_retries: 3,
            event_log_max_bytes: 1024 * 1024,
            event_log_generations: 3,
        }
    }
}

/// Mirrors `Config`, but every field optional, for partial TOML overrides.
#[derive(Debug, Deserialize, Default)]
struct FileOverrides {
    build_root: Option<PathBuf>,
    poll_interval_secs: Option<u64>,
    supervisor_interval_secs: Option<u64>,
    lock_retry_budget: Option<u32>,
    lock_retry_backoff_base_ms: Option<u64>,
    lock_stale_timeout_secs: Option<u64>,
    max_conflict_retries: Option<u32>,
    idle_ticks: Option<u32>,
    max_crash_count: Option<u32>,
    push_retries: Option<u32>,
    verify_retries: Option<u32>,
    event_log_max_bytes: Option<u64>,
    event_log_generations: Option<u32>,
}

impl Config {
    /// Load defaults, merge a TOML file over them if it exists, then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Config> {
        let mut config = Config::default();
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let overrides: FileOverrides = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.apply_overrides(overrides);
        }
        config.apply_env();
        Ok(config)
    }

    fn apply_overrides(&mut self, o: FileOverrides) {
        if let Some(v) = o.build_root {
            self.build_root = v;
        }
        if let Some(v) = o.poll_interval_secs {
            self.poll_interval = Duration::from_secs(v);
        }
        if let Some(v) = o.supervisor_interval_secs {
            self.supervisor_interval = Duration::from_secs(v);
        }
        if let Some(v) = o.lock_retry_budget {
            self.lock_retry_budget = v;
        }
        if let Some(v) = o.lock_retry_backoff_base_ms {
            self.lock_retry_backoff_base = Duration::from_millis(v);
        }
        if let Some(v) = o.lock_stale_timeout_secs {
            self.lock_stale_timeout = Duration::from_secs(v);
        }
        if let Some(v) = o.max_conflict_retries {
            self.max_conflict_retries = v;
        }
        if let Some(v) = o.idle_ticks {
            self.idle_ticks = v;
        }
        if let Some(v) = o.max_crash_count {
            self.max_crash_count = v;
        }
        if let Some(v) = o.push_retries {
            self.push_retries = v;
        }
        if let Some(v) = o.verify_retries {
            self.verify_retries = v;
        }
        if let Some(v) = o.event_log_max_bytes {
            self.event_log_max_bytes = v;
        }
        if let Some(v) = o.event_log_generations {
            self.event_log_generations = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("V0_BUILD_ROOT") {
            self.build_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("V0_POLL_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.poll_interval = Duration::from_secs(secs);
            }
        }
    }

    pub fn operations_dir(&self) -> PathBuf {
        self.build_root.join("operations")
    }

    pub fn operation_dir(&self, name: &str) -> PathBuf {
        self.operations_dir().join(name)
    }

    pub fn operation_state_path(&self, name: &str) -> PathBuf {
        self.operation_dir(name).join("state.json")
    }

    pub fn operation_log_dir(&self, name: &str) -> PathBuf {
        self.operation_dir(name).join("logs")
    }

    pub fn mergeq_dir(&self) -> PathBuf {
        self.build_root.join("mergeq")
    }

    pub fn queue_path(&self) -> PathBuf {
        self.mergeq_dir().join("queue.json")
    }

    pub fn queue_lock_path(&self) -> PathBuf {
        self.mergeq_dir().join(".queue.lock")
    }

    pub fn daemon_pid_path(&self) -> PathBuf {
        self.mergeq_dir().join("daemon.pid")
    }

    pub fn daemon_log_path(&self) -> PathBuf {
        self.mergeq_dir().join("daemon.log")
    }

    pub fn merge_lock_path(&self) -> PathBuf {
        self.build_root.join(".merge.lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.max_conflict_retries, 1);
        assert_eq!(config.max_crash_count, 2);
    }

    #[test]
    fn load_merges_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_crash_count = 5\nbuild_root = \"work\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_crash_count, 5);
        assert_eq!(config.build_root, PathBuf::from("work"));
        assert_eq!(config.max_conflict_retries, 1);
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_crash_count, Config::default().max_crash_count);
    }

    #[test]
    fn derives_document_paths_from_build_root() {
        let mut config = Config::default();
        config.build_root = PathBuf::from("/tmp/b");
        assert_eq!(
            config.operation_state_path("op1"),
            PathBuf::from("/tmp/b/operations/op1/state.json")
        );
        assert_eq!(config.queue_path(), PathBuf::from("/tmp/b/mergeq/queue.json"));
    }
}
