//! C3: per-operation state documents backed by the atomic store, with
//! schema migration applied transparently on read.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::Config;
use crate::fs::atomic_store::{AtomicStore, StorePolicy};
use crate::models::operation::{Operation, OperationKind};
use crate::store::event_log::EventLog;
use crate::store::schema;

fn name_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap())
}

pub struct OperationStore {
    config: Config,
    store: AtomicStore,
}

impl OperationStore {
    pub fn new(config: Config) -> Self {
        let policy = StorePolicy {
            lock_retries: config.lock_retry_budget,
            lock_backoff_base: config.lock_retry_backoff_base,
        };
        Self {
            config,
            store: AtomicStore::new(policy),
        }
    }

    pub fn create(&self, name: &str, kind: OperationKind) -> Result<Operation> {
        if !name_pattern().is_match(name) {
            bail!("operation name '{name}' must be lowercase alphanumeric with hyphens, starting with a letter or digit");
        }
        let operation = Operation::new(name, kind);
        let path = self.config.operation_state_path(name);
        self.store.write(&path, &operation)?;
        self.event_log(name).append("operation:created", name)?;
        Ok(operation)
    }

    pub fn load(&self, name: &str) -> Result<Option<Operation>> {
        let path = self.config.operation_state_path(name);
        let Some(raw): Option<serde_json::Value> = self.store.read(&path)? else {
            return Ok(None);
        };
        let (migrated, changed) = schema::migrate(raw)?;
        if changed {
            self.store.write(&path, &migrated)?;
            let version = migrated
                .get("_schema_version")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            self.event_log(name)
                .append("schema:migrated", &format!("schema_version={version}"))?;
        }
        let operation: Operation = serde_json::from_value(migrated)?;
        Ok(Some(operation))
    }

    pub fn save(&self, operation: &Operation) -> Result<()> {
        let path = self.config.operation_state_path(&operation.name);
        self.store.write(&path, operation)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let dirs = self.store.list_dirs(&self.config.operations_dir())?;
        Ok(dirs
            .into_iter()
            .filter_map(|d| d.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        self.store.delete(&self.config.operation_state_path(name))
    }

    pub fn event_log(&self, name: &str) -> EventLog {
        EventLog::new(
            &self.config.operation_log_dir(name),
            self.config.event_log_max_bytes,
            self.config.event_log_generations,
        )
    }

    pub fn state_path(&self, name: &str) -> PathBuf {
        self.config.operation_state_path(name)
    }
}
