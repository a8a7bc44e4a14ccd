//! Notification records.
//!
//! The core's job is only to write a notification record; actual delivery to
//! a human is an external collaborator. `NotificationLog` is that record
//! sink. `DesktopNotifier` is one concrete delivery mechanism (best-effort,
//! platform `Command` dispatch) that a caller may wire up to consume the log.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::fs::locking::locked_append;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub timestamp: chrono::DateTime<Utc>,
    pub title: String,
    pub body: String,
}

/// Append-only sink of notification records, one JSON object per line.
pub struct NotificationLog {
    path: PathBuf,
}

impl NotificationLog {
    pub fn new(build_root: &Path) -> Self {
        Self {
            path: build_root.join("notifications.log"),
        }
    }

    pub fn record(&self, title: &str, body: &str) -> Result<()> {
        let record = NotificationRecord {
            timestamp: Utc::now(),
            title: title.to_string(),
            body: body.to_string(),
        };
        let line = serde_json::to_string(&record)?;
        locked_append(&self.path, &line)
    }
}

/// Best-effort desktop delivery of a notification record. Failures are
/// logged, never propagated.
pub trait Notifier {
    fn deliver(&self, record: &NotificationRecord);
}

pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn deliver(&self, record: &NotificationRecord) {
        let result = if cfg!(target_os = "macos") {
            send_macos(&record.title, &record.body)
        } else {
            send_linux(&record.title, &record.body)
        };
        if let Err(e) = result {
            tracing::warn!("desktop notification failed: {e}");
        }
    }
}

fn send_linux(title: &str, body: &str) -> Result<(), String> {
    Command::new("notify-send")
        .arg("--urgency=critical")
        .arg("--app-name=v0")
        .arg(title)
        .arg(body)
        .output()
        .map_err(|e| format!("notify-send failed: {e}"))
        .and_then(|output| {
            if output.status.success() {
                Ok(())
            } else {
                Err(format!("notify-send exited with: {}", output.status))
            }
        })
}

fn send_macos(title: &str, body: &str) -> Result<(), String> {
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        body.replace('"', r#"\""#),
        title.replace('"', r#"\""#)
    );
    Command::new("osascript")
        .arg("-e")
        .arg(&script)
        .output()
        .map_err(|e| format!("osascript failed: {e}"))
        .and_then(|output| {
            if output.status.success() {
                Ok(())
            } else {
                Err(format!("osascript exited with: {}", output.status))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = NotificationLog::new(dir.path());
        log.record("merge failed", "op1 could not be merged").unwrap();
        let content = std::fs::read_to_string(dir.path().join("notifications.log")).unwrap();
        let parsed: NotificationRecord =
            serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.title, "merge failed");
    }

    #[test]
    fn multiple_records_append_as_separate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = NotificationLog::new(dir.path());
        log.record("a", "1").unwrap();
        log.record("b", "2").unwrap();
        let content = std::fs::read_to_string(dir.path().join("notifications.log")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
