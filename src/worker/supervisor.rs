//! C9: worker supervision — crash detection with a no-progress escalation
//! threshold, and restart backoff. Grounded in this codebase's general
//! failure-tracking shape: count consecutive failures, escalate at a
//! threshold, reset on progress.

use std::time::Duration;

use crate::notify::NotificationLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    /// No crash observed; nothing to do.
    Continue,
    /// Relaunch after sleeping for the given backoff.
    Relaunch { backoff: Duration },
    /// Two consecutive no-progress crashes; stop auto-relaunch.
    StopPoller,
}

pub struct Supervisor {
    worker_name: String,
    max_crash_count: u32,
    crash_count: u32,
    last_progress_marker: Option<String>,
}

impl Supervisor {
    pub fn new(worker_name: impl Into<String>, max_crash_count: u32) -> Self {
        Self {
            worker_name: worker_name.into(),
            max_crash_count,
            crash_count: 0,
            last_progress_marker: None,
        }
    }

    /// Called on every poll tick with whether the session is currently
    /// running and a cheap fingerprint of the work list (e.g. a hash of
    /// tracked file mtimes). When the session has exited without the
    /// `done` flag, this decides whether to relaunch or escalate.
    pub fn observe(
        &mut self,
        session_alive: bool,
        exited_cleanly: bool,
        progress_marker: &str,
        notifications: &NotificationLog,
    ) -> SupervisorAction {
        if session_alive {
            self.last_progress_marker = Some(progress_marker.to_string());
            return SupervisorAction::Continue;
        }

        if exited_cleanly {
            self.crash_count = 0;
            self.last_progress_marker = Some(progress_marker.to_string());
            return SupervisorAction::Continue;
        }

        let progressed = self
            .last_progress_marker
            .as_deref()
            .map(|prev| prev != progress_marker)
            .unwrap_or(true);

        if progressed {
            self.crash_count = 0;
            self.last_progress_marker = Some(progress_marker.to_string());
            return SupervisorAction::Relaunch {
                backoff: Duration::ZERO,
            };
        }

        self.crash_count += 1;

        if self.crash_count == 1 {
            notifications
                .record(
                    "worker crashed",
                    &format!("{} crashed with no progress", self.worker_name),
                )
                .ok();
        }

        if self.crash_count >= self.max_crash_count {
            notifications
                .record(
                    "worker stopped",
                    &format!(
                        "{} stopped after {} consecutive no-progress crashes",
                        self.worker_name, self.crash_count
                    ),
                )
                .ok();
            return SupervisorAction::StopPoller;
        }

        SupervisorAction::Relaunch {
            backoff: backoff_for(self.crash_count),
        }
    }

    pub fn crash_count(&self) -> u32 {
        self.crash_count
    }
}

/// `5 * 2^(count-1)` seconds, capped at 300.
fn backoff_for(crash_count: u32) -> Duration {
    let secs = 5u64.saturating_mul(1u64 << (crash_count.saturating_sub(1)).min(10));
    Duration::from_secs(secs.min(300))
}
