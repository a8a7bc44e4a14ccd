pub mod exit_contract;
pub mod session;
pub mod supervisor;

pub use session::{session_name_for, spawn, SpawnedSession};
pub use supervisor::{Supervisor, SupervisorAction};

use crate::engine::readiness::SessionLookup;
use crate::store::OperationStore;

/// A [`SessionLookup`] backed by real tmux session queries. The operation's
/// recorded `session_name` is the source of truth for which tmux session to
/// query; an operation with no recorded session is never active.
pub struct TmuxSessionLookup<'a> {
    operations: &'a OperationStore,
}

impl<'a> TmuxSessionLookup<'a> {
    pub fn new(operations: &'a OperationStore) -> Self {
        Self { operations }
    }
}

impl<'a> SessionLookup for TmuxSessionLookup<'a> {
    fn is_session_active(&self, operation: &str) -> bool {
        let Ok(Some(op)) = self.operations.load(operation) else {
            return false;
        };
        let Some(session_name) = op.session_name else {
            return false;
        };
        session::session_is_running(&session_name).unwrap_or(false)
            && session::is_agent_running(&session_name).unwrap_or(false)
    }
}
