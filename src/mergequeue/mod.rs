pub mod daemon;
pub mod git_ops;

pub use daemon::{claim_singleton, release_singleton, DaemonStatus, MergeDaemon, WorkspaceConfig};
