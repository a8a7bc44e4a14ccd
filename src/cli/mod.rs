//! Command surface: a thin `clap` dispatcher over the engine/store/daemon
//! collaborators. Kept deliberately small — the daemon and worker loops are
//! the long-running pieces; this module is the operator-facing front door.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::Config;
use crate::engine::dependencies::DependencyGraph;
use crate::engine::readiness::SessionLookup;
use crate::engine::transitions::TransitionEngine;
use crate::mergequeue::daemon::{self, MergeDaemon, WorkspaceConfig};
use crate::models::operation::OperationKind;
use crate::models::phase::Phase;
use crate::status::StatusProjector;
use crate::store::{OperationStore, QueueStore};
use crate::tracker::local::LocalTracker;
use crate::tracker::IssueTracker;
use crate::worker::TmuxSessionLookup;

#[derive(Parser)]
#[command(name = "v0", about = "Operation lifecycle state machine and merge queue daemon")]
pub struct Cli {
    #[arg(long, global = true, help = "path to config.toml")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage operations (create, move between phases, hold/resume).
    Operation {
        #[command(subcommand)]
        action: OperationAction,
    },
    /// Manage the merge queue.
    Merge {
        #[command(subcommand)]
        action: MergeAction,
    },
    /// Control the merge daemon process.
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
        #[arg(long, help = "repository root the daemon integrates merges in")]
        repo_root: Option<PathBuf>,
        #[arg(long, default_value = "origin")]
        remote: String,
        #[arg(long, default_value = "main")]
        shared_branch: String,
        #[arg(long, default_value_t = false)]
        require_remote_verify: bool,
    },
    /// Print a status table of all known operations.
    Status,
}

#[derive(Subcommand)]
pub enum OperationAction {
    Create {
        name: String,
        #[arg(long, value_enum, default_value = "feature")]
        kind: CliOperationKind,
        #[arg(long, help = "tracker epic id this operation belongs to")]
        epic_id: Option<String>,
        #[arg(long, help = "epic id that must not (transitively) depend on epic-id")]
        blocker_epic: Option<String>,
    },
    Transition {
        name: String,
        to: String,
    },
    Hold {
        name: String,
    },
    Resume {
        name: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum CliOperationKind {
    Feature,
    Fix,
    Chore,
}

impl From<CliOperationKind> for OperationKind {
    fn from(k: CliOperationKind) -> Self {
        match k {
            CliOperationKind::Feature => OperationKind::Feature,
            CliOperationKind::Fix => OperationKind::Fix,
            CliOperationKind::Chore => OperationKind::Chore,
        }
    }
}

#[derive(Subcommand)]
pub enum MergeAction {
    Enqueue {
        name: String,
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    Status,
}

#[derive(Subcommand)]
pub enum DaemonAction {
    Start,
    Stop,
    Status,
}

pub fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .unwrap_or_else(|| dirs::config_dir().unwrap_or_default().join("v0/config.toml"));
    let config = Config::load(&config_path)?;

    let operations = OperationStore::new(config.clone());
    let queue = QueueStore::new(config.clone());
    let tracker = LocalTracker::new(&config.build_root, config.lock_retry_budget, config.lock_retry_backoff_base);

    match cli.command {
        Commands::Operation { action } => run_operation(&operations, &tracker, action),
        Commands::Merge { action } => run_merge(&queue, action),
        Commands::Daemon {
            action,
            repo_root,
            remote,
            shared_branch,
            require_remote_verify,
        } => run_daemon(
            &config,
            &operations,
            &queue,
            &tracker,
            action,
            repo_root,
            remote,
            shared_branch,
            require_remote_verify,
        ),
        Commands::Status => run_status(&operations, &queue, &tracker),
    }
}

fn run_operation<T: IssueTracker>(
    operations: &OperationStore,
    tracker: &T,
    action: OperationAction,
) -> Result<()> {
    match action {
        OperationAction::Create {
            name,
            kind,
            epic_id,
            blocker_epic,
        } => {
            if let (Some(epic_id), Some(blocker_epic)) = (&epic_id, &blocker_epic) {
                let deps = DependencyGraph::new(operations, tracker);
                if deps.would_cycle(epic_id, blocker_epic)? {
                    bail!("declaring {blocker_epic} as a blocker of {epic_id} would close a dependency cycle");
                }
            }
            let mut operation = operations.create(&name, kind.into())?;
            operation.epic_id = epic_id;
            operations.save(&operation)?;
            println!("created {} ({})", operation.name, operation.phase);
            Ok(())
        }
        OperationAction::Transition { name, to } => {
            let phase = Phase::from_str(&to).map_err(|e| anyhow::anyhow!(e))?;
            let engine = TransitionEngine::new(operations);
            let operation = engine.transition(&name, phase)?;
            println!("{} -> {}", operation.name, operation.phase);
            Ok(())
        }
        OperationAction::Hold { name } => {
            let engine = TransitionEngine::new(operations);
            engine.hold(&name)?;
            println!("{name} held");
            Ok(())
        }
        OperationAction::Resume { name } => {
            let engine = TransitionEngine::new(operations);
            let operation = engine.resume(&name)?;
            println!("{} -> {}", operation.name, operation.phase);
            Ok(())
        }
    }
}

fn run_merge(queue: &QueueStore, action: MergeAction) -> Result<()> {
    match action {
        MergeAction::Enqueue { name, priority } => {
            queue.enqueue(&name, priority)?;
            println!("enqueued {name}");
            Ok(())
        }
        MergeAction::Status => {
            for entry in queue.list()? {
                println!("{:<24} {:?}", entry.operation, entry.status);
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_daemon<T: IssueTracker>(
    config: &Config,
    operations: &OperationStore,
    queue: &QueueStore,
    tracker: &T,
    action: DaemonAction,
    repo_root: Option<PathBuf>,
    remote: String,
    shared_branch: String,
    require_remote_verify: bool,
) -> Result<()> {
    match action {
        DaemonAction::Status => {
            println!("{:?}", daemon::check_status(config));
            Ok(())
        }
        DaemonAction::Stop => {
            daemon::release_singleton(config);
            println!("daemon pid file cleared");
            Ok(())
        }
        DaemonAction::Start => {
            let repo_root = repo_root.context("--repo-root is required to start the daemon")?;
            daemon::claim_singleton(config)?;
            let workspace = WorkspaceConfig {
                repo_root,
                remote,
                shared_branch,
                require_remote_verify,
            };
            let sessions = TmuxSessionLookup::new(operations);
            let result = (|| -> Result<()> {
                let daemon = MergeDaemon::new(config, &workspace, operations, queue, tracker, &sessions);
                daemon.run(stop_requested)
            })();
            daemon::release_singleton(config);
            result
        }
    }
}

static STOP_REQUESTED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

fn stop_requested() -> bool {
    STOP_REQUESTED.load(std::sync::atomic::Ordering::SeqCst)
}

/// Install a SIGINT/SIGTERM handler that flips the daemon's run loop
/// condition instead of letting the process die mid-merge.
pub fn install_signal_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        STOP_REQUESTED.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .context("failed to install signal handler")
}

fn run_status<T: IssueTracker>(operations: &OperationStore, queue: &QueueStore, tracker: &T) -> Result<()> {
    struct NoSessionsActive;
    impl SessionLookup for NoSessionsActive {
        fn is_session_active(&self, _operation: &str) -> bool {
            false
        }
    }
    let sessions = NoSessionsActive;
    let projector = StatusProjector::new(operations, queue, tracker, &sessions);
    for row in projector.build()? {
        let phase = match row.color {
            crate::status::Color::Green => row.display_phase.green(),
            crate::status::Color::Yellow => row.display_phase.yellow(),
            crate::status::Color::Red => row.display_phase.red(),
            crate::status::Color::Gray => row.display_phase.dimmed(),
        };
        let icon = match row.merge_icon {
            crate::status::MergeIcon::None => "",
            crate::status::MergeIcon::Queued => "[queued]",
            crate::status::MergeIcon::Merging => "[merging]",
            crate::status::MergeIcon::Conflict => "[conflict]",
            crate::status::MergeIcon::Merged => "[merged]",
            crate::status::MergeIcon::Failed => "[failed]",
        };
        let blocked = row
            .blocked_on
            .map(|b| format!(" blocked-on:{b}"))
            .unwrap_or_default();
        println!("{:<24} {:<14} {}{}", row.name, phase, icon, blocked);
    }
    Ok(())
}
