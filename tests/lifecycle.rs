//! End-to-end lifecycle scenarios driven against a real git repository and
//! JSON-backed stores, the way a deployed daemon actually sees them. Unlike
//! the unit tests embedded alongside each module, these exercise the full
//! operation -> transition engine -> merge queue -> daemon path together.

use std::path::Path;
use std::process::Command;

use v0_core::config::Config;
use v0_core::engine::dependencies::DependencyGraph;
use v0_core::engine::readiness::SessionLookup;
use v0_core::engine::transitions::TransitionEngine;
use v0_core::mergequeue::daemon::{MergeDaemon, WorkspaceConfig};
use v0_core::models::operation::OperationKind;
use v0_core::models::phase::Phase;
use v0_core::models::queue::QueueStatus;
use v0_core::notify::NotificationLog;
use v0_core::store::{OperationStore, QueueStore};
use v0_core::tracker::local::LocalTracker;
use v0_core::tracker::{IssueStatus, IssueTracker};
use v0_core::worker::supervisor::{Supervisor, SupervisorAction};

struct NoSessionsActive;
impl SessionLookup for NoSessionsActive {
    fn is_session_active(&self, _operation: &str) -> bool {
        false
    }
}

fn run(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(repo)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed in {repo:?}");
}

fn write_file(repo: &Path, name: &str, contents: &str) {
    std::fs::write(repo.join(name), contents).unwrap();
}

fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.build_root = dir.to_path_buf();
    config
}

fn tracker_in(config: &Config) -> LocalTracker {
    LocalTracker::new(&config.build_root, config.lock_retry_budget, config.lock_retry_backoff_base)
}

/// A working repo with a `main` branch pushed to a bare `origin`, the shape
/// the merge daemon expects: a shared branch it can fetch, reset onto, and
/// push back to.
struct GitFixture {
    _origin: tempfile::TempDir,
    work: tempfile::TempDir,
}

impl GitFixture {
    fn new() -> Self {
        let origin = tempfile::tempdir().unwrap();
        run(origin.path(), &["init", "-q", "--bare", "-b", "main"]);

        let work = tempfile::tempdir().unwrap();
        run(work.path(), &["init", "-q", "-b", "main"]);
        run(work.path(), &["config", "user.email", "test@example.com"]);
        run(work.path(), &["config", "user.name", "test"]);
        run(work.path(), &["remote", "add", "origin", origin.path().to_str().unwrap()]);
        write_file(work.path(), "a.txt", "a\n");
        run(work.path(), &["add", "."]);
        run(work.path(), &["commit", "-q", "-m", "init"]);
        run(work.path(), &["push", "-q", "-u", "origin", "main"]);

        Self { _origin: origin, work }
    }

    fn repo_root(&self) -> &Path {
        self.work.path()
    }

    /// Branch `name` off `main`, writing `file` = `contents`, committed and
    /// pushed to origin so the daemon's staleness check sees a live branch
    /// rather than treating an unpublished one as vanished.
    fn push_operation_branch(&self, name: &str, file: &str, contents: &str) {
        run(self.repo_root(), &["checkout", "-q", "main"]);
        run(self.repo_root(), &["checkout", "-q", "-b", name]);
        write_file(self.repo_root(), file, contents);
        run(self.repo_root(), &["add", "."]);
        run(self.repo_root(), &["commit", "-q", "-m", name]);
        run(self.repo_root(), &["push", "-q", "-u", "origin", name]);
        run(self.repo_root(), &["checkout", "-q", "main"]);
    }
}

fn workspace_for(fixture: &GitFixture, require_remote_verify: bool) -> WorkspaceConfig {
    WorkspaceConfig {
        repo_root: fixture.repo_root().to_path_buf(),
        remote: "origin".into(),
        shared_branch: "main".into(),
        require_remote_verify,
    }
}

/// Drive an operation from `init` through `completed` and on to
/// `pending_merge`, the phase the merge queue actually dispatches from.
fn advance_to_pending_merge(operations: &OperationStore, name: &str) {
    let engine = TransitionEngine::new(operations);
    engine.transition(name, Phase::Planned).unwrap();
    engine.transition(name, Phase::Queued).unwrap();
    engine.transition(name, Phase::Executing).unwrap();
    engine.transition(name, Phase::Completed).unwrap();
    engine.transition(name, Phase::PendingMerge).unwrap();
}

#[test]
fn s1_happy_path_merges_and_closes_the_queue_entry() {
    let build = tempfile::tempdir().unwrap();
    let config = config_in(build.path());
    let operations = OperationStore::new(config.clone());
    let queue = QueueStore::new(config.clone());
    let tracker = tracker_in(&config);
    let sessions = NoSessionsActive;

    let fixture = GitFixture::new();
    fixture.push_operation_branch("feature/op1", "op1.txt", "op1 change\n");

    operations.create("op1", OperationKind::Feature).unwrap();
    advance_to_pending_merge(&operations, "op1");
    queue.enqueue("op1", 0).unwrap();

    let workspace = workspace_for(&fixture, false);
    let daemon = MergeDaemon::new(&config, &workspace, &operations, &queue, &tracker, &sessions);
    daemon.cycle().unwrap();

    let op1 = operations.load("op1").unwrap().unwrap();
    assert_eq!(op1.phase, Phase::Merged);
    assert!(op1.merge_commit.is_some());

    let entry = queue
        .list()
        .unwrap()
        .into_iter()
        .find(|e| e.operation == "op1")
        .unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);
}

#[test]
fn s2_dependency_resume_unblocks_after_blocker_merges() {
    let build = tempfile::tempdir().unwrap();
    let config = config_in(build.path());
    let operations = OperationStore::new(config.clone());
    let tracker = tracker_in(&config);

    let epic_a = tracker.create("feature", "op-a").unwrap();
    let epic_b = tracker.create("feature", "op-b").unwrap();
    tracker.add_blocker(&epic_b, &epic_a).unwrap();

    let mut op_a = operations.create("op-a", OperationKind::Feature).unwrap();
    op_a.epic_id = Some(epic_a.clone());
    operations.save(&op_a).unwrap();

    let mut op_b = operations.create("op-b", OperationKind::Feature).unwrap();
    op_b.epic_id = Some(epic_b.clone());
    op_b.phase = Phase::Blocked;
    operations.save(&op_b).unwrap();

    let graph = DependencyGraph::new(&operations, &tracker);
    assert_eq!(graph.is_blocked("op-b").unwrap().as_deref(), Some("op-a"));

    let engine = TransitionEngine::new(&operations);
    engine.transition("op-a", Phase::Planned).unwrap();
    engine.transition("op-a", Phase::Queued).unwrap();
    engine.transition("op-a", Phase::Executing).unwrap();
    engine.transition("op-a", Phase::Completed).unwrap();
    engine.transition("op-a", Phase::PendingMerge).unwrap();
    engine.merge("op-a", "deadbeef").unwrap();

    let triggered = graph.trigger_dependents("op-a").unwrap();
    assert_eq!(triggered, vec!["op-b".to_string()]);

    let reloaded_b = operations.load("op-b").unwrap().unwrap();
    assert_eq!(reloaded_b.phase, Phase::Queued);
    assert_eq!(tracker.show(&epic_a).unwrap().unwrap().status, IssueStatus::Done);
}

#[test]
fn s3_conflict_is_retried_once_then_succeeds() {
    let build = tempfile::tempdir().unwrap();
    let config = config_in(build.path());
    let operations = OperationStore::new(config.clone());
    let queue = QueueStore::new(config.clone());
    let tracker = tracker_in(&config);
    let sessions = NoSessionsActive;

    let fixture = GitFixture::new();
    // Branch and main both touch a.txt: guarantees a conflict on first attempt.
    fixture.push_operation_branch("feature/op-c", "a.txt", "feature change\n");
    write_file(fixture.repo_root(), "a.txt", "main change\n");
    run(fixture.repo_root(), &["add", "."]);
    run(fixture.repo_root(), &["commit", "-q", "-m", "diverge main"]);
    run(fixture.repo_root(), &["push", "-q", "origin", "main"]);

    operations.create("op-c", OperationKind::Feature).unwrap();
    advance_to_pending_merge(&operations, "op-c");
    queue.enqueue("op-c", 0).unwrap();

    let workspace = workspace_for(&fixture, false);
    let daemon = MergeDaemon::new(&config, &workspace, &operations, &queue, &tracker, &sessions);
    daemon.cycle().unwrap();

    let op_c = operations.load("op-c").unwrap().unwrap();
    assert_eq!(op_c.phase, Phase::Conflict);
    let entry = queue
        .list()
        .unwrap()
        .into_iter()
        .find(|e| e.operation == "op-c")
        .unwrap();
    assert_eq!(entry.status, QueueStatus::Conflict);
    assert!(!entry.conflict_retried);

    // Resolve out of band, the way a worker session re-dispatched to fix a
    // conflict would: rebuild the branch on top of current main without
    // touching the contended file.
    run(fixture.repo_root(), &["branch", "-f", "feature/op-c", "main"]);
    run(fixture.repo_root(), &["checkout", "-q", "feature/op-c"]);
    write_file(fixture.repo_root(), "op_c_fix.txt", "resolved\n");
    run(fixture.repo_root(), &["add", "."]);
    run(fixture.repo_root(), &["commit", "-q", "-m", "resolve"]);
    run(fixture.repo_root(), &["push", "-q", "-f", "origin", "feature/op-c"]);
    run(fixture.repo_root(), &["checkout", "-q", "main"]);

    daemon.cycle().unwrap();

    let op_c = operations.load("op-c").unwrap().unwrap();
    assert_eq!(op_c.phase, Phase::Merged);
    let entry = queue
        .list()
        .unwrap()
        .into_iter()
        .find(|e| e.operation == "op-c")
        .unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);
    assert!(entry.conflict_retried);
}

#[test]
fn s4_cleanup_removes_already_merged_entry_without_merging() {
    let build = tempfile::tempdir().unwrap();
    let config = config_in(build.path());
    let operations = OperationStore::new(config.clone());
    let queue = QueueStore::new(config.clone());
    let tracker = tracker_in(&config);
    let sessions = NoSessionsActive;

    let mut op_d = operations.create("op-d", OperationKind::Feature).unwrap();
    op_d.merged_at = Some(chrono::Utc::now());
    op_d.phase = Phase::Merged;
    op_d.merge_commit = Some("deadbeef".into());
    operations.save(&op_d).unwrap();
    queue.enqueue("op-d", 0).unwrap();

    // repo_root need not be a real git repository: the already-merged check
    // short-circuits before the daemon shells out to check the branch
    // against a remote.
    let not_a_repo = tempfile::tempdir().unwrap();
    let workspace = WorkspaceConfig {
        repo_root: not_a_repo.path().to_path_buf(),
        remote: "origin".into(),
        shared_branch: "main".into(),
        require_remote_verify: false,
    };
    let daemon = MergeDaemon::new(&config, &workspace, &operations, &queue, &tracker, &sessions);
    daemon.cycle().unwrap();

    assert!(queue.list().unwrap().is_empty());
}

#[test]
fn s5_repeated_no_progress_crash_stops_the_poller_and_notifies() {
    let build = tempfile::tempdir().unwrap();
    let notifications = NotificationLog::new(build.path());
    let mut supervisor = Supervisor::new("fix-worker", 2);

    assert_eq!(
        supervisor.observe(true, false, "worklist-v1", &notifications),
        SupervisorAction::Continue
    );
    let first = supervisor.observe(false, false, "worklist-v1", &notifications);
    assert!(matches!(first, SupervisorAction::Relaunch { .. }));
    let second = supervisor.observe(false, false, "worklist-v1", &notifications);
    assert_eq!(second, SupervisorAction::StopPoller);

    let log = std::fs::read_to_string(build.path().join("notifications.log")).unwrap();
    assert!(log.contains("crashed with no progress"));
    assert!(log.contains("stopped after 2 consecutive no-progress crashes"));
}

#[test]
fn s6_push_verify_confirms_commit_reaches_remote_shared_branch() {
    let build = tempfile::tempdir().unwrap();
    let config = config_in(build.path());
    let operations = OperationStore::new(config.clone());
    let queue = QueueStore::new(config.clone());
    let tracker = tracker_in(&config);
    let sessions = NoSessionsActive;

    let fixture = GitFixture::new();
    fixture.push_operation_branch("feature/op-f", "op_f.txt", "push verify change\n");

    operations.create("op-f", OperationKind::Feature).unwrap();
    advance_to_pending_merge(&operations, "op-f");
    queue.enqueue("op-f", 0).unwrap();

    let workspace = workspace_for(&fixture, true);
    let daemon = MergeDaemon::new(&config, &workspace, &operations, &queue, &tracker, &sessions);
    daemon.cycle().unwrap();

    let op_f = operations.load("op-f").unwrap().unwrap();
    assert_eq!(op_f.phase, Phase::Merged);
    let commit = op_f.merge_commit.clone().unwrap();

    run(fixture.repo_root(), &["fetch", "-q", "origin"]);
    let ancestor = Command::new("git")
        .args(["merge-base", "--is-ancestor", &commit, "origin/main"])
        .current_dir(fixture.repo_root())
        .status()
        .unwrap();
    assert!(ancestor.success());
}
