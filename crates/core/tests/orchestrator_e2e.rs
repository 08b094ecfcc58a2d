//! End-to-end tests for changelist replay.
//!
//! These tests drive the full pipeline:
//! - A TOML config parsed by `SyncConfig`
//! - `PathResolver` against an in-memory depot
//! - `ChangelistOrchestrator` mirroring into a real Git repository
//!   created with `git2::Repository` in a temp dir
//!
//! The depot is a fake `SourceControl` whose `sync` rewrites the workspace
//! to the snapshot recorded for a change, the way `p4 sync` would.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::Repository;
use tempfile::TempDir;

use gitp4sync_core::config::SyncConfig;
use gitp4sync_core::errors::{P4Error, SyncError};
use gitp4sync_core::git::GitClient;
use gitp4sync_core::models::{Change, ChangeId, ChangeRange, ChangeSummary, RunPhase};
use gitp4sync_core::orchestrator::{ChangelistOrchestrator, SyncOptions};
use gitp4sync_core::p4::{LocalMapping, SourceControl};
use gitp4sync_core::report::TracingReporter;
use gitp4sync_core::resolver::PathResolver;

// ===========================================================================
// Fake depot
// ===========================================================================

struct DepotChange {
    description: &'static str,
    user: &'static str,
    /// Full workspace contents at this change.
    files: Vec<(&'static str, &'static str)>,
}

struct FakeDepot {
    /// Local path of `//depot/proj`.
    workspace: PathBuf,
    changes: BTreeMap<u64, DepotChange>,
    /// Ids `p4 changes` reports as touching the mapped view.
    touching: BTreeSet<u64>,
    synced: RefCell<Vec<u64>>,
    reconciled: RefCell<Vec<String>>,
}

impl FakeDepot {
    fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            changes: BTreeMap::new(),
            touching: BTreeSet::new(),
            synced: RefCell::new(Vec::new()),
            reconciled: RefCell::new(Vec::new()),
        }
    }

    fn change(mut self, id: u64, description: &'static str, files: Vec<(&'static str, &'static str)>) -> Self {
        self.touching.insert(id);
        self.changes.insert(
            id,
            DepotChange {
                description,
                user: "jdoe",
                files,
            },
        );
        self
    }

    fn materialize(&self, id: u64) {
        if self.workspace.exists() {
            fs::remove_dir_all(&self.workspace).unwrap();
        }
        fs::create_dir_all(&self.workspace).unwrap();
        for (rel, content) in &self.changes[&id].files {
            let path = self.workspace.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }
}

fn submit_time(id: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + id as i64 * 60, 0).unwrap()
}

fn revision(view: &str) -> &str {
    view.rsplit_once('@').map(|(_, r)| r).unwrap()
}

impl SourceControl for FakeDepot {
    fn where_local(&self, logical: &str) -> Result<Vec<LocalMapping>, P4Error> {
        if logical != "//depot/proj/..." {
            return Err(P4Error::ServerError(format!("{} - file(s) not in client view.", logical)));
        }
        Ok(vec![LocalMapping {
            depot_file: logical.to_string(),
            client_file: "//ws/proj/...".to_string(),
            path: format!("{}/...", self.workspace.display()),
        }])
    }

    fn changes(&self, views: &[String]) -> Result<Vec<ChangeSummary>, P4Error> {
        let range: ChangeRange = revision(&views[0]).parse().unwrap();
        // `p4 changes` lists newest first.
        Ok(self
            .touching
            .iter()
            .rev()
            .map(|&id| ChangeId::new(id))
            .filter(|id| *id >= range.first && *id <= range.last)
            .map(|id| ChangeSummary {
                id,
                user: "jdoe".into(),
                time: submit_time(id.get()),
            })
            .collect())
    }

    fn describe(&self, id: ChangeId) -> Result<Change, P4Error> {
        let change = self.changes.get(&id.get()).ok_or(P4Error::ChangeNotFound(id))?;
        Ok(Change {
            id,
            description: change.description.to_string(),
            submit_time: submit_time(id.get()),
            user: change.user.to_string(),
        })
    }

    fn sync(&self, views: &[String]) -> Result<(), P4Error> {
        let id: u64 = revision(&views[0]).parse().unwrap();
        self.materialize(id);
        self.synced.borrow_mut().push(id);
        Ok(())
    }

    fn reconcile(&self, views: &[String]) -> Result<(), P4Error> {
        self.reconciled.borrow_mut().extend(views.iter().cloned());
        Ok(())
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

struct Fixture {
    _tmp: TempDir,
    repo_dir: PathBuf,
    workspace: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let repo_dir = tmp.path().join("repo");
    let workspace = tmp.path().join("ws/proj");
    let repo = Repository::init(&repo_dir).unwrap();
    let mut cfg = repo.config().unwrap();
    cfg.set_str("user.name", "Sync Bot").unwrap();
    cfg.set_str("user.email", "sync@example.com").unwrap();
    Fixture {
        _tmp: tmp,
        repo_dir,
        workspace,
    }
}

fn config(repo_dir: &Path, dest: &str) -> SyncConfig {
    let toml = format!(
        r#"
[source]
root = "/unused"

[paths]
"//depot/proj/..." = "{dest}"
"//depot/unmapped/..." = "elsewhere"

[destination]
ignore = ["\\.git"]
"#
    );
    let config = SyncConfig::from_toml_str(&toml, repo_dir).unwrap();
    config.validate().unwrap();
    config
}

fn range(first: u64, last: u64) -> ChangeRange {
    ChangeRange::new(ChangeId::new(first), ChangeId::new(last))
}

struct Logged {
    message: String,
    author_time: i64,
    committer_time: i64,
}

/// Commits from HEAD back to the root.
fn history(repo_dir: &Path) -> Vec<Logged> {
    let repo = Repository::open(repo_dir).unwrap();
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    walk.map(|oid| {
        let commit = repo.find_commit(oid.unwrap()).unwrap();
        let author_time = commit.author().when().seconds();
        let committer_time = commit.committer().when().seconds();
        let message = commit.message().unwrap_or_default().to_string();
        Logged {
            message,
            author_time,
            committer_time,
        }
    })
    .collect()
}

fn head_file(repo_dir: &Path, path: &str) -> Option<String> {
    let repo = Repository::open(repo_dir).unwrap();
    let tree = repo.head().ok()?.peel_to_tree().ok()?;
    let entry = tree.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).ok()?;
    Some(String::from_utf8_lossy(blob.content()).to_string())
}

fn run(
    depot: &FakeDepot,
    config: &SyncConfig,
    options: SyncOptions,
    cl_range: ChangeRange,
) -> (Result<gitp4sync_core::RangeSummary, SyncError>, RunPhase) {
    let git = GitClient::new(config.dest_root()).unwrap();
    let rules = config.ignore_rules().unwrap();
    let reporter = TracingReporter;
    let mappings = PathResolver::new(depot, config.dest_root()).resolve(&config.paths);
    let orch = ChangelistOrchestrator::new(depot, &git, mappings, &rules, &reporter, options);
    let result = orch.sync_range(cl_range);
    (result, orch.phase())
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn test_replays_only_touching_changes_in_numeric_order() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone())
        .change(9, "Add a", vec![("a.txt", "first")])
        .change(101, "Add b\n\nDetails here.", vec![("a.txt", "first"), ("b/c.txt", "c")])
        .change(104, "Edit a", vec![("a.txt", "second version"), ("b/c.txt", "c")]);
    let cfg = config(&fx.repo_dir, "src");

    let (result, phase) = run(&depot, &cfg, SyncOptions::from_config(&cfg, false), range(100, 105));
    let summary = result.unwrap();

    assert_eq!(summary.replayed, vec![ChangeId::new(101), ChangeId::new(104)]);
    assert_eq!(*depot.synced.borrow(), vec![101, 104]);
    assert_eq!(phase, RunPhase::Idle);

    let commits = history(&fx.repo_dir);
    assert_eq!(commits.len(), 2);
    // Newest first.
    assert_eq!(commits[0].message, "Edit a\nCL 104\n");
    assert_eq!(commits[1].message, "Add b\n\nDetails here.\nCL 101\n");
    assert_eq!(commits[1].author_time, submit_time(101).timestamp());
    assert_eq!(commits[1].committer_time, submit_time(101).timestamp());
    assert_eq!(commits[0].author_time, submit_time(104).timestamp());

    assert_eq!(head_file(&fx.repo_dir, "src/a.txt").as_deref(), Some("second version"));
    assert_eq!(head_file(&fx.repo_dir, "src/b/c.txt").as_deref(), Some("c"));
}

#[test]
fn test_nine_sorts_before_ten() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone())
        .change(9, "nine", vec![("n.txt", "9")])
        .change(10, "ten", vec![("n.txt", "10")]);
    let cfg = config(&fx.repo_dir, "src");

    let (result, _) = run(&depot, &cfg, SyncOptions::from_config(&cfg, false), range(1, 20));

    assert_eq!(result.unwrap().replayed, vec![ChangeId::new(9), ChangeId::new(10)]);
    assert_eq!(head_file(&fx.repo_dir, "src/n.txt").as_deref(), Some("10"));
}

#[test]
fn test_no_cl_trailer() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone()).change(101, "Plain", vec![("a.txt", "a")]);
    let cfg = config(&fx.repo_dir, "src");
    let options = SyncOptions {
        trailer: false,
        ..SyncOptions::from_config(&cfg, false)
    };

    run(&depot, &cfg, options, range(101, 101)).0.unwrap();

    assert_eq!(history(&fx.repo_dir)[0].message, "Plain\n");
}

#[test]
fn test_deletions_are_committed_and_empty_dirs_removed() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone())
        .change(1, "both", vec![("a.txt", "a"), ("b/old.txt", "old")])
        .change(2, "drop old", vec![("a.txt", "a")]);
    let cfg = config(&fx.repo_dir, "src");

    run(&depot, &cfg, SyncOptions::from_config(&cfg, false), range(1, 2)).0.unwrap();

    assert!(!fx.repo_dir.join("src/b").exists());
    assert!(head_file(&fx.repo_dir, "src/b/old.txt").is_none());
    assert_eq!(head_file(&fx.repo_dir, "src/a.txt").as_deref(), Some("a"));
}

#[test]
fn test_mapping_onto_repo_root_leaves_dot_git_alone() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone()).change(
        5,
        "root mapped",
        vec![("top.txt", "top"), (".git/config", "not a real git dir")],
    );
    let cfg = config(&fx.repo_dir, ".");

    run(&depot, &cfg, SyncOptions::from_config(&cfg, false), range(5, 5)).0.unwrap();

    // The destination .git survives the delete pass and is not overwritten.
    assert!(Repository::open(&fx.repo_dir).is_ok());
    assert_ne!(
        fs::read_to_string(fx.repo_dir.join(".git/config")).unwrap(),
        "not a real git dir"
    );
    assert_eq!(head_file(&fx.repo_dir, "top.txt").as_deref(), Some("top"));
}

#[test]
fn test_unchanged_change_fails_fast() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone())
        .change(101, "Add a", vec![("a.txt", "a")])
        .change(103, "Only touches unmapped files", vec![("a.txt", "a")])
        .change(104, "Edit a", vec![("a.txt", "edited")]);
    let cfg = config(&fx.repo_dir, "src");

    let (result, phase) = run(&depot, &cfg, SyncOptions::from_config(&cfg, false), range(100, 105));

    match result {
        Err(SyncError::CommitFailed { change, .. }) => assert_eq!(change, ChangeId::new(103)),
        other => panic!("expected commit failure, got {:?}", other.map(|s| s.replayed)),
    }
    assert_eq!(phase, RunPhase::Failed);
    // 104 was never synced; history stops at 101.
    assert_eq!(*depot.synced.borrow(), vec![101, 103]);
    let commits = history(&fx.repo_dir);
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].message, "Add a\nCL 101\n");
}

#[test]
fn test_empty_range_creates_nothing() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone()).change(50, "far away", vec![("a.txt", "a")]);
    let cfg = config(&fx.repo_dir, "src");

    let (result, phase) = run(&depot, &cfg, SyncOptions::from_config(&cfg, false), range(1, 10));

    assert!(result.unwrap().discovered.is_empty());
    assert_eq!(phase, RunPhase::Idle);
    assert!(Repository::open(&fx.repo_dir).unwrap().head().is_err());
}

#[test]
fn test_dry_run_mutates_nothing() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone()).change(7, "would add", vec![("a.txt", "a")]);
    depot.materialize(7);
    let cfg = config(&fx.repo_dir, "src");

    let (result, _) = run(&depot, &cfg, SyncOptions::from_config(&cfg, true), range(1, 10));

    let summary = result.unwrap();
    assert_eq!(summary.replayed, vec![ChangeId::new(7)]);
    assert!(summary.commits.is_empty());
    assert!(depot.synced.borrow().is_empty());
    assert!(!fx.repo_dir.join("src").exists());
    assert!(Repository::open(&fx.repo_dir).unwrap().head().is_err());
}

#[test]
fn test_reverse_pushes_work_tree_into_workspace() {
    let fx = fixture();
    let depot = FakeDepot::new(fx.workspace.clone()).change(
        1,
        "base",
        vec![("a.txt", "a"), ("gone.txt", "g")],
    );
    let cfg = config(&fx.repo_dir, "src");
    run(&depot, &cfg, SyncOptions::from_config(&cfg, false), range(1, 1)).0.unwrap();

    fs::write(fx.repo_dir.join("src/a.txt"), "edited in git").unwrap();
    fs::remove_file(fx.repo_dir.join("src/gone.txt")).unwrap();
    fs::write(fx.repo_dir.join("src/new.txt"), "new").unwrap();

    let git = GitClient::new(cfg.dest_root()).unwrap();
    let rules = cfg.ignore_rules().unwrap();
    let reporter = TracingReporter;
    let mappings = PathResolver::new(&depot, cfg.dest_root()).resolve(&cfg.paths);
    let orch = ChangelistOrchestrator::new(
        &depot,
        &git,
        mappings,
        &rules,
        &reporter,
        SyncOptions::from_config(&cfg, false),
    );
    orch.reverse().unwrap();

    assert_eq!(fs::read_to_string(fx.workspace.join("a.txt")).unwrap(), "edited in git");
    assert!(!fx.workspace.join("gone.txt").exists());
    assert!(fx.workspace.join("new.txt").exists());
    assert_eq!(*depot.reconciled.borrow(), vec!["//depot/proj/...".to_string()]);
}
