//! Shared test helpers for patchdance integration tests.
//!
//! All tests use temp directories — no side effects on the real repo.
//! Each test gets its own git repository via `setup_repo()`, driven
//! through the same subprocess git the engine's backend uses.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use patchdance::model::CommitId;
use patchdance::repo::{GitCliRepository, Repository};

/// Run a git command in `dir`, panicking on failure.
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git must be installed");
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// Create a fresh git repo on branch `main` with commit identity set.
pub fn setup_repo() -> (TempDir, GitCliRepository) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let root = dir.path();
    run_git(root, &["init", "-b", "main"]);
    run_git(root, &["config", "user.name", "Test"]);
    run_git(root, &["config", "user.email", "test@test.com"]);
    run_git(root, &["config", "commit.gpgsign", "false"]);
    let repo = GitCliRepository::open(root).expect("open fresh repo");
    (dir, repo)
}

/// Write `content` to `dir/path`, creating parent directories as needed.
pub fn write_file(dir: &Path, path: &str, content: &str) {
    let full = dir.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
}

/// Stage everything and commit; returns the new commit id.
pub fn commit_all(dir: &Path, message: &str) -> CommitId {
    run_git(dir, &["add", "-A"]);
    run_git(dir, &["commit", "-m", message]);
    CommitId::new(&run_git(dir, &["rev-parse", "HEAD"])).expect("HEAD is a valid oid")
}

/// Write one file and commit it.
pub fn commit_file(dir: &Path, path: &str, content: &str, message: &str) -> CommitId {
    write_file(dir, path, content);
    commit_all(dir, message)
}

/// The content of `path` at `commit`, if present.
pub fn file_at(repo: &GitCliRepository, commit: &CommitId, path: &str) -> Option<String> {
    repo.read_blob(commit, Path::new(path))
        .expect("read_blob")
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// First-parent history of the branch head, newest first.
pub fn history(repo: &GitCliRepository) -> Vec<CommitId> {
    let head = repo.head().expect("head");
    repo.walk_history(&head, 100)
        .expect("walk_history")
        .into_iter()
        .map(|info| info.id)
        .collect()
}

/// Build the move-scenario repository:
/// c1 (file.txt: "a\nb\nc\n") ← c2 ("a\nB\nc\n") ← c3 ("a\nB\nc\nd\n").
pub fn scenario_repo() -> (TempDir, GitCliRepository, CommitId, CommitId, CommitId) {
    let (dir, repo) = setup_repo();
    let c1 = commit_file(dir.path(), "file.txt", "a\nb\nc\n", "c1");
    let c2 = commit_file(dir.path(), "file.txt", "a\nB\nc\n", "c2");
    let c3 = commit_file(dir.path(), "file.txt", "a\nB\nc\nd\n", "c3");
    (dir, repo, c1, c2, c3)
}
