//! Fix commits made with the git CLI against a throwaway repository.

mod common;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use common::{failed_run, repo, FakeGitHub, OUTDATED_WORKFLOW, WORKFLOW_PATH};
use medic::commit::{ChangeWriter, CommitManager, LocalGitWriter};
use medic::config::{CommitConfig, CommitMode, LocalCommitConfig};
use medic::github::{CommitAuthor, CommitRequest};
use medic::models::{ChangeSet, FailureRecord, FileEdit, FixProposal, FixSource};
use tempfile::TempDir;

const FIXED_WORKFLOW: &str = "name: CI\non: [push, workflow_dispatch]\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/checkout@v4\n      - run: npm test\n";

fn git(args: &[&str], dir: &Path) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository whose single commit holds the outdated workflow.
fn init_test_repo() -> (TempDir, String) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let root = temp_dir.path();

    git(&["init"], root);
    git(&["config", "user.email", "test@test.com"], root);
    git(&["config", "user.name", "Test User"], root);

    fs::create_dir_all(root.join(".github/workflows")).unwrap();
    fs::write(root.join(WORKFLOW_PATH), OUTDATED_WORKFLOW).unwrap();
    git(&["add", "."], root);
    git(&["commit", "-m", "Initial commit"], root);
    git(&["branch", "-M", "main"], root);

    let sha = git(&["rev-parse", "HEAD"], root);
    (temp_dir, sha)
}

fn local_config(checkout: &Path) -> LocalCommitConfig {
    let mut checkouts = BTreeMap::new();
    checkouts.insert("octo/app".to_string(), checkout.to_path_buf());
    LocalCommitConfig {
        remote: "origin".to_string(),
        push: false,
        checkouts,
    }
}

fn request(branch: &str, base_sha: &str) -> CommitRequest {
    CommitRequest {
        branch: branch.to_string(),
        base_sha: base_sha.to_string(),
        message: "fix(ci): Upgrade actions/checkout to v4".to_string(),
        edits: vec![FileEdit::new(WORKFLOW_PATH, FIXED_WORKFLOW)],
        author: Some(CommitAuthor {
            name: "medic".to_string(),
            email: "medic@example.com".to_string(),
        }),
    }
}

fn worktree_count(checkout: &Path) -> usize {
    git(&["worktree", "list", "--porcelain"], checkout)
        .lines()
        .filter(|l| l.starts_with("worktree "))
        .count()
}

#[test]
fn test_local_writer_commits_on_new_branch() {
    let (dir, base) = init_test_repo();
    let writer = LocalGitWriter::new(local_config(dir.path())).unwrap();

    let created = writer
        .write(&repo(), &request("medic/ci-1-a1", &base))
        .unwrap();

    assert_eq!(created.branch, "medic/ci-1-a1");
    assert_ne!(created.sha, base);
    assert_eq!(git(&["rev-parse", "medic/ci-1-a1"], dir.path()), created.sha);
    assert_eq!(git(&["rev-parse", "medic/ci-1-a1^"], dir.path()), base);

    let content = git(
        &["show", &format!("medic/ci-1-a1:{WORKFLOW_PATH}")],
        dir.path(),
    );
    assert_eq!(content, FIXED_WORKFLOW.trim_end());
    assert_eq!(
        git(&["log", "-1", "--format=%an <%ae>", "medic/ci-1-a1"], dir.path()),
        "medic <medic@example.com>"
    );

    // The checkout itself is untouched and the worktree is gone.
    assert_eq!(
        fs::read_to_string(dir.path().join(WORKFLOW_PATH)).unwrap(),
        OUTDATED_WORKFLOW
    );
    assert_eq!(git(&["rev-parse", "--abbrev-ref", "HEAD"], dir.path()), "main");
    assert_eq!(worktree_count(dir.path()), 1);
}

#[test]
fn test_local_writer_refuses_existing_branch() {
    let (dir, base) = init_test_repo();
    git(&["branch", "medic/ci-1-a1"], dir.path());
    let writer = LocalGitWriter::new(local_config(dir.path())).unwrap();

    let err = writer
        .write(&repo(), &request("medic/ci-1-a1", &base))
        .unwrap_err();

    assert!(format!("{err:#}").contains("worktree"));
    assert_eq!(worktree_count(dir.path()), 1);
    assert_eq!(git(&["rev-parse", "medic/ci-1-a1"], dir.path()), base);
}

#[test]
fn test_local_writer_cleans_up_when_base_is_unknown() {
    let (dir, _) = init_test_repo();
    let writer = LocalGitWriter::new(local_config(dir.path())).unwrap();

    let missing = "0123456789abcdef0123456789abcdef01234567";
    assert!(writer
        .write(&repo(), &request("medic/ci-1-a1", missing))
        .is_err());

    assert_eq!(worktree_count(dir.path()), 1);
    assert!(git(&["branch", "--list", "medic/*"], dir.path()).is_empty());
}

#[test]
fn test_local_writer_needs_configured_checkout() {
    let (dir, base) = init_test_repo();
    let writer = LocalGitWriter::new(local_config(dir.path())).unwrap();

    let other = "octo/other".parse().unwrap();
    let err = writer
        .write(&other, &request("medic/ci-1-a1", &base))
        .unwrap_err();
    assert!(err.to_string().contains("No local checkout configured"));
}

#[test]
fn test_commit_manager_applies_with_local_writer() {
    let (dir, base) = init_test_repo();
    let config = CommitConfig {
        mode: CommitMode::Local,
        local: local_config(dir.path()),
        ..CommitConfig::default()
    };
    let manager = CommitManager::from_config(&config, Arc::new(FakeGitHub::new())).unwrap();
    assert_eq!(manager.writer_name(), "local");

    let mut run = failed_run(4242, 5);
    run.head_sha = base.clone();
    let failure = FailureRecord::from_run(&repo(), &run);
    let proposal = FixProposal {
        source: FixSource::Pattern("outdated-checkout".to_string()),
        description: "Upgrade actions/checkout to v4".to_string(),
        change_set: ChangeSet::single(FileEdit::new(WORKFLOW_PATH, FIXED_WORKFLOW)),
    };

    let applied = manager.apply(&failure, &proposal, 1, &base).unwrap();

    assert_eq!(applied.branch, "medic/ci-4242-a1");
    assert!(applied.pull_request.is_none());
    let message = git(&["log", "-1", "--format=%B", &applied.sha], dir.path());
    assert!(message.starts_with("fix(ci): Upgrade actions/checkout to v4"));
    assert!(message.contains(&format!("Correlation-Id: {}", failure.correlation_id)));
    assert!(message.contains("Fix-Source: outdated-checkout"));
}
