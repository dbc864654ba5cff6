use super::*;
use crate::error::MedicError;
use crate::github::{IssueRef, IssueRequest, WorkflowRun};
use crate::models::{ChangeSet, FileEdit, FixSource};
use anyhow::bail;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

#[derive(Default)]
struct RecordingWriter {
    requests: Mutex<Vec<CommitRequest>>,
    fail: bool,
}

impl ChangeWriter for Arc<RecordingWriter> {
    fn name(&self) -> &str {
        "recording"
    }

    fn write(&self, _repo: &RepoName, request: &CommitRequest) -> Result<CreatedCommit> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            bail!("permission denied");
        }
        Ok(CreatedCommit {
            branch: request.branch.clone(),
            sha: "f1x".into(),
        })
    }
}

/// Only pull requests are expected from the commit manager.
#[derive(Default)]
struct PullRequestOnly {
    opened: Mutex<Vec<PullRequestRequest>>,
}

impl GitHubApi for PullRequestOnly {
    fn list_org_repositories(&self, _: &str) -> Result<Vec<RepoName>, MedicError> {
        unreachable!()
    }
    fn list_user_repositories(&self) -> Result<Vec<RepoName>, MedicError> {
        unreachable!()
    }
    fn list_failed_runs(&self, _: &RepoName, _: DateTime<Utc>) -> Result<Vec<WorkflowRun>, MedicError> {
        unreachable!()
    }
    fn get_run(&self, _: &RepoName, _: u64) -> Result<WorkflowRun, MedicError> {
        unreachable!()
    }
    fn list_branch_runs(&self, _: &RepoName, _: u64, _: &str) -> Result<Vec<WorkflowRun>, MedicError> {
        unreachable!()
    }
    fn fetch_run_logs(&self, _: &RepoName, _: u64) -> Result<String, MedicError> {
        unreachable!()
    }
    fn fetch_file(&self, _: &RepoName, _: &str, _: &str) -> Result<Option<String>, MedicError> {
        unreachable!()
    }
    fn create_branch_commit(&self, _: &RepoName, _: &CommitRequest) -> Result<CreatedCommit, MedicError> {
        unreachable!()
    }
    fn open_pull_request(
        &self,
        _: &RepoName,
        request: &PullRequestRequest,
    ) -> Result<PullRequest, MedicError> {
        self.opened.lock().unwrap().push(request.clone());
        Ok(PullRequest {
            number: 12,
            html_url: "https://github.com/octo/app/pull/12".into(),
        })
    }
    fn rerun_failed_jobs(&self, _: &RepoName, _: u64) -> Result<(), MedicError> {
        unreachable!()
    }
    fn dispatch_workflow(&self, _: &RepoName, _: u64, _: &str) -> Result<bool, MedicError> {
        unreachable!()
    }
    fn find_issue_with_marker(&self, _: &RepoName, _: &str, _: &str) -> Result<Option<IssueRef>, MedicError> {
        unreachable!()
    }
    fn ensure_label(&self, _: &RepoName, _: &str, _: &str, _: &str) -> Result<(), MedicError> {
        unreachable!()
    }
    fn create_issue(&self, _: &RepoName, _: &IssueRequest) -> Result<IssueRef, MedicError> {
        unreachable!()
    }
}

fn failure() -> FailureRecord {
    let repo: RepoName = "octo/app".parse().unwrap();
    let run = WorkflowRun {
        id: 4242,
        name: Some("Build & Test".into()),
        workflow_id: 3,
        path: ".github/workflows/ci.yml".into(),
        head_branch: Some("main".into()),
        head_sha: "abc123".into(),
        conclusion: Some("failure".into()),
        ..Default::default()
    };
    FailureRecord::from_run(&repo, &run)
}

fn proposal() -> FixProposal {
    FixProposal {
        source: FixSource::Pattern("outdated-checkout".into()),
        description: "Upgrade actions/checkout to v4".into(),
        change_set: ChangeSet::single(FileEdit::new(".github/workflows/ci.yml", "uses: actions/checkout@v4")),
    }
}

fn manager(writer: Arc<RecordingWriter>, github: Arc<PullRequestOnly>, open_pr: bool) -> CommitManager {
    let config = CommitConfig {
        open_pull_request: open_pr,
        author_name: Some("medic".into()),
        author_email: Some("medic@example.com".into()),
        ..CommitConfig::default()
    };
    CommitManager::new(Box::new(writer), github, &config)
}

#[test]
fn test_branch_name() {
    let manager = manager(Arc::default(), Arc::default(), false);
    assert_eq!(manager.branch_name(&failure(), 2), "medic/build-test-4242-a2");
}

#[test]
fn test_commit_message_carries_correlation_id() {
    let message = commit_message("Upgrade actions/checkout to v4\nextra", "wf-0123", "outdated-checkout");
    assert_eq!(
        message,
        "fix(ci): Upgrade actions/checkout to v4\n\nCorrelation-Id: wf-0123\nFix-Source: outdated-checkout"
    );
}

#[test]
fn test_apply_writes_isolated_branch() {
    let writer = Arc::new(RecordingWriter::default());
    let github = Arc::new(PullRequestOnly::default());
    let manager = manager(writer.clone(), github.clone(), false);
    let failure = failure();

    let applied = manager.apply(&failure, &proposal(), 1, "abc123").unwrap();
    assert_eq!(applied.branch, "medic/build-test-4242-a1");
    assert_eq!(applied.sha, "f1x");
    assert!(applied.pull_request.is_none());

    let requests = writer.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_ne!(request.branch, failure.head_branch);
    assert_eq!(request.base_sha, "abc123");
    assert!(request.message.contains(&failure.correlation_id));
    assert_eq!(request.author.as_ref().unwrap().name, "medic");
    assert!(github.opened.lock().unwrap().is_empty());
}

#[test]
fn test_apply_opens_pull_request() {
    let writer = Arc::new(RecordingWriter::default());
    let github = Arc::new(PullRequestOnly::default());
    let manager = manager(writer, github.clone(), true);

    let applied = manager.apply(&failure(), &proposal(), 1, "abc123").unwrap();
    assert_eq!(applied.pull_request.unwrap().number, 12);

    let opened = github.opened.lock().unwrap();
    assert_eq!(opened[0].head, "medic/build-test-4242-a1");
    assert_eq!(opened[0].base, "main");
    assert!(opened[0].body.contains(&failure().correlation_id));
}

#[test]
fn test_apply_reports_writer_failure() {
    let writer = Arc::new(RecordingWriter {
        fail: true,
        ..Default::default()
    });
    let manager = manager(writer, Arc::default(), true);

    let err = manager.apply(&failure(), &proposal(), 1, "abc123").unwrap_err();
    assert!(err.to_string().contains("permission denied"));
}
