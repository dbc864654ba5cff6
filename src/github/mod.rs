//! The GitHub capability.
//!
//! Everything the pipeline needs from GitHub sits behind [`GitHubApi`] so the
//! monitor can be driven by an in-memory fake. [`GitHubClient`] is the REST
//! implementation.

mod client;
pub mod logs;
mod types;

pub use client::GitHubClient;
pub use types::{
    CommitAuthor, CommitRequest, CreatedCommit, HeadCommit, IssueRef, IssueRequest, PullRequest,
    PullRequestRequest, WorkflowRun,
};

use chrono::{DateTime, Utc};

use crate::error::MedicError;
use crate::validation::RepoName;

pub trait GitHubApi: Send + Sync {
    /// Non-archived repositories of an organisation.
    fn list_org_repositories(&self, org: &str) -> Result<Vec<RepoName>, MedicError>;

    /// Non-archived repositories the token's user owns.
    fn list_user_repositories(&self) -> Result<Vec<RepoName>, MedicError>;

    /// Completed runs with a failing conclusion created at or after `since`,
    /// newest first.
    fn list_failed_runs(
        &self,
        repo: &RepoName,
        since: DateTime<Utc>,
    ) -> Result<Vec<WorkflowRun>, MedicError>;

    fn get_run(&self, repo: &RepoName, run_id: u64) -> Result<WorkflowRun, MedicError>;

    /// Runs of one workflow on one branch, newest first.
    fn list_branch_runs(
        &self,
        repo: &RepoName,
        workflow_id: u64,
        branch: &str,
    ) -> Result<Vec<WorkflowRun>, MedicError>;

    /// The run's logs as one text blob.
    fn fetch_run_logs(&self, repo: &RepoName, run_id: u64) -> Result<String, MedicError>;

    /// File content at `git_ref`, `None` when the file does not exist.
    fn fetch_file(
        &self,
        repo: &RepoName,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, MedicError>;

    /// Create `request.branch` pointing at a new commit on top of
    /// `request.base_sha`. The branch must not exist yet.
    fn create_branch_commit(
        &self,
        repo: &RepoName,
        request: &CommitRequest,
    ) -> Result<CreatedCommit, MedicError>;

    fn open_pull_request(
        &self,
        repo: &RepoName,
        request: &PullRequestRequest,
    ) -> Result<PullRequest, MedicError>;

    fn rerun_failed_jobs(&self, repo: &RepoName, run_id: u64) -> Result<(), MedicError>;

    /// Trigger `workflow_dispatch`. `Ok(false)` when the workflow has no
    /// dispatch trigger.
    fn dispatch_workflow(
        &self,
        repo: &RepoName,
        workflow_id: u64,
        branch: &str,
    ) -> Result<bool, MedicError>;

    /// An issue (open or closed) carrying `label` whose body contains `marker`.
    fn find_issue_with_marker(
        &self,
        repo: &RepoName,
        label: &str,
        marker: &str,
    ) -> Result<Option<IssueRef>, MedicError>;

    /// Create the label unless it already exists.
    fn ensure_label(
        &self,
        repo: &RepoName,
        label: &str,
        color: &str,
        description: &str,
    ) -> Result<(), MedicError>;

    fn create_issue(&self, repo: &RepoName, request: &IssueRequest) -> Result<IssueRef, MedicError>;
}
