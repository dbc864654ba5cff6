//! CommitManager: puts an approved change set on an isolated fix branch.
//!
//! A fix is committed on top of the failing commit (or the previous fix
//! commit when retrying), on a branch of its own. The failed run's branch
//! is never written. Commit failures are reported, not retried; whether to
//! try again is the retry controller's call.

mod git;
mod local;
mod remote;

pub use local::LocalGitWriter;
pub use remote::RemoteWriter;

use anyhow::Result;
use std::sync::Arc;

use crate::config::{CommitConfig, CommitMode};
use crate::github::{CommitAuthor, CommitRequest, CreatedCommit, GitHubApi, PullRequest, PullRequestRequest};
use crate::models::{FailureRecord, FixProposal};
use crate::validation::{slugify, RepoName};

/// Longest workflow slug used in a branch name.
const MAX_BRANCH_SLUG: usize = 40;

/// Creates a branch holding one new commit.
pub trait ChangeWriter: Send + Sync {
    fn name(&self) -> &str;
    fn write(&self, repo: &RepoName, request: &CommitRequest) -> Result<CreatedCommit>;
}

/// Where an applied fix ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedFix {
    pub branch: String,
    pub sha: String,
    pub pull_request: Option<PullRequest>,
}

pub struct CommitManager {
    writer: Box<dyn ChangeWriter>,
    github: Arc<dyn GitHubApi>,
    branch_prefix: String,
    open_pull_request: bool,
    author: Option<CommitAuthor>,
}

impl CommitManager {
    pub fn new(
        writer: Box<dyn ChangeWriter>,
        github: Arc<dyn GitHubApi>,
        config: &CommitConfig,
    ) -> Self {
        let author = match (&config.author_name, &config.author_email) {
            (Some(name), Some(email)) => Some(CommitAuthor {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        };
        Self {
            writer,
            github,
            branch_prefix: config.branch_prefix.clone(),
            open_pull_request: config.open_pull_request,
            author,
        }
    }

    /// Pick the writer for `config.mode`.
    pub fn from_config(config: &CommitConfig, github: Arc<dyn GitHubApi>) -> Result<Self> {
        let writer: Box<dyn ChangeWriter> = match config.mode {
            CommitMode::Api => Box::new(RemoteWriter::new(github.clone())),
            CommitMode::Local => Box::new(LocalGitWriter::new(config.local.clone())?),
        };
        Ok(Self::new(writer, github, config))
    }

    pub fn branch_prefix(&self) -> &str {
        &self.branch_prefix
    }

    pub fn writer_name(&self) -> &str {
        self.writer.name()
    }

    /// `<prefix><workflow-slug>-<run id>-a<attempt>`
    pub fn branch_name(&self, failure: &FailureRecord, attempt: u32) -> String {
        format!(
            "{}{}-{}-a{}",
            self.branch_prefix,
            slugify(&failure.workflow_name, MAX_BRANCH_SLUG),
            failure.run_id,
            attempt
        )
    }

    /// Commit `proposal` on a new branch whose parent is `base_sha`.
    pub fn apply(
        &self,
        failure: &FailureRecord,
        proposal: &FixProposal,
        attempt: u32,
        base_sha: &str,
    ) -> Result<AppliedFix> {
        let request = CommitRequest {
            branch: self.branch_name(failure, attempt),
            base_sha: base_sha.to_string(),
            message: commit_message(
                &proposal.description,
                &failure.correlation_id,
                &proposal.source.to_string(),
            ),
            edits: proposal.change_set.edits.clone(),
            author: self.author.clone(),
        };

        let created = self.writer.write(&failure.repo, &request)?;
        tracing::info!(
            correlation_id = %failure.correlation_id,
            repo = %failure.repo,
            branch = %created.branch,
            sha = %created.sha,
            writer = self.writer.name(),
            "committed fix"
        );

        let pull_request = if self.open_pull_request {
            self.open_pull_request(failure, proposal, &created)
        } else {
            None
        };

        Ok(AppliedFix {
            branch: created.branch,
            sha: created.sha,
            pull_request,
        })
    }

    /// A failed PR does not undo the commit; it is logged and skipped.
    fn open_pull_request(
        &self,
        failure: &FailureRecord,
        proposal: &FixProposal,
        created: &CreatedCommit,
    ) -> Option<PullRequest> {
        let request = PullRequestRequest {
            head: created.branch.clone(),
            base: failure.head_branch.clone(),
            title: format!("fix(ci): {}", proposal.description),
            body: pull_request_body(failure, proposal),
        };

        match self.github.open_pull_request(&failure.repo, &request) {
            Ok(pr) => {
                tracing::info!(
                    correlation_id = %failure.correlation_id,
                    number = pr.number,
                    "opened pull request"
                );
                Some(pr)
            }
            Err(e) => {
                tracing::warn!(
                    correlation_id = %failure.correlation_id,
                    error = %e,
                    "failed to open pull request"
                );
                None
            }
        }
    }
}

pub fn commit_message(description: &str, correlation_id: &str, source: &str) -> String {
    let subject = description.lines().next().unwrap_or("").trim();
    format!("fix(ci): {subject}\n\nCorrelation-Id: {correlation_id}\nFix-Source: {source}")
}

fn pull_request_body(failure: &FailureRecord, proposal: &FixProposal) -> String {
    format!(
        "Automated fix for a failed run of **{}** on `{}`.\n\n\
         - Failed run: {}\n- Fix source: {}\n- Correlation id: `{}`\n\n{}\n",
        failure.workflow_name,
        failure.head_branch,
        failure.html_url,
        proposal.source,
        failure.correlation_id,
        proposal.description
    )
}

#[cfg(test)]
mod tests;
