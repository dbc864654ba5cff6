use anyhow::{Context, Result};
use std::sync::Arc;

use super::ChangeWriter;
use crate::github::{CommitRequest, CreatedCommit, GitHubApi};
use crate::validation::RepoName;

/// Writes fix commits through the GitHub git data API. Nothing is cloned.
pub struct RemoteWriter {
    github: Arc<dyn GitHubApi>,
}

impl RemoteWriter {
    pub fn new(github: Arc<dyn GitHubApi>) -> Self {
        Self { github }
    }
}

impl ChangeWriter for RemoteWriter {
    fn name(&self) -> &str {
        "api"
    }

    fn write(&self, repo: &RepoName, request: &CommitRequest) -> Result<CreatedCommit> {
        self.github
            .create_branch_commit(repo, request)
            .with_context(|| format!("Failed to create {} on {repo}", request.branch))
    }
}
