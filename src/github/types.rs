use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FileEdit;

/// One workflow run as returned by the Actions API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub workflow_id: u64,
    /// Workflow file, sometimes suffixed with `@<ref>` for reusable workflows
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default = "default_run_attempt")]
    pub run_attempt: u32,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
}

fn default_run_attempt() -> u32 {
    1
}

impl WorkflowRun {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }

    pub fn is_success(&self) -> bool {
        self.is_completed() && self.conclusion.as_deref() == Some("success")
    }

    pub fn workflow_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    pub fn branch(&self) -> &str {
        self.head_branch.as_deref().unwrap_or("")
    }

    /// Repository path of the workflow file, without any `@ref` suffix.
    pub fn workflow_file(&self) -> &str {
        self.path.split('@').next().unwrap_or(&self.path)
    }

    pub fn commit_message(&self) -> Option<&str> {
        self.head_commit.as_ref().map(|c| c.message.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkflowRunPage {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepoSummary {
    pub full_name: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// A commit to create on a brand-new branch.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    pub branch: String,
    /// Parent commit; the new branch starts here
    pub base_sha: String,
    pub message: String,
    pub edits: Vec<FileEdit>,
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedCommit {
    pub branch: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_run_deserialize() {
        let json = r#"{
            "id": 42,
            "name": "CI",
            "workflow_id": 7,
            "path": ".github/workflows/ci.yml@refs/heads/main",
            "head_branch": "main",
            "head_sha": "abc123",
            "event": "push",
            "status": "completed",
            "conclusion": "failure",
            "html_url": "https://github.com/octo/app/actions/runs/42",
            "created_at": "2026-03-01T10:00:00Z",
            "head_commit": {"message": "bump deps"},
            "extra_field": true
        }"#;

        let run: WorkflowRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.id, 42);
        assert_eq!(run.workflow_name(), "CI");
        assert_eq!(run.workflow_file(), ".github/workflows/ci.yml");
        assert_eq!(run.branch(), "main");
        assert_eq!(run.run_attempt, 1);
        assert_eq!(run.commit_message(), Some("bump deps"));
        assert!(run.is_completed());
        assert!(!run.is_success());
    }
}
