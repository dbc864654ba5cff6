use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::github::WorkflowRun;
use crate::validation::RepoName;

/// Stable id for a failed run: `wf-` + 16 hex chars of SHA-256 over
/// `owner/name#run_id`. Reruns of the same run keep the id.
pub fn correlation_id(repo: &RepoName, run_id: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}#{}", repo.full_name(), run_id).as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("wf-{}", &digest[..16])
}

/// One failed workflow run. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub correlation_id: String,
    pub repo: RepoName,
    pub run_id: u64,
    pub run_attempt: u32,
    pub workflow_id: u64,
    pub workflow_name: String,
    /// Workflow file the run executed, e.g. `.github/workflows/ci.yml`
    pub workflow_path: String,
    pub head_branch: String,
    pub head_sha: String,
    pub event: String,
    pub conclusion: String,
    pub html_url: String,
    #[serde(default)]
    pub commit_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// API path of the run's log archive
    pub logs_ref: String,
}

impl FailureRecord {
    pub fn from_run(repo: &RepoName, run: &WorkflowRun) -> Self {
        Self {
            correlation_id: correlation_id(repo, run.id),
            repo: repo.clone(),
            run_id: run.id,
            run_attempt: run.run_attempt,
            workflow_id: run.workflow_id,
            workflow_name: run.workflow_name().to_string(),
            workflow_path: run.workflow_file().to_string(),
            head_branch: run.branch().to_string(),
            head_sha: run.head_sha.clone(),
            event: run.event.clone(),
            conclusion: run.conclusion.clone().unwrap_or_else(|| "failure".into()),
            html_url: run.html_url.clone(),
            commit_message: run.commit_message().map(String::from),
            created_at: run.created_at,
            logs_ref: format!("repos/{}/actions/runs/{}/logs", repo.full_name(), run.id),
        }
    }

    pub fn timed_out(&self) -> bool {
        self.conclusion == "timed_out"
    }
}
