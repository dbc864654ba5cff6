//! REST v3 implementation of [`GitHubApi`].

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::logs::{concatenate_log_archive, MAX_ARCHIVE_SIZE};
use super::types::{RepoSummary, WorkflowRunPage};
use super::{
    CommitRequest, CreatedCommit, GitHubApi, IssueRef, IssueRequest, PullRequest,
    PullRequestRequest, WorkflowRun,
};
use crate::clock::Clock;
use crate::config::GitHubConfig;
use crate::error::MedicError;
use crate::http::{check_status, create_http_client, download_with_limit, send_with_retry};
use crate::validation::RepoName;

const SERVICE: &str = "github";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 10;
const REQUEST_TIMEOUT_SECS: u64 = 60;
/// Source files larger than this are never rewritten.
const MAX_FILE_DOWNLOAD: u64 = 5 * 1024 * 1024;

pub struct GitHubClient {
    client: Client,
    base: Url,
    token: String,
    conclusions: Vec<String>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    sha: String,
    tree: GitObject,
}

#[derive(Debug, Deserialize)]
struct IssueItem {
    number: u64,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: &str, clock: Arc<dyn Clock>) -> Result<Self, MedicError> {
        let mut base = Url::parse(&config.api_url).map_err(|e| {
            MedicError::InvalidConfig(format!("invalid github.api_url '{}': {e}", config.api_url))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: create_http_client(Duration::from_secs(REQUEST_TIMEOUT_SECS))?,
            base,
            token: token.to_string(),
            conclusions: config.conclusions.clone(),
            clock,
        })
    }

    /// Build an endpoint URL from raw path segments; each is percent-encoded.
    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, MedicError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                MedicError::InvalidConfig(format!("github.api_url cannot be a base: {}", self.base))
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn repo_segments<'a>(repo: &'a RepoName, rest: &[&'a str]) -> Vec<&'a str> {
        let mut segments = vec!["repos", repo.owner(), repo.name()];
        segments.extend_from_slice(rest);
        segments
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, MedicError> {
        send_with_retry(request, SERVICE, self.clock.as_ref())
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, MedicError> {
        let response = check_status(self.send(self.request(Method::GET, url))?, SERVICE)?;
        parse_json(response)
    }

    fn post_json<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &serde_json::Value,
    ) -> Result<T, MedicError> {
        let response = check_status(self.send(self.request(Method::POST, url).json(body))?, SERVICE)?;
        parse_json(response)
    }

    fn list_repositories(&self, segments: &[&str], extra: &[(&str, String)]) -> Result<Vec<RepoName>, MedicError> {
        let mut repos = Vec::new();
        for page in 1..=MAX_PAGES {
            let mut query = vec![
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            query.extend(extra.iter().cloned());
            let batch: Vec<RepoSummary> = self.get_json(self.endpoint(segments, &query)?)?;
            let done = batch.len() < PER_PAGE;
            for summary in batch.into_iter().filter(|r| !r.archived) {
                match summary.full_name.parse::<RepoName>() {
                    Ok(repo) => repos.push(repo),
                    Err(e) => tracing::warn!(error = %e, "skipping repository"),
                }
            }
            if done {
                break;
            }
        }
        Ok(repos)
    }
}

fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, MedicError> {
    response.json::<T>().map_err(|e| MedicError::Api {
        service: SERVICE.to_string(),
        status: 200,
        message: format!("unexpected response body: {e}"),
    })
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl GitHubApi for GitHubClient {
    fn list_org_repositories(&self, org: &str) -> Result<Vec<RepoName>, MedicError> {
        self.list_repositories(&["orgs", org, "repos"], &[("type", "all".to_string())])
    }

    fn list_user_repositories(&self) -> Result<Vec<RepoName>, MedicError> {
        self.list_repositories(&["user", "repos"], &[("affiliation", "owner".to_string())])
    }

    fn list_failed_runs(
        &self,
        repo: &RepoName,
        since: DateTime<Utc>,
    ) -> Result<Vec<WorkflowRun>, MedicError> {
        let segments = Self::repo_segments(repo, &["actions", "runs"]);
        let mut failed = Vec::new();

        for page in 1..=MAX_PAGES {
            let query = [
                ("status", "completed".to_string()),
                ("created", format!(">={}", iso(since))),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let batch: WorkflowRunPage = self.get_json(self.endpoint(&segments, &query)?)?;
            let count = batch.workflow_runs.len();
            let mut reached_edge = false;

            for run in batch.workflow_runs {
                if run.created_at < since {
                    reached_edge = true;
                    continue;
                }
                let failing = run
                    .conclusion
                    .as_deref()
                    .map(|c| self.conclusions.iter().any(|wanted| wanted == c))
                    .unwrap_or(false);
                if failing {
                    failed.push(run);
                }
            }

            if reached_edge || count < PER_PAGE {
                break;
            }
        }

        tracing::debug!(repo = %repo, count = failed.len(), "listed failed runs");
        Ok(failed)
    }

    fn get_run(&self, repo: &RepoName, run_id: u64) -> Result<WorkflowRun, MedicError> {
        let id = run_id.to_string();
        let segments = Self::repo_segments(repo, &["actions", "runs", id.as_str()]);
        self.get_json(self.endpoint(&segments, &[])?)
    }

    fn list_branch_runs(
        &self,
        repo: &RepoName,
        workflow_id: u64,
        branch: &str,
    ) -> Result<Vec<WorkflowRun>, MedicError> {
        let id = workflow_id.to_string();
        let segments = Self::repo_segments(repo, &["actions", "workflows", id.as_str(), "runs"]);
        let query = [("branch", branch.to_string()), ("per_page", "20".to_string())];
        let page: WorkflowRunPage = self.get_json(self.endpoint(&segments, &query)?)?;
        Ok(page.workflow_runs)
    }

    fn fetch_run_logs(&self, repo: &RepoName, run_id: u64) -> Result<String, MedicError> {
        let id = run_id.to_string();
        let segments = Self::repo_segments(repo, &["actions", "runs", id.as_str(), "logs"]);
        let url = self.endpoint(&segments, &[])?;

        // The API answers with a redirect to blob storage; reqwest drops the
        // Authorization header when the host changes.
        let response = check_status(self.send(self.request(Method::GET, url))?, SERVICE)?;
        let bytes = download_with_limit(response, MAX_ARCHIVE_SIZE, "run logs")?;
        concatenate_log_archive(&bytes)
    }

    fn fetch_file(
        &self,
        repo: &RepoName,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, MedicError> {
        let segments = Self::repo_segments(repo, &["contents", path]);
        let url = self.endpoint(&segments, &[("ref", git_ref.to_string())])?;
        let request = self
            .request(Method::GET, url)
            .header("Accept", "application/vnd.github.raw+json");

        let response = self.send(request)?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = check_status(response, SERVICE)?;
        let bytes = download_with_limit(response, MAX_FILE_DOWNLOAD, path)?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| MedicError::Api {
                service: SERVICE.to_string(),
                status: 200,
                message: format!("{path} is not valid UTF-8"),
            })
    }

    fn create_branch_commit(
        &self,
        repo: &RepoName,
        request: &CommitRequest,
    ) -> Result<CreatedCommit, MedicError> {
        let base: GitCommit = self.get_json(
            self.endpoint(&Self::repo_segments(repo, &["git", "commits", request.base_sha.as_str()]), &[])?,
        )?;

        let entries: Vec<serde_json::Value> = request
            .edits
            .iter()
            .map(|edit| {
                json!({
                    "path": edit.path,
                    "mode": "100644",
                    "type": "blob",
                    "content": edit.content,
                })
            })
            .collect();
        let tree: GitObject = self.post_json(
            self.endpoint(&Self::repo_segments(repo, &["git", "trees"]), &[])?,
            &json!({ "base_tree": base.tree.sha, "tree": entries }),
        )?;

        let mut commit_body = json!({
            "message": request.message,
            "tree": tree.sha,
            "parents": [base.sha],
        });
        if let Some(author) = &request.author {
            commit_body["author"] = json!({ "name": author.name, "email": author.email });
        }
        let commit: GitObject = self.post_json(
            self.endpoint(&Self::repo_segments(repo, &["git", "commits"]), &[])?,
            &commit_body,
        )?;

        // The branch only appears once its commit exists.
        let _: serde_json::Value = self.post_json(
            self.endpoint(&Self::repo_segments(repo, &["git", "refs"]), &[])?,
            &json!({ "ref": format!("refs/heads/{}", request.branch), "sha": commit.sha }),
        )?;

        tracing::info!(repo = %repo, branch = %request.branch, sha = %commit.sha, "created fix commit");
        Ok(CreatedCommit {
            branch: request.branch.clone(),
            sha: commit.sha,
        })
    }

    fn open_pull_request(
        &self,
        repo: &RepoName,
        request: &PullRequestRequest,
    ) -> Result<PullRequest, MedicError> {
        self.post_json(
            self.endpoint(&Self::repo_segments(repo, &["pulls"]), &[])?,
            &json!({
                "title": request.title,
                "head": request.head,
                "base": request.base,
                "body": request.body,
            }),
        )
    }

    fn rerun_failed_jobs(&self, repo: &RepoName, run_id: u64) -> Result<(), MedicError> {
        let id = run_id.to_string();
        let segments = Self::repo_segments(repo, &["actions", "runs", id.as_str(), "rerun-failed-jobs"]);
        let url = self.endpoint(&segments, &[])?;
        check_status(self.send(self.request(Method::POST, url))?, SERVICE)?;
        Ok(())
    }

    fn dispatch_workflow(
        &self,
        repo: &RepoName,
        workflow_id: u64,
        branch: &str,
    ) -> Result<bool, MedicError> {
        let id = workflow_id.to_string();
        let segments = Self::repo_segments(repo, &["actions", "workflows", id.as_str(), "dispatches"]);
        let url = self.endpoint(&segments, &[])?;
        let response = self.send(self.request(Method::POST, url).json(&json!({ "ref": branch })))?;

        match check_status(response, SERVICE) {
            Ok(_) => Ok(true),
            // "Workflow does not have 'workflow_dispatch' trigger"
            Err(e) if e.status() == Some(422) => {
                tracing::debug!(repo = %repo, workflow_id, error = %e, "workflow is not dispatchable");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn find_issue_with_marker(
        &self,
        repo: &RepoName,
        label: &str,
        marker: &str,
    ) -> Result<Option<IssueRef>, MedicError> {
        let segments = Self::repo_segments(repo, &["issues"]);
        for page in 1..=MAX_PAGES {
            let query = [
                ("labels", label.to_string()),
                ("state", "all".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let batch: Vec<IssueItem> = self.get_json(self.endpoint(&segments, &query)?)?;
            let done = batch.len() < PER_PAGE;
            let found = batch.into_iter().find(|issue| {
                issue.pull_request.is_none()
                    && issue.body.as_deref().is_some_and(|b| b.contains(marker))
            });
            if let Some(issue) = found {
                return Ok(Some(IssueRef {
                    number: issue.number,
                    html_url: issue.html_url,
                    state: issue.state,
                    body: issue.body,
                }));
            }
            if done {
                break;
            }
        }
        Ok(None)
    }

    fn ensure_label(
        &self,
        repo: &RepoName,
        label: &str,
        color: &str,
        description: &str,
    ) -> Result<(), MedicError> {
        let url = self.endpoint(&Self::repo_segments(repo, &["labels", label]), &[])?;
        let response = self.send(self.request(Method::GET, url))?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status().as_u16() != 404 {
            check_status(response, SERVICE)?;
            return Ok(());
        }

        let url = self.endpoint(&Self::repo_segments(repo, &["labels"]), &[])?;
        let body = json!({ "name": label, "color": color, "description": description });
        match check_status(self.send(self.request(Method::POST, url).json(&body))?, SERVICE) {
            Ok(_) => Ok(()),
            // Created concurrently by someone else.
            Err(e) if e.status() == Some(422) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn create_issue(&self, repo: &RepoName, request: &IssueRequest) -> Result<IssueRef, MedicError> {
        let url = self.endpoint(&Self::repo_segments(repo, &["issues"]), &[])?;
        let body = json!({
            "title": request.title,
            "body": request.body,
            "labels": request.labels,
            "assignees": request.assignees,
        });

        match self.post_json(url.clone(), &body) {
            Err(e) if e.status() == Some(422) && !request.assignees.is_empty() => {
                tracing::warn!(repo = %repo, error = %e, "issue rejected with assignees, retrying without");
                let mut body = body;
                body["assignees"] = json!([]);
                self.post_json(url, &body)
            }
            other => other,
        }
    }
}
