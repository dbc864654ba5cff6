//! In-memory GitHub and model fakes shared by the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use medic::analyzer::SYSTEM_PROMPT as DIAGNOSIS_PROMPT;
use medic::clock::ManualClock;
use medic::error::MedicError;
use medic::github::{
    CommitRequest, CreatedCommit, GitHubApi, IssueRef, IssueRequest, PullRequest,
    PullRequestRequest, WorkflowRun,
};
use medic::llm::{LlmBackend, LlmRequest, LlmResponse};
use medic::validation::RepoName;

pub const WORKFLOW_PATH: &str = ".github/workflows/ci.yml";
pub const WORKFLOW_ID: u64 = 7;
pub const BASE_SHA: &str = "base0000";

pub const OUTDATED_WORKFLOW: &str = "name: CI\non: [push, workflow_dispatch]\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/checkout@v2\n      - run: npm test\n";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn repo() -> RepoName {
    "octo/app".parse().unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

/// A failed run of the CI workflow on `main`, created `minutes_ago` before
/// the test start time.
pub fn failed_run(id: u64, minutes_ago: i64) -> WorkflowRun {
    WorkflowRun {
        id,
        name: Some("CI".to_string()),
        workflow_id: WORKFLOW_ID,
        path: WORKFLOW_PATH.to_string(),
        head_branch: Some("main".to_string()),
        head_sha: BASE_SHA.to_string(),
        event: "push".to_string(),
        status: Some("completed".to_string()),
        conclusion: Some("failure".to_string()),
        html_url: format!("https://github.com/octo/app/actions/runs/{id}"),
        run_attempt: 1,
        created_at: start_time() - Duration::minutes(minutes_ago),
        head_commit: None,
    }
}

/// What a triggered run ends up as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunScript {
    Success,
    Failure,
    /// Stays `in_progress` until completed by the test
    Pending,
}

#[derive(Debug, Clone)]
pub struct StoredIssue {
    pub issue: IssueRef,
    pub title: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

#[derive(Default)]
struct State {
    failed: Vec<WorkflowRun>,
    runs: HashMap<u64, WorkflowRun>,
    branch_runs: Vec<WorkflowRun>,
    logs: HashMap<u64, String>,
    default_log: String,
    files: HashMap<String, String>,
    /// sha -> (parent, edits)
    commits: HashMap<String, (String, Vec<(String, String)>)>,
    commit_requests: Vec<CommitRequest>,
    pull_requests: Vec<PullRequestRequest>,
    outcomes: VecDeque<RunScript>,
    dispatch_enabled: bool,
    /// Upcoming commit and dispatch calls that fail with a 503
    failing_commits: usize,
    failing_dispatches: usize,
    dispatches: Vec<String>,
    reruns: Vec<u64>,
    labels: Vec<String>,
    issues: Vec<StoredIssue>,
    next_id: u64,
}

pub struct FakeGitHub {
    state: Mutex<State>,
}

impl Default for FakeGitHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                dispatch_enabled: true,
                next_id: 5000,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_failed_run(&self, run: WorkflowRun) {
        let mut state = self.state();
        state.runs.insert(run.id, run.clone());
        state.failed.push(run);
    }

    pub fn set_file(&self, path: &str, content: &str) {
        self.state().files.insert(path.to_string(), content.to_string());
    }

    pub fn set_log(&self, run_id: u64, text: &str) {
        self.state().logs.insert(run_id, text.to_string());
    }

    /// Log text of every run without its own log.
    pub fn set_default_log(&self, text: &str) {
        self.state().default_log = text.to_string();
    }

    /// Outcomes of the next triggered runs, in order. Unscripted runs succeed.
    pub fn script_runs(&self, outcomes: &[RunScript]) {
        self.state().outcomes.extend(outcomes.iter().copied());
    }

    pub fn disable_dispatch(&self) {
        self.state().dispatch_enabled = false;
    }

    /// Fail the next `n` commit creations as if GitHub were unavailable.
    pub fn fail_commits(&self, n: usize) {
        self.state().failing_commits = n;
    }

    /// Fail the next `n` workflow dispatches as if GitHub were unavailable.
    pub fn fail_dispatches(&self, n: usize) {
        self.state().failing_dispatches = n;
    }

    /// Finish every pending run with `success`.
    pub fn complete_pending_runs(&self, success: bool) {
        let mut guard = self.state();
        let state = &mut *guard;
        let conclusion = if success { "success" } else { "failure" };
        let finish = |run: &mut WorkflowRun| {
            if run.status.as_deref() != Some("completed") {
                run.status = Some("completed".to_string());
                run.conclusion = Some(conclusion.to_string());
            }
        };
        state.branch_runs.iter_mut().for_each(finish);
        state.runs.values_mut().for_each(finish);
    }

    pub fn commit_requests(&self) -> Vec<CommitRequest> {
        self.state().commit_requests.clone()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestRequest> {
        self.state().pull_requests.clone()
    }

    pub fn dispatches(&self) -> Vec<String> {
        self.state().dispatches.clone()
    }

    pub fn reruns(&self) -> Vec<u64> {
        self.state().reruns.clone()
    }

    pub fn issues(&self) -> Vec<StoredIssue> {
        self.state().issues.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.state().labels.clone()
    }

    fn next_id(state: &mut State) -> u64 {
        state.next_id += 1;
        state.next_id
    }

    fn apply_script(state: &mut State, run: &mut WorkflowRun) {
        match state.outcomes.pop_front().unwrap_or(RunScript::Success) {
            RunScript::Success => {
                run.status = Some("completed".to_string());
                run.conclusion = Some("success".to_string());
            }
            RunScript::Failure => {
                run.status = Some("completed".to_string());
                run.conclusion = Some("failure".to_string());
            }
            RunScript::Pending => {
                run.status = Some("in_progress".to_string());
                run.conclusion = None;
            }
        }
    }

    fn file_at(state: &State, path: &str, git_ref: &str) -> Option<String> {
        let mut current = git_ref.to_string();
        while let Some((parent, edits)) = state.commits.get(&current) {
            if let Some((_, content)) = edits.iter().find(|(p, _)| p == path) {
                return Some(content.clone());
            }
            current = parent.clone();
        }
        state.files.get(path).cloned()
    }
}

fn not_found(what: &str) -> MedicError {
    MedicError::Api {
        service: "GitHub".to_string(),
        status: 404,
        message: format!("{what} not found"),
    }
}

fn unavailable() -> MedicError {
    MedicError::TransientExternal {
        service: "GitHub".to_string(),
        message: "HTTP 503".to_string(),
    }
}

impl GitHubApi for FakeGitHub {
    fn list_org_repositories(&self, _org: &str) -> Result<Vec<RepoName>, MedicError> {
        Ok(vec![repo()])
    }

    fn list_user_repositories(&self) -> Result<Vec<RepoName>, MedicError> {
        Ok(vec![repo()])
    }

    fn list_failed_runs(
        &self,
        _repo: &RepoName,
        since: DateTime<Utc>,
    ) -> Result<Vec<WorkflowRun>, MedicError> {
        let mut runs: Vec<WorkflowRun> = self
            .state()
            .failed
            .iter()
            .filter(|r| r.created_at >= since)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    fn get_run(&self, _repo: &RepoName, run_id: u64) -> Result<WorkflowRun, MedicError> {
        self.state()
            .runs
            .get(&run_id)
            .cloned()
            .ok_or_else(|| not_found("run"))
    }

    fn list_branch_runs(
        &self,
        _repo: &RepoName,
        workflow_id: u64,
        branch: &str,
    ) -> Result<Vec<WorkflowRun>, MedicError> {
        let mut runs: Vec<WorkflowRun> = self
            .state()
            .branch_runs
            .iter()
            .filter(|r| r.workflow_id == workflow_id && r.branch() == branch)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(runs)
    }

    fn fetch_run_logs(&self, _repo: &RepoName, run_id: u64) -> Result<String, MedicError> {
        let state = self.state();
        Ok(state
            .logs
            .get(&run_id)
            .cloned()
            .unwrap_or_else(|| state.default_log.clone()))
    }

    fn fetch_file(
        &self,
        _repo: &RepoName,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, MedicError> {
        Ok(Self::file_at(&self.state(), path, git_ref))
    }

    fn create_branch_commit(
        &self,
        _repo: &RepoName,
        request: &CommitRequest,
    ) -> Result<CreatedCommit, MedicError> {
        let mut state = self.state();
        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(unavailable());
        }
        if state.commit_requests.iter().any(|c| c.branch == request.branch) {
            return Err(MedicError::Api {
                service: "GitHub".to_string(),
                status: 422,
                message: "Reference already exists".to_string(),
            });
        }
        let sha = format!("fix{:04}", state.commit_requests.len() + 1);
        let edits = request
            .edits
            .iter()
            .map(|e| (e.path.clone(), e.content.clone()))
            .collect();
        state
            .commits
            .insert(sha.clone(), (request.base_sha.clone(), edits));
        state.commit_requests.push(request.clone());
        Ok(CreatedCommit {
            branch: request.branch.clone(),
            sha,
        })
    }

    fn open_pull_request(
        &self,
        _repo: &RepoName,
        request: &PullRequestRequest,
    ) -> Result<PullRequest, MedicError> {
        let mut state = self.state();
        state.pull_requests.push(request.clone());
        let number = state.pull_requests.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!("https://github.com/octo/app/pull/{number}"),
        })
    }

    fn rerun_failed_jobs(&self, _repo: &RepoName, run_id: u64) -> Result<(), MedicError> {
        let mut state = self.state();
        let mut run = state
            .runs
            .get(&run_id)
            .cloned()
            .ok_or_else(|| not_found("run"))?;
        run.run_attempt += 1;
        Self::apply_script(&mut state, &mut run);
        state.reruns.push(run_id);
        state.runs.insert(run_id, run);
        Ok(())
    }

    fn dispatch_workflow(
        &self,
        _repo: &RepoName,
        workflow_id: u64,
        branch: &str,
    ) -> Result<bool, MedicError> {
        let mut state = self.state();
        if state.failing_dispatches > 0 {
            state.failing_dispatches -= 1;
            return Err(unavailable());
        }
        if !state.dispatch_enabled {
            return Ok(false);
        }
        state.dispatches.push(branch.to_string());

        let id = Self::next_id(&mut state);
        let mut run = failed_run(id, 0);
        run.workflow_id = workflow_id;
        run.head_branch = Some(branch.to_string());
        run.event = "workflow_dispatch".to_string();
        run.created_at = start_time() + Duration::seconds(id as i64);
        Self::apply_script(&mut state, &mut run);

        if run.conclusion.as_deref() == Some("failure") {
            state.failed.push(run.clone());
        }
        state.runs.insert(id, run.clone());
        state.branch_runs.push(run);
        Ok(true)
    }

    fn find_issue_with_marker(
        &self,
        _repo: &RepoName,
        label: &str,
        marker: &str,
    ) -> Result<Option<IssueRef>, MedicError> {
        Ok(self
            .state()
            .issues
            .iter()
            .find(|i| {
                i.labels.iter().any(|l| l == label)
                    && i.issue.body.as_deref().is_some_and(|b| b.contains(marker))
            })
            .map(|i| i.issue.clone()))
    }

    fn ensure_label(
        &self,
        _repo: &RepoName,
        label: &str,
        _color: &str,
        _description: &str,
    ) -> Result<(), MedicError> {
        let mut state = self.state();
        if !state.labels.iter().any(|l| l == label) {
            state.labels.push(label.to_string());
        }
        Ok(())
    }

    fn create_issue(&self, _repo: &RepoName, request: &IssueRequest) -> Result<IssueRef, MedicError> {
        let mut state = self.state();
        let number = state.issues.len() as u64 + 1;
        let issue = IssueRef {
            number,
            html_url: format!("https://github.com/octo/app/issues/{number}"),
            state: "open".to_string(),
            body: Some(request.body.clone()),
        };
        state.issues.push(StoredIssue {
            issue: issue.clone(),
            title: request.title.clone(),
            labels: request.labels.clone(),
            assignees: request.assignees.clone(),
        });
        Ok(issue)
    }
}

/// Model fake: one fixed reply for diagnosis requests, one for fix requests.
pub struct ScriptedLlm {
    diagnosis: String,
    fix: String,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(diagnosis: &str, fix: &str) -> Self {
        Self {
            diagnosis: diagnosis.to_string(),
            fix: fix.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn diagnosis_calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system_prompt.as_deref() == Some(DIAGNOSIS_PROMPT))
            .count()
    }

    pub fn fix_calls(&self) -> usize {
        let total = self.requests.lock().unwrap().len();
        total - self.diagnosis_calls()
    }
}

impl LlmBackend for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, MedicError> {
        self.requests.lock().unwrap().push(request.clone());
        let content = if request.system_prompt.as_deref() == Some(DIAGNOSIS_PROMPT) {
            self.diagnosis.clone()
        } else {
            self.fix.clone()
        };
        Ok(LlmResponse {
            content,
            model: "scripted-1".to_string(),
            input_tokens: None,
            output_tokens: None,
        })
    }
}

pub fn diagnosis_json(category: &str, confidence: f64) -> String {
    format!(
        r#"{{"category": "{category}", "summary": "Build broke", "root_cause": "Something changed", "suggested_fix": "Change it back", "confidence": {confidence}, "requires_manual_intervention": false, "relevant_files": []}}"#
    )
}

pub fn fix_json(path: &str, content: &str) -> String {
    serde_json::json!({
        "description": format!("Update {path}"),
        "edits": [{"path": path, "content": content}],
    })
    .to_string()
}
