//! Triggering reruns and reading their results.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::MedicError;
use crate::github::GitHubApi;
use crate::models::{FixSource, RerunHandle};
use crate::store::TrackedFailure;

#[derive(Debug, Clone, PartialEq)]
pub enum RerunStatus {
    /// Not finished yet
    Running,
    Succeeded { run_id: u64 },
    /// `run_id` is the failing run to analyse next, if one exists
    Failed { run_id: Option<u64>, reason: String },
}

#[derive(Debug)]
pub enum TriggerResult {
    Triggered(RerunHandle),
    /// The rerun could not be started; counts as a failed attempt
    Refused(String),
}

/// Start the rerun for the latest attempt.
///
/// Rerun-only attempts re-run the failed jobs of the latest failing run.
/// Committed fixes dispatch the workflow on the fix branch; when dispatch is
/// not enabled for the workflow, a pull request's own run is used instead.
/// Transient API errors propagate so the step is retried on a later cycle.
pub fn trigger(
    github: &dyn GitHubApi,
    tracked: &TrackedFailure,
    now: DateTime<Utc>,
) -> Result<TriggerResult, MedicError> {
    let failure = &tracked.failure;
    let Some(attempt) = tracked.attempts.last() else {
        return Ok(TriggerResult::Refused("no fix attempt to rerun".to_string()));
    };

    if attempt.source == FixSource::Rerun {
        let run = github.get_run(&failure.repo, tracked.latest_run_id)?;
        return match github.rerun_failed_jobs(&failure.repo, tracked.latest_run_id) {
            Ok(()) => Ok(TriggerResult::Triggered(RerunHandle::Rerun {
                run_id: tracked.latest_run_id,
                previous_attempt: run.run_attempt,
                triggered_at: now,
            })),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => Ok(TriggerResult::Refused(e.to_string())),
        };
    }

    let Some(branch) = attempt.branch.clone() else {
        return Ok(TriggerResult::Refused(
            "fix attempt has no branch to run".to_string(),
        ));
    };

    let handle = RerunHandle::BranchRun {
        workflow_id: failure.workflow_id,
        branch: branch.clone(),
        triggered_at: now,
    };

    match github.dispatch_workflow(&failure.repo, failure.workflow_id, &branch) {
        Ok(true) => Ok(TriggerResult::Triggered(handle)),
        Ok(false) if attempt.pull_request.is_some() => {
            tracing::info!(
                correlation_id = %failure.correlation_id,
                branch = %branch,
                "workflow has no dispatch trigger, following the pull request run"
            );
            Ok(TriggerResult::Triggered(handle))
        }
        Ok(false) => Ok(TriggerResult::Refused(format!(
            "{} cannot be dispatched and no pull request was opened",
            failure.workflow_path
        ))),
        Err(e) if e.is_transient() => Err(e),
        Err(e) => Ok(TriggerResult::Refused(e.to_string())),
    }
}

/// Look at the run a handle points to.
///
/// A rerun still running after `timeout` counts as failed.
pub fn observe(
    github: &dyn GitHubApi,
    tracked: &TrackedFailure,
    handle: &RerunHandle,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<RerunStatus, MedicError> {
    let repo = &tracked.failure.repo;

    let status = match handle {
        RerunHandle::Rerun {
            run_id,
            previous_attempt,
            ..
        } => {
            let run = github.get_run(repo, *run_id)?;
            if run.run_attempt > *previous_attempt && run.is_completed() {
                completed(run.id, run.is_success(), run.conclusion.as_deref())
            } else {
                RerunStatus::Running
            }
        }
        RerunHandle::BranchRun {
            workflow_id,
            branch,
            ..
        } => {
            let runs = github.list_branch_runs(repo, *workflow_id, branch)?;
            match runs.iter().max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))) {
                Some(run) if run.is_completed() => {
                    completed(run.id, run.is_success(), run.conclusion.as_deref())
                }
                _ => RerunStatus::Running,
            }
        }
    };

    if status == RerunStatus::Running && timed_out(handle, now, timeout) {
        return Ok(RerunStatus::Failed {
            run_id: None,
            reason: format!("rerun did not finish within {}s", timeout.as_secs()),
        });
    }
    Ok(status)
}

fn completed(run_id: u64, success: bool, conclusion: Option<&str>) -> RerunStatus {
    if success {
        RerunStatus::Succeeded { run_id }
    } else {
        RerunStatus::Failed {
            run_id: Some(run_id),
            reason: format!("rerun concluded {}", conclusion.unwrap_or("without a conclusion")),
        }
    }
}

fn timed_out(handle: &RerunHandle, now: DateTime<Utc>, timeout: Duration) -> bool {
    (now - handle.triggered_at())
        .to_std()
        .map(|elapsed| elapsed >= timeout)
        .unwrap_or(false)
}

