//! Driving one tracked failure through the retry state machine.
//!
//! Each step performs one side effect, feeds its outcome to the controller
//! and persists the record, so an interrupted cycle resumes where it
//! stopped.

use anyhow::{Context, Result};
use std::time::Duration;

use super::rerun::{self, RerunStatus, TriggerResult};
use super::Monitor;
use crate::analyzer::{extract_excerpt, strip_timestamps, AnalysisContext};
use crate::error::ErrorClass;
use crate::fixes::{FixRequest, Proposal};
use crate::models::{
    AttemptOutcome, Diagnosis, EscalationReason, FailureRecord, FixAttempt, FixProposal,
};
use crate::notify::IssueContent;
use crate::retry::{RetryEvent, RetryPhase};
use crate::store::TrackedFailure;

/// Candidate files besides the workflow shown to the model.
const MAX_RELEVANT_FILES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Succeeded,
    Escalated,
    /// Waiting on a backoff or a rerun beyond the inline wait budget
    Deferred,
}

impl Monitor {
    pub(super) fn drive(&self, tracked: &mut TrackedFailure) -> Result<DriveOutcome> {
        let mut waited = Duration::ZERO;

        loop {
            tracked.updated_at = self.clock.now();
            self.store.save(tracked)?;

            match tracked.phase().clone() {
                RetryPhase::Succeeded => {
                    tracing::info!(
                        correlation_id = %tracked.correlation_id(),
                        repo = %tracked.failure.repo,
                        workflow = %tracked.failure.workflow_name,
                        attempts = tracked.retry.attempts_made(),
                        "workflow fixed"
                    );
                    return Ok(DriveOutcome::Succeeded);
                }
                RetryPhase::Exhausted { reason } => {
                    self.escalate(tracked, reason)?;
                    tracked.updated_at = self.clock.now();
                    self.store.save(tracked)?;
                    return Ok(DriveOutcome::Escalated);
                }
                RetryPhase::Retry { not_before } => {
                    let remaining = (not_before - self.clock.now())
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    if !self.wait_inline(&mut waited, remaining) {
                        tracked.deferred_until = Some(not_before);
                        self.store.save(tracked)?;
                        tracing::info!(
                            correlation_id = %tracked.correlation_id(),
                            not_before = %not_before,
                            "retry deferred to a later run"
                        );
                        return Ok(DriveOutcome::Deferred);
                    }
                    self.controller
                        .resume_if_due(&mut tracked.retry, self.clock.now())?;
                }
                RetryPhase::Pending => self.attempt_fix(tracked)?,
                RetryPhase::FixApplied => self.start_rerun(tracked)?,
                RetryPhase::AwaitingRerunResult => {
                    if !self.await_rerun(tracked, &mut waited)? {
                        self.store.save(tracked)?;
                        return Ok(DriveOutcome::Deferred);
                    }
                }
            }

            tracked.deferred_until = None;
        }
    }

    /// Sleep for `needed` if the per-failure budget allows it.
    fn wait_inline(&self, waited: &mut Duration, needed: Duration) -> bool {
        if *waited + needed > self.settings.max_inline_wait {
            return false;
        }
        if !needed.is_zero() {
            self.clock.sleep(needed);
        }
        *waited += needed;
        true
    }

    fn apply(&self, tracked: &mut TrackedFailure, event: RetryEvent) -> Result<()> {
        self.controller
            .apply(&mut tracked.retry, event, self.clock.now())?;
        Ok(())
    }

    /// Feed a remediation setback to the controller.
    fn record_setback(&self, tracked: &mut TrackedFailure, class: ErrorClass) -> Result<()> {
        let Some(event) = class.retry_event() else {
            anyhow::bail!("{class} does not settle phase {}", tracked.phase());
        };
        tracing::info!(
            correlation_id = %tracked.correlation_id(),
            class = %class,
            consumes_attempt = class.consumes_attempt(),
            escalates = class.escalates_immediately(),
            "remediation setback"
        );
        self.apply(tracked, event)
    }

    fn attempt_fix(&self, tracked: &mut TrackedFailure) -> Result<()> {
        let failure = tracked.failure.clone();

        let logs = match self.github.fetch_run_logs(&failure.repo, tracked.latest_run_id) {
            Ok(text) => text,
            Err(e) if e.is_transient() => {
                return Err(e).with_context(|| {
                    format!("Failed to download logs of run {}", tracked.latest_run_id)
                })
            }
            Err(e) => {
                tracing::warn!(
                    correlation_id = %failure.correlation_id,
                    run_id = tracked.latest_run_id,
                    error = %e,
                    "run logs unavailable, analysing without them"
                );
                String::new()
            }
        };

        let workflow_file = self
            .github
            .fetch_file(&failure.repo, &failure.workflow_path, &tracked.fix_base_sha)
            .with_context(|| format!("Failed to fetch {}", failure.workflow_path))?;

        let diagnosis = self.analyzer.analyze(
            &logs,
            &AnalysisContext {
                workflow_name: &failure.workflow_name,
                workflow_file: workflow_file.as_deref(),
                commit_message: failure.commit_message.as_deref(),
            },
        );
        if diagnosis.is_unknown() {
            tracing::info!(
                correlation_id = %failure.correlation_id,
                class = %ErrorClass::UnknownDiagnosis,
                "diagnosis unknown, only fix patterns apply"
            );
        }
        let log_text = strip_timestamps(&logs);
        let excerpt = extract_excerpt(&logs);
        let extra_files = self.relevant_files(&failure, &diagnosis, &tracked.fix_base_sha);

        let proposal = self.generator.propose(&FixRequest {
            failure: &failure,
            diagnosis: &diagnosis,
            log_text: &log_text,
            error_text: &excerpt.text,
            workflow_file: workflow_file.as_deref(),
            extra_files: &extra_files,
            previous_attempts: &tracked.attempts,
        });
        tracked.diagnosis = Some(diagnosis);

        let number = tracked.next_attempt_number();
        match proposal {
            Proposal::Ready(proposal) if proposal.is_rerun_only() => {
                let attempt = self.new_attempt(number, &proposal, AttemptOutcome::Applied, tracked);
                tracked.attempts.push(attempt);
                self.apply(tracked, RetryEvent::FixCommitted)
            }
            Proposal::Ready(proposal) => {
                match self
                    .committer
                    .apply(&failure, &proposal, number, &tracked.fix_base_sha)
                {
                    Ok(applied) => {
                        let mut attempt =
                            self.new_attempt(number, &proposal, AttemptOutcome::Applied, tracked);
                        attempt.branch = Some(applied.branch.clone());
                        attempt.commit_sha = Some(applied.sha.clone());
                        attempt.pull_request = applied.pull_request.as_ref().map(|pr| pr.number);
                        tracked.attempts.push(attempt);
                        tracked.fix_base_sha = applied.sha;
                        tracked.fix_branch = Some(applied.branch);
                        self.apply(tracked, RetryEvent::FixCommitted)
                    }
                    Err(e) => {
                        let class = ErrorClass::of_apply_error(&e);
                        if class == ErrorClass::TransientExternal {
                            // Nothing was recorded; the next cycle retries from pending.
                            return Err(e).context("Failed to apply fix");
                        }
                        tracing::warn!(
                            correlation_id = %failure.correlation_id,
                            error = %e,
                            "failed to apply fix"
                        );
                        let mut attempt = self.new_attempt(
                            number,
                            &proposal,
                            AttemptOutcome::FailedToApply,
                            tracked,
                        );
                        attempt.detail = Some(format!("{e:#}"));
                        tracked.attempts.push(attempt);
                        self.record_setback(tracked, class)
                    }
                }
            }
            Proposal::Unsafe {
                proposal,
                violations,
            } => {
                let mut attempt =
                    self.new_attempt(number, &proposal, AttemptOutcome::RejectedUnsafe, tracked);
                attempt.detail = Some(violations.join("\n"));
                tracked.attempts.push(attempt);
                self.record_setback(tracked, ErrorClass::UnsafeFix)
            }
            Proposal::NoFix { reason } => {
                tracing::info!(
                    correlation_id = %failure.correlation_id,
                    reason = %reason,
                    "no fix available"
                );
                self.record_setback(tracked, ErrorClass::NoFixAvailable)
            }
        }
    }

    fn new_attempt(
        &self,
        number: u32,
        proposal: &FixProposal,
        outcome: AttemptOutcome,
        tracked: &TrackedFailure,
    ) -> FixAttempt {
        FixAttempt {
            number,
            source: proposal.source.clone(),
            description: proposal.description.clone(),
            change_set: proposal.change_set.clone(),
            outcome,
            run_id: tracked.latest_run_id,
            branch: None,
            commit_sha: None,
            pull_request: None,
            detail: None,
            recorded_at: self.clock.now(),
        }
    }

    /// Allowed files the diagnosis points at, fetched at `git_ref`.
    fn relevant_files(
        &self,
        failure: &FailureRecord,
        diagnosis: &Diagnosis,
        git_ref: &str,
    ) -> Vec<(String, String)> {
        let mut files = Vec::new();
        for path in &diagnosis.relevant_files {
            if files.len() >= MAX_RELEVANT_FILES {
                break;
            }
            let path = path.trim().trim_start_matches("./");
            if path == failure.workflow_path
                || !self.generator.policy().is_allowed_path(path)
                || files.iter().any(|(p, _): &(String, String)| p == path)
            {
                continue;
            }
            match self.github.fetch_file(&failure.repo, path, git_ref) {
                Ok(Some(content)) => files.push((path.to_string(), content)),
                Ok(None) => {}
                Err(e) => tracing::debug!(path, error = %e, "skipping relevant file"),
            }
        }
        files
    }

    fn start_rerun(&self, tracked: &mut TrackedFailure) -> Result<()> {
        let now = self.clock.now();
        match rerun::trigger(self.github.as_ref(), tracked, now)
            .context("Failed to trigger rerun")?
        {
            TriggerResult::Triggered(handle) => {
                tracing::info!(
                    correlation_id = %tracked.correlation_id(),
                    handle = ?handle,
                    "rerun triggered"
                );
                tracked.rerun = Some(handle);
                self.apply(tracked, RetryEvent::RerunTriggered)
            }
            TriggerResult::Refused(reason) => {
                tracing::warn!(
                    correlation_id = %tracked.correlation_id(),
                    reason = %reason,
                    "rerun could not be triggered"
                );
                note_on_last_attempt(tracked, &reason);
                self.apply(tracked, RetryEvent::RerunTriggerFailed)
            }
        }
    }

    /// Poll the pending rerun. `false` when it is still running and the
    /// inline wait budget is spent.
    fn await_rerun(&self, tracked: &mut TrackedFailure, waited: &mut Duration) -> Result<bool> {
        let Some(handle) = tracked.rerun.clone() else {
            note_on_last_attempt(tracked, "rerun handle lost");
            self.apply(tracked, RetryEvent::RerunFailed)?;
            return Ok(true);
        };

        loop {
            let status = rerun::observe(
                self.github.as_ref(),
                tracked,
                &handle,
                self.clock.now(),
                self.settings.rerun_timeout,
            )
            .context("Failed to check rerun")?;

            match status {
                RerunStatus::Running => {
                    if !self.wait_inline(waited, self.settings.rerun_poll_interval) {
                        tracked.deferred_until = Some(
                            self.clock.now()
                                + chrono::Duration::from_std(self.settings.rerun_poll_interval)
                                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
                        );
                        return Ok(false);
                    }
                }
                RerunStatus::Succeeded { run_id } => {
                    tracing::info!(
                        correlation_id = %tracked.correlation_id(),
                        run_id,
                        "rerun succeeded"
                    );
                    tracked.rerun = None;
                    self.apply(tracked, RetryEvent::RerunSucceeded)?;
                    return Ok(true);
                }
                RerunStatus::Failed { run_id, reason } => {
                    tracing::info!(
                        correlation_id = %tracked.correlation_id(),
                        reason = %reason,
                        "rerun failed"
                    );
                    if let Some(run_id) = run_id {
                        tracked.latest_run_id = run_id;
                    }
                    tracked.rerun = None;
                    note_on_last_attempt(tracked, &reason);
                    self.apply(tracked, RetryEvent::RerunFailed)?;
                    return Ok(true);
                }
            }
        }
    }

    fn escalate(&self, tracked: &mut TrackedFailure, reason: EscalationReason) -> Result<()> {
        let record = self
            .notifier
            .escalate(
                &IssueContent {
                    failure: &tracked.failure,
                    diagnosis: tracked.diagnosis.as_ref(),
                    attempts: &tracked.attempts,
                    reason,
                },
                tracked.escalation.as_ref(),
                self.clock.now(),
            )
            .with_context(|| format!("Failed to escalate {}", tracked.correlation_id()))?;
        tracked.escalation = Some(record);
        Ok(())
    }
}

fn note_on_last_attempt(tracked: &mut TrackedFailure, note: &str) {
    if let Some(attempt) = tracked.attempts.last_mut() {
        attempt.detail = Some(match attempt.detail.take() {
            Some(existing) => format!("{existing}\n{note}"),
            None => note.to_string(),
        });
    }
}
