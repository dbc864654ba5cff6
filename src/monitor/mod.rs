//! Monitor: discovers failed runs and drives each through remediation.
//!
//! A cycle first continues every tracked failure that is not settled yet
//! (including exhausted ones whose escalation is still missing), then looks
//! for new failures in the lookback window. Repositories may be handled in
//! parallel; within a repository failures are handled one at a time, and a
//! workflow with an open cycle does not start a second one.

pub mod discovery;
mod driver;
pub mod inflight;
pub mod rerun;

pub use discovery::{discover_failures, lookback_start, scan, select_repositories, ScanEntry};
pub use driver::DriveOutcome;
pub use inflight::{InFlightGuard, InFlightRegistry};

use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::analyzer::ErrorAnalyzer;
use crate::clock::Clock;
use crate::commit::CommitManager;
use crate::config::{Config, GitHubConfig};
use crate::fixes::{FixGenerator, FixPatternMatcher, SafetyPolicy};
use crate::github::{GitHubApi, WorkflowRun};
use crate::llm::LlmBackend;
use crate::models::{correlation_id, CycleSummary, FailureRecord};
use crate::notify::Notifier;
use crate::retry::{RetryController, RetryPolicy};
use crate::store::{StateStore, TrackedFailure};
use crate::validation::RepoName;

/// Capabilities the monitor is wired to.
pub struct MonitorDeps {
    pub github: Arc<dyn GitHubApi>,
    pub llm: Arc<dyn LlmBackend>,
    pub clock: Arc<dyn Clock>,
    pub store: StateStore,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub github: GitHubConfig,
    pub parallel_repos: usize,
    pub max_inline_wait: Duration,
    pub rerun_poll_interval: Duration,
    pub rerun_timeout: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            github: config.github.clone(),
            parallel_repos: config.parallel_repos.max(1),
            max_inline_wait: Duration::from_secs(config.retry.max_inline_wait_secs),
            rerun_poll_interval: Duration::from_secs(config.retry.rerun_poll_interval_secs.max(1)),
            rerun_timeout: Duration::from_secs(config.retry.rerun_timeout_secs),
        }
    }
}

pub struct Monitor {
    github: Arc<dyn GitHubApi>,
    analyzer: ErrorAnalyzer,
    generator: FixGenerator,
    committer: CommitManager,
    notifier: Notifier,
    controller: RetryController,
    store: StateStore,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
    inflight: InFlightRegistry,
}

impl Monitor {
    pub fn new(config: &Config, deps: MonitorDeps) -> Result<Self> {
        let generator = FixGenerator::new(
            FixPatternMatcher::builtin()?,
            SafetyPolicy::from_config(&config.safety)?,
            deps.llm.clone(),
            config.ai.ai_fix_min_confidence,
            config.ai.max_tokens,
        );
        let committer = CommitManager::from_config(&config.commit, deps.github.clone())
            .context("Failed to set up the commit writer")?;

        Ok(Self {
            analyzer: ErrorAnalyzer::new(deps.llm, config.ai.max_tokens),
            generator,
            committer,
            notifier: Notifier::new(deps.github.clone(), config.notify.clone()),
            controller: RetryController::new(RetryPolicy::from_config(&config.retry)),
            github: deps.github,
            store: deps.store,
            clock: deps.clock,
            settings: MonitorSettings::from_config(config),
            inflight: InFlightRegistry::new(),
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// One full cycle over the selected repositories.
    pub fn run_cycle(&self, explicit: &[RepoName]) -> Result<CycleSummary> {
        let Some(_lock) = self.store.try_lock()? else {
            bail!(
                "Another monitor cycle holds the lock in {}",
                self.store.root().display()
            );
        };

        let started_at = self.clock.now();
        let repos = select_repositories(self.github.as_ref(), &self.settings.github, explicit)?;
        tracing::info!(repositories = repos.len(), "starting monitor cycle");

        let mut open: HashMap<String, Vec<TrackedFailure>> = HashMap::new();
        for tracked in self.store.open_records()? {
            open.entry(tracked.failure.repo.full_name())
                .or_default()
                .push(tracked);
        }

        let mut summary = self.process_all(&repos, &mut open);
        summary.started_at = Some(started_at);
        summary.finished_at = Some(self.clock.now());

        self.store.save_summary(&summary)?;
        tracing::info!(
            repositories = summary.repositories,
            discovered = summary.discovered,
            resumed = summary.resumed,
            succeeded = summary.succeeded,
            escalated = summary.escalated,
            deferred = summary.deferred,
            skipped = summary.skipped,
            errors = summary.errors,
            "monitor cycle finished"
        );
        Ok(summary)
    }

    fn process_all(
        &self,
        repos: &[RepoName],
        open: &mut HashMap<String, Vec<TrackedFailure>>,
    ) -> CycleSummary {
        let work: VecDeque<(RepoName, Vec<TrackedFailure>)> = repos
            .iter()
            .map(|repo| {
                let records = open.remove(&repo.full_name()).unwrap_or_default();
                (repo.clone(), records)
            })
            .collect();

        let workers = self.settings.parallel_repos.min(work.len()).max(1);
        if workers == 1 {
            let mut summary = CycleSummary::default();
            for (repo, records) in work {
                summary.merge(self.process_repository(&repo, records));
            }
            return summary;
        }

        let queue = Mutex::new(work);
        let total = Mutex::new(CycleSummary::default());
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                    let Some((repo, records)) = next else {
                        break;
                    };
                    let result = self.process_repository(&repo, records);
                    total.lock().unwrap_or_else(|e| e.into_inner()).merge(result);
                });
            }
        });
        total.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn process_repository(&self, repo: &RepoName, records: Vec<TrackedFailure>) -> CycleSummary {
        let mut summary = CycleSummary {
            repositories: 1,
            ..Default::default()
        };
        let mut open_workflows: HashSet<u64> = HashSet::new();

        for mut tracked in records {
            let workflow_id = tracked.failure.workflow_id;
            let Some(_guard) = self.inflight.try_acquire(repo, workflow_id) else {
                summary.skipped += 1;
                open_workflows.insert(workflow_id);
                continue;
            };
            summary.resumed += 1;
            let settled = self.run_one(&mut tracked, &mut summary);
            if !settled {
                open_workflows.insert(workflow_id);
            }
        }

        let since = lookback_start(self.clock.now(), self.settings.github.lookback_hours);
        let runs = match discover_failures(
            self.github.as_ref(),
            repo,
            since,
            self.committer.branch_prefix(),
        ) {
            Ok(runs) => runs,
            Err(e) => {
                tracing::error!(repo = %repo, error = %format!("{e:#}"), "discovery failed");
                summary.record_error(format!("{repo}: {e:#}"));
                return summary;
            }
        };

        for run in runs {
            if self.store.contains(&correlation_id(repo, run.id)) {
                summary.skipped += 1;
                continue;
            }
            if open_workflows.contains(&run.workflow_id) {
                tracing::debug!(
                    repo = %repo,
                    run_id = run.id,
                    workflow = run.workflow_name(),
                    "workflow already has an open remediation cycle"
                );
                summary.skipped += 1;
                continue;
            }
            let Some(_guard) = self.inflight.try_acquire(repo, run.workflow_id) else {
                summary.skipped += 1;
                continue;
            };

            let mut tracked = self.track(repo, &run);
            summary.discovered += 1;
            tracing::info!(
                correlation_id = %tracked.correlation_id(),
                repo = %repo,
                run_id = run.id,
                workflow = run.workflow_name(),
                branch = run.branch(),
                "tracking failed run"
            );
            if !self.run_one(&mut tracked, &mut summary) {
                open_workflows.insert(run.workflow_id);
            }
        }

        summary
    }

    fn track(&self, repo: &RepoName, run: &WorkflowRun) -> TrackedFailure {
        let failure = FailureRecord::from_run(repo, run);
        let retry = self.controller.start(&failure.correlation_id);
        TrackedFailure::new(failure, retry, self.clock.now())
    }

    /// Drive one record and count the result. Returns whether it settled.
    fn run_one(&self, tracked: &mut TrackedFailure, summary: &mut CycleSummary) -> bool {
        match self.drive(tracked) {
            Ok(DriveOutcome::Succeeded) => {
                summary.succeeded += 1;
                true
            }
            Ok(DriveOutcome::Escalated) => {
                summary.escalated += 1;
                true
            }
            Ok(DriveOutcome::Deferred) => {
                summary.deferred += 1;
                false
            }
            Err(e) => {
                tracing::error!(
                    correlation_id = %tracked.correlation_id(),
                    error = %format!("{e:#}"),
                    "remediation step failed, will resume next run"
                );
                if let Err(save_err) = self.store.save(tracked) {
                    tracing::error!(error = %save_err, "failed to persist record");
                }
                summary.record_error(format!("{}: {e:#}", tracked.correlation_id()));
                false
            }
        }
    }
}
