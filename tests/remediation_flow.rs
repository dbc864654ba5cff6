//! End-to-end remediation cycles against in-memory GitHub and model fakes.
//!
//! Covers:
//! - pattern fixes that succeed on the first rerun
//! - GitHub outages that leave the attempt budget untouched
//! - unsafe and missing fixes escalating without consuming attempts
//! - retries building on each other until the attempts run out
//! - deferral across invocations and resume
//! - one open cycle per workflow
//! - duplicate-free escalation

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use medic::config::Config;
use medic::models::{AttemptOutcome, EscalationReason, FixSource};
use medic::monitor::{Monitor, MonitorDeps};
use medic::notify::marker;
use medic::retry::RetryPhase;
use medic::store::StateStore;
use tempfile::TempDir;

const MISSING_MODULE_LOG: &str =
    "2026-03-01T11:30:00.1234567Z npm test\n2026-03-01T11:30:01.0000000Z Error: Cannot find module 'left-pad'\n";

struct Harness {
    dir: TempDir,
    github: Arc<FakeGitHub>,
    llm: Arc<ScriptedLlm>,
    clock: Arc<medic::clock::ManualClock>,
    config: Config,
}

impl Harness {
    fn new(diagnosis: &str, fix: &str) -> Self {
        let github = Arc::new(FakeGitHub::new());
        github.set_file(WORKFLOW_PATH, OUTDATED_WORKFLOW);
        Self {
            dir: TempDir::new().unwrap(),
            github,
            llm: Arc::new(ScriptedLlm::new(diagnosis, fix)),
            clock: manual_clock(),
            config: Config::default(),
        }
    }

    fn store(&self) -> StateStore {
        StateStore::new(self.dir.path())
    }

    fn monitor(&self) -> Monitor {
        Monitor::new(
            &self.config,
            MonitorDeps {
                github: self.github.clone(),
                llm: self.llm.clone(),
                clock: self.clock.clone(),
                store: self.store(),
            },
        )
        .unwrap()
    }

    fn only_record(&self) -> medic::store::TrackedFailure {
        let mut records = self.store().list().unwrap();
        assert_eq!(records.len(), 1, "expected exactly one tracked failure");
        records.remove(0)
    }
}

#[test]
fn test_outdated_checkout_is_fixed_without_escalation() {
    let h = Harness::new(&diagnosis_json("config-error", 0.9), "{}");
    h.github.add_failed_run(failed_run(100, 30));
    h.github.set_log(
        100,
        "2026-03-01T11:30:00.0000000Z ##[error]Node.js 12 actions are deprecated. Please update: actions/checkout@v2\n",
    );

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.escalated, 0);
    assert_eq!(summary.errors, 0);

    let commits = h.github.commit_requests();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].branch, "medic/ci-100-a1");
    assert_eq!(commits[0].base_sha, BASE_SHA);
    assert_eq!(commits[0].edits.len(), 1);
    assert_eq!(commits[0].edits[0].path, WORKFLOW_PATH);
    assert!(commits[0].edits[0].content.contains("actions/checkout@v4"));
    assert!(commits[0]
        .message
        .starts_with("fix(ci): Upgrade actions/checkout to v4"));
    assert_eq!(h.github.dispatches(), vec!["medic/ci-100-a1".to_string()]);
    assert!(h.github.issues().is_empty());
    assert_eq!(h.llm.fix_calls(), 0);

    let record = h.only_record();
    assert_eq!(record.phase(), &RetryPhase::Succeeded);
    assert_eq!(record.attempts.len(), 1);
    assert_eq!(
        record.attempts[0].source,
        FixSource::Pattern("outdated-checkout".to_string())
    );
    assert_eq!(record.attempts[0].commit_sha.as_deref(), Some("fix0001"));
    assert!(record.escalation.is_none());
    assert!(record.rerun.is_none());

    let saved = h.store().load_summary().unwrap().unwrap();
    assert_eq!(saved.succeeded, 1);
    assert!(saved.finished_at.is_some());
}

#[test]
fn test_pattern_found_far_from_the_failure_marker() {
    let h = Harness::new(&diagnosis_json("config-error", 0.4), "{}");
    h.github.add_failed_run(failed_run(100, 30));

    let mut log = String::from(
        "2026-03-01T11:30:00.0000000Z Download action repository 'actions/checkout@v2' (SHA:ec3a7ce1)\n",
    );
    for i in 0..600 {
        log.push_str(&format!(
            "2026-03-01T11:30:01.0000000Z compiling module {i:03} ok\n"
        ));
    }
    log.push_str("2026-03-01T11:31:00.0000000Z ##[error]Process completed with exit code 1.\n");
    assert!(log.len() > medic::analyzer::MAX_EXCERPT_CHARS);
    h.github.set_log(100, &log);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(h.llm.fix_calls(), 0);
    let commits = h.github.commit_requests();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].edits[0].content.contains("actions/checkout@v4"));
    assert_eq!(
        h.only_record().attempts[0].source,
        FixSource::Pattern("outdated-checkout".to_string())
    );
}

#[test]
fn test_unavailable_github_during_commit_keeps_the_attempt() {
    let h = Harness::new(&diagnosis_json("config-error", 0.9), "{}");
    h.github.add_failed_run(failed_run(100, 30));
    h.github
        .set_log(100, "##[error]Node.js 12 actions are deprecated: actions/checkout@v2\n");
    h.github.fail_commits(1);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.succeeded, 0);
    assert!(h.github.commit_requests().is_empty());

    let record = h.only_record();
    assert_eq!(record.phase(), &RetryPhase::Pending);
    assert_eq!(record.retry.attempts_made(), 0);
    assert!(record.attempts.is_empty());

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(summary.resumed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.errors, 0);

    let commits = h.github.commit_requests();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].branch, "medic/ci-100-a1");
    let record = h.only_record();
    assert_eq!(record.phase(), &RetryPhase::Succeeded);
    assert_eq!(record.retry.attempts_made(), 0);
    assert_eq!(record.attempts.len(), 1);
}

#[test]
fn test_unavailable_github_during_dispatch_keeps_the_attempt() {
    let h = Harness::new(&diagnosis_json("config-error", 0.9), "{}");
    h.github.add_failed_run(failed_run(100, 30));
    h.github
        .set_log(100, "##[error]Node.js 12 actions are deprecated: actions/checkout@v2\n");
    h.github.fail_dispatches(1);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(summary.errors, 1);
    assert!(h.github.dispatches().is_empty());

    let record = h.only_record();
    assert_eq!(record.phase(), &RetryPhase::FixApplied);
    assert_eq!(record.retry.attempts_made(), 0);
    assert_eq!(record.attempts.len(), 1);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(h.github.commit_requests().len(), 1);
    assert_eq!(h.github.dispatches(), vec!["medic/ci-100-a1".to_string()]);
    assert_eq!(h.only_record().retry.attempts_made(), 0);
}

#[test]
fn test_unsafe_ai_fix_escalates_without_consuming_attempts() {
    let h = Harness::new(
        &diagnosis_json("dependency-conflict", 0.9),
        &fix_json("src/index.js", "module.exports = 1;\n"),
    );
    h.github.add_failed_run(failed_run(100, 30));
    h.github.set_log(100, MISSING_MODULE_LOG);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(summary.escalated, 1);
    assert!(h.github.commit_requests().is_empty());

    let record = h.only_record();
    assert_eq!(
        record.phase(),
        &RetryPhase::Exhausted {
            reason: EscalationReason::UnsafeFix
        }
    );
    assert_eq!(record.retry.attempts_made(), 0);
    assert_eq!(record.attempts.len(), 1);
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::RejectedUnsafe);
    assert!(record.attempts[0]
        .detail
        .as_deref()
        .unwrap()
        .contains("src/index.js"));

    let issues = h.github.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].title, "Workflow failure: CI on main");
    assert_eq!(issues[0].labels, vec!["workflow-failure".to_string()]);
    assert!(issues[0]
        .issue
        .body
        .as_deref()
        .unwrap()
        .contains(&marker(record.correlation_id())));
    assert_eq!(h.github.labels(), vec!["workflow-failure".to_string()]);

    let escalation = record.escalation.unwrap();
    assert_eq!(escalation.reason, EscalationReason::UnsafeFix);
    assert_eq!(escalation.issue_number, Some(1));

    // A second cycle sees the run as already handled.
    let again = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(again.discovered, 0);
    assert_eq!(again.skipped, 1);
    assert_eq!(h.github.issues().len(), 1);
}

#[test]
fn test_escalation_reuses_issue_after_state_loss() {
    let h = Harness::new(
        &diagnosis_json("dependency-conflict", 0.9),
        &fix_json("src/index.js", "module.exports = 1;\n"),
    );
    h.github.add_failed_run(failed_run(100, 30));
    h.github.set_log(100, MISSING_MODULE_LOG);
    h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(h.github.issues().len(), 1);

    // Same GitHub, empty state directory.
    let fresh = TempDir::new().unwrap();
    let monitor = Monitor::new(
        &h.config,
        MonitorDeps {
            github: h.github.clone(),
            llm: h.llm.clone(),
            clock: h.clock.clone(),
            store: StateStore::new(fresh.path()),
        },
    )
    .unwrap();
    let summary = monitor.run_cycle(&[repo()]).unwrap();

    assert_eq!(summary.escalated, 1);
    assert_eq!(h.github.issues().len(), 1);
    let record = &StateStore::new(fresh.path()).list().unwrap()[0];
    assert_eq!(record.escalation.as_ref().unwrap().issue_number, Some(1));
}

#[test]
fn test_unknown_diagnosis_without_pattern_escalates() {
    let h = Harness::new("the model is having a bad day", "{}");
    h.github.add_failed_run(failed_run(100, 30));
    h.github.set_log(100, MISSING_MODULE_LOG);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(summary.escalated, 1);

    let record = h.only_record();
    assert_eq!(
        record.phase(),
        &RetryPhase::Exhausted {
            reason: EscalationReason::NoFixAvailable
        }
    );
    assert_eq!(record.retry.attempts_made(), 0);
    assert!(record.attempts.is_empty());
    assert!(record.diagnosis.unwrap().is_unknown());
    assert_eq!(h.llm.fix_calls(), 0);
}

#[test]
fn test_escalation_is_recorded_when_issues_are_disabled() {
    let mut h = Harness::new("not json", "{}");
    h.config.notify.create_issues = false;
    h.github.add_failed_run(failed_run(100, 30));
    h.github.set_log(100, MISSING_MODULE_LOG);

    h.monitor().run_cycle(&[repo()]).unwrap();

    assert!(h.github.issues().is_empty());
    let record = h.only_record();
    let escalation = record.escalation.unwrap();
    assert_eq!(escalation.reason, EscalationReason::NoFixAvailable);
    assert_eq!(escalation.issue_number, None);
}

#[test]
fn test_failed_reruns_exhaust_on_the_last_attempt() {
    let mut h = Harness::new(
        &diagnosis_json("dependency-conflict", 0.9),
        &fix_json("package.json", "{\"dependencies\": {\"left-pad\": \"1.3.0\"}}\n"),
    );
    h.config.retry.max_inline_wait_secs = 3600;
    h.github.add_failed_run(failed_run(100, 30));
    h.github.set_default_log(MISSING_MODULE_LOG);
    h.github
        .script_runs(&[RunScript::Failure, RunScript::Failure, RunScript::Failure]);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(summary.escalated, 1);
    assert_eq!(summary.deferred, 0);

    let commits = h.github.commit_requests();
    let branches: Vec<&str> = commits.iter().map(|c| c.branch.as_str()).collect();
    assert_eq!(
        branches,
        vec!["medic/ci-100-a1", "medic/ci-100-a2", "medic/ci-100-a3"]
    );
    // Each retry builds on the previous fix.
    assert_eq!(commits[0].base_sha, BASE_SHA);
    assert_eq!(commits[1].base_sha, "fix0001");
    assert_eq!(commits[2].base_sha, "fix0002");

    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(60), Duration::from_secs(120)]
    );

    let record = h.only_record();
    assert_eq!(
        record.phase(),
        &RetryPhase::Exhausted {
            reason: EscalationReason::RetriesExhausted
        }
    );
    assert_eq!(record.retry.attempts_made(), 3);
    assert_eq!(record.attempts.len(), 3);
    assert!(record
        .attempts
        .iter()
        .all(|a| a.source == FixSource::AiGenerated));
    assert!(record.attempts[2]
        .detail
        .as_deref()
        .unwrap()
        .contains("rerun concluded failure"));
    assert_ne!(record.latest_run_id, 100);
    assert_eq!(h.github.issues().len(), 1);
}

#[test]
fn test_timed_out_run_is_rerun_without_a_commit() {
    let h = Harness::new(&diagnosis_json("timeout", 0.8), "{}");
    let mut run = failed_run(100, 30);
    run.conclusion = Some("timed_out".to_string());
    h.github.add_failed_run(run);
    h.github.set_log(
        100,
        "##[error]The job running on runner has exceeded the maximum execution time of 360 minutes.\n",
    );

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(h.github.reruns(), vec![100]);
    assert!(h.github.commit_requests().is_empty());
    let record = h.only_record();
    assert_eq!(record.attempts[0].source, FixSource::Rerun);
    assert!(record.attempts[0].change_set.is_empty());
}

#[test]
fn test_pending_rerun_is_deferred_and_resumed() {
    let h = Harness::new(&diagnosis_json("config-error", 0.9), "{}");
    h.github.add_failed_run(failed_run(100, 30));
    h.github.set_log(100, "##[error]actions/checkout@v2 is no longer supported\n");
    h.github.script_runs(&[RunScript::Pending]);

    let first = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(first.discovered, 1);
    assert_eq!(first.deferred, 1);

    let record = h.only_record();
    assert_eq!(record.phase(), &RetryPhase::AwaitingRerunResult);
    assert!(record.rerun.is_some());
    assert!(record.deferred_until.is_some());

    h.github.complete_pending_runs(true);
    h.clock.advance(Duration::from_secs(60));

    let second = h.monitor().run_cycle(&[repo()]).unwrap();
    assert_eq!(second.resumed, 1);
    assert_eq!(second.succeeded, 1);
    assert_eq!(second.discovered, 0);
    assert_eq!(second.skipped, 1);

    let record = h.only_record();
    assert_eq!(record.phase(), &RetryPhase::Succeeded);
    assert!(record.deferred_until.is_none());
    assert_eq!(h.github.commit_requests().len(), 1);
}

#[test]
fn test_second_failure_of_open_workflow_is_skipped() {
    let h = Harness::new(&diagnosis_json("config-error", 0.9), "{}");
    h.github.add_failed_run(failed_run(100, 30));
    h.github.add_failed_run(failed_run(101, 10));
    h.github.set_default_log("##[error]actions/checkout@v2 is no longer supported\n");
    h.github.script_runs(&[RunScript::Pending]);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.deferred, 1);
    assert_eq!(summary.skipped, 1);
    let record = h.only_record();
    assert_eq!(record.failure.run_id, 101);
}

#[test]
fn test_fix_branch_runs_are_not_new_failures() {
    let h = Harness::new(&diagnosis_json("config-error", 0.9), "{}");
    let mut run = failed_run(100, 30);
    run.head_branch = Some("medic/ci-42-a1".to_string());
    h.github.add_failed_run(run);

    let summary = h.monitor().run_cycle(&[repo()]).unwrap();

    assert_eq!(summary.discovered, 0);
    assert!(h.store().list().unwrap().is_empty());
}

#[test]
fn test_cycle_refuses_to_run_while_locked() {
    let h = Harness::new("{}", "{}");
    let _held = h.store().try_lock().unwrap().unwrap();

    let err = h.monitor().run_cycle(&[repo()]).unwrap_err();
    assert!(err.to_string().contains("lock"));
}
