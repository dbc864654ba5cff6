//! Persistence of tracked failures across invocations.
//!
//! Layout under the state directory:
//!
//! ```text
//! <state_dir>/
//!   failures/<correlation-id>.yaml   one TrackedFailure each
//!   last-scan.yaml                   CycleSummary of the latest monitor run
//!   medic.lock                       held while a monitor cycle runs
//! ```

mod locking;

pub use locking::{read_yaml, write_yaml, ProcessLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{
    CycleSummary, Diagnosis, EscalationRecord, FailureRecord, FixAttempt, RerunHandle,
};
use crate::retry::{RetryPhase, RetryState};

const FAILURES_DIR: &str = "failures";
const LAST_SCAN_FILE: &str = "last-scan.yaml";
const LOCK_FILE: &str = "medic.lock";

/// Everything known about one failure, keyed by its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFailure {
    pub failure: FailureRecord,
    #[serde(default)]
    pub diagnosis: Option<Diagnosis>,
    #[serde(default)]
    pub attempts: Vec<FixAttempt>,
    pub retry: RetryState,
    /// Set while a rerun is being waited on
    #[serde(default)]
    pub rerun: Option<RerunHandle>,
    /// Parent for the next fix commit: the failing commit, then the latest
    /// applied fix
    pub fix_base_sha: String,
    /// Most recent failing run: the original one, then failed reruns
    pub latest_run_id: u64,
    /// Branch of the most recent applied fix
    #[serde(default)]
    pub fix_branch: Option<String>,
    #[serde(default)]
    pub escalation: Option<EscalationRecord>,
    /// Earliest time the next step can make progress
    #[serde(default)]
    pub deferred_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedFailure {
    pub fn new(failure: FailureRecord, retry: RetryState, now: DateTime<Utc>) -> Self {
        Self {
            fix_base_sha: failure.head_sha.clone(),
            latest_run_id: failure.run_id,
            failure,
            diagnosis: None,
            attempts: Vec::new(),
            retry,
            rerun: None,
            fix_branch: None,
            escalation: None,
            deferred_until: None,
            updated_at: now,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.failure.correlation_id
    }

    pub fn phase(&self) -> &RetryPhase {
        self.retry.phase()
    }

    pub fn is_terminal(&self) -> bool {
        self.retry.is_terminal()
    }

    /// Exhausted but the issue (or record) was not created yet.
    pub fn needs_escalation(&self) -> bool {
        matches!(self.retry.phase(), RetryPhase::Exhausted { .. }) && self.escalation.is_none()
    }

    /// Finished for good: succeeded, or exhausted and escalated.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() && !self.needs_escalation()
    }

    pub fn next_attempt_number(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn failures_dir(&self) -> PathBuf {
        self.root.join(FAILURES_DIR)
    }

    pub fn path_for(&self, correlation_id: &str) -> PathBuf {
        self.failures_dir().join(format!("{correlation_id}.yaml"))
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.path_for(correlation_id).exists()
    }

    pub fn load(&self, correlation_id: &str) -> Result<Option<TrackedFailure>> {
        read_yaml(&self.path_for(correlation_id))
    }

    pub fn save(&self, tracked: &TrackedFailure) -> Result<()> {
        write_yaml(&self.path_for(tracked.correlation_id()), tracked)
            .with_context(|| format!("Failed to save {}", tracked.correlation_id()))
    }

    /// All tracked failures, newest first. Unreadable files are skipped with
    /// a warning.
    pub fn list(&self) -> Result<Vec<TrackedFailure>> {
        let dir = self.failures_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().map(|e| e != "yaml").unwrap_or(true) {
                continue;
            }
            match read_yaml::<TrackedFailure>(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }

        records.sort_by(|a, b| {
            b.failure
                .created_at
                .cmp(&a.failure.created_at)
                .then_with(|| a.correlation_id().cmp(b.correlation_id()))
        });
        Ok(records)
    }

    /// Records a cycle should continue: not settled yet.
    pub fn open_records(&self) -> Result<Vec<TrackedFailure>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| !r.is_settled())
            .collect())
    }

    pub fn save_summary(&self, summary: &CycleSummary) -> Result<()> {
        write_yaml(&self.root.join(LAST_SCAN_FILE), summary)
    }

    pub fn load_summary(&self) -> Result<Option<CycleSummary>> {
        read_yaml(&self.root.join(LAST_SCAN_FILE))
    }

    /// Exclusive lock for a monitor cycle; `None` if another process holds it.
    pub fn try_lock(&self) -> Result<Option<ProcessLock>> {
        ProcessLock::try_acquire(&self.root.join(LOCK_FILE))
    }
}
