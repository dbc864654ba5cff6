use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How to find the result of a triggered rerun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RerunHandle {
    /// `rerun-failed-jobs` on an existing run; done once a later
    /// `run_attempt` of that run completes
    Rerun {
        run_id: u64,
        previous_attempt: u32,
        triggered_at: DateTime<Utc>,
    },
    /// A fresh run of the workflow on the fix branch created after the trigger
    BranchRun {
        workflow_id: u64,
        branch: String,
        triggered_at: DateTime<Utc>,
    },
}

impl RerunHandle {
    pub fn triggered_at(&self) -> DateTime<Utc> {
        match self {
            RerunHandle::Rerun { triggered_at, .. } | RerunHandle::BranchRun { triggered_at, .. } => {
                *triggered_at
            }
        }
    }
}
