use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts for one monitor cycle. Persisted as `last-scan.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub repositories: usize,
    /// New failures picked up this cycle
    pub discovered: usize,
    /// Tracked failures continued from an earlier cycle
    pub resumed: usize,
    pub succeeded: usize,
    pub escalated: usize,
    /// Left waiting for a later invocation
    pub deferred: usize,
    /// Already tracked, or blocked by an open cycle on the same workflow
    pub skipped: usize,
    pub errors: usize,
    #[serde(default)]
    pub error_messages: Vec<String>,
}

impl CycleSummary {
    pub fn merge(&mut self, other: CycleSummary) {
        self.repositories += other.repositories;
        self.discovered += other.discovered;
        self.resumed += other.resumed;
        self.succeeded += other.succeeded;
        self.escalated += other.escalated;
        self.deferred += other.deferred;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.error_messages.extend(other.error_messages);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors += 1;
        self.error_messages.push(message.into());
    }
}
