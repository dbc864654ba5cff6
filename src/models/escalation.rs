use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why automated remediation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationReason {
    RetriesExhausted,
    NoFixAvailable,
    UnsafeFix,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationReason::RetriesExhausted => "retries-exhausted",
            EscalationReason::NoFixAvailable => "no-fix-available",
            EscalationReason::UnsafeFix => "unsafe-fix",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            EscalationReason::RetriesExhausted => "All automated fix attempts were used up",
            EscalationReason::NoFixAvailable => "No applicable automated fix could be produced",
            EscalationReason::UnsafeFix => {
                "The proposed fix touched files outside the allowed set and was rejected"
            }
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hand-off to a human. At most one per failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub correlation_id: String,
    pub reason: EscalationReason,
    /// None when issue creation is disabled
    #[serde(default)]
    pub issue_number: Option<u64>,
    #[serde(default)]
    pub issue_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
