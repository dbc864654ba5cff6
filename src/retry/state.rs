use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::EscalationReason;

/// Where a failure stands in the remediation cycle.
///
/// `Succeeded` and `Exhausted` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum RetryPhase {
    Pending,
    FixApplied,
    AwaitingRerunResult,
    /// Waiting out the backoff before going back to `Pending`
    Retry { not_before: DateTime<Utc> },
    Succeeded,
    Exhausted { reason: EscalationReason },
}

impl RetryPhase {
    pub fn name(&self) -> &'static str {
        match self {
            RetryPhase::Pending => "pending",
            RetryPhase::FixApplied => "fix-applied",
            RetryPhase::AwaitingRerunResult => "awaiting-rerun-result",
            RetryPhase::Retry { .. } => "retry",
            RetryPhase::Succeeded => "succeeded",
            RetryPhase::Exhausted { .. } => "exhausted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryPhase::Succeeded | RetryPhase::Exhausted { .. })
    }
}

impl fmt::Display for RetryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcomes fed to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryEvent {
    /// A fix (or a rerun-only proposal) is ready on its branch
    FixCommitted,
    NoFixAvailable,
    UnsafeFix,
    ApplyFailed,
    RerunTriggered,
    RerunTriggerFailed,
    RerunSucceeded,
    RerunFailed,
    BackoffElapsed,
}

impl RetryEvent {
    pub const ALL: [RetryEvent; 9] = [
        RetryEvent::FixCommitted,
        RetryEvent::NoFixAvailable,
        RetryEvent::UnsafeFix,
        RetryEvent::ApplyFailed,
        RetryEvent::RerunTriggered,
        RetryEvent::RerunTriggerFailed,
        RetryEvent::RerunSucceeded,
        RetryEvent::RerunFailed,
        RetryEvent::BackoffElapsed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetryEvent::FixCommitted => "fix-committed",
            RetryEvent::NoFixAvailable => "no-fix-available",
            RetryEvent::UnsafeFix => "unsafe-fix",
            RetryEvent::ApplyFailed => "apply-failed",
            RetryEvent::RerunTriggered => "rerun-triggered",
            RetryEvent::RerunTriggerFailed => "rerun-trigger-failed",
            RetryEvent::RerunSucceeded => "rerun-succeeded",
            RetryEvent::RerunFailed => "rerun-failed",
            RetryEvent::BackoffElapsed => "backoff-elapsed",
        }
    }

    /// Events that use up one attempt.
    pub fn consumes_attempt(&self) -> bool {
        matches!(
            self,
            RetryEvent::ApplyFailed | RetryEvent::RerunTriggerFailed | RetryEvent::RerunFailed
        )
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub event: RetryEvent,
    pub at: DateTime<Utc>,
}

/// Retry bookkeeping for one failure.
///
/// Fields are private: only `RetryController` changes them, one transition
/// at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    correlation_id: String,
    phase: RetryPhase,
    attempts_made: u32,
    max_attempts: u32,
    current_delay_secs: u64,
    #[serde(default)]
    history: Vec<Transition>,
}

impl RetryState {
    pub(super) fn new(correlation_id: &str, max_attempts: u32) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            phase: RetryPhase::Pending,
            attempts_made: 0,
            max_attempts,
            current_delay_secs: 0,
            history: Vec::new(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn phase(&self) -> &RetryPhase {
        &self.phase
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_made)
    }

    /// Backoff chosen on the most recent move into `Retry`.
    pub fn current_delay(&self) -> Duration {
        Duration::from_secs(self.current_delay_secs)
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn exhaustion_reason(&self) -> Option<EscalationReason> {
        match self.phase {
            RetryPhase::Exhausted { reason } => Some(reason),
            _ => None,
        }
    }

    pub(super) fn record(
        &mut self,
        next: RetryPhase,
        event: RetryEvent,
        at: DateTime<Utc>,
    ) {
        self.history.push(Transition {
            from: self.phase.name().to_string(),
            to: next.name().to_string(),
            event,
            at,
        });
        self.phase = next;
    }

    pub(super) fn consume_attempt(&mut self) -> u32 {
        self.attempts_made = (self.attempts_made + 1).min(self.max_attempts);
        self.attempts_made
    }

    pub(super) fn set_delay(&mut self, delay: Duration) {
        self.current_delay_secs = delay.as_secs();
    }
}
