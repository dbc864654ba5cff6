//! The retry/escalation state machine.
//!
//! ```text
//! pending --fix-committed--> fix-applied --rerun-triggered--> awaiting-rerun-result
//!    |                           |                                |
//!    | no-fix / unsafe           | rerun-trigger-failed           | rerun-succeeded -> succeeded
//!    v                           v                                | rerun-failed
//! exhausted            (consume attempt) <------------------------+
//!                        |            |
//!            attempts < max      attempts == max
//!                        v            v
//!                retry --backoff-elapsed--> pending     exhausted
//! ```
//!
//! Apply failures from `pending` consume an attempt the same way. The
//! machine is total over the events each phase expects; anything else is
//! `MedicError::InvalidTransition`.

mod policy;
mod state;


pub use policy::RetryPolicy;
pub use state::{RetryEvent, RetryPhase, RetryState, Transition};

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::MedicError;
use crate::models::EscalationReason;

#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fresh state in `pending` with the policy's attempt budget.
    pub fn start(&self, correlation_id: &str) -> RetryState {
        RetryState::new(correlation_id, self.policy.max_attempts)
    }

    /// Events that `phase` accepts. Empty for terminal phases.
    pub fn accepted_events(phase: &RetryPhase) -> Vec<RetryEvent> {
        match phase {
            RetryPhase::Pending => vec![
                RetryEvent::FixCommitted,
                RetryEvent::NoFixAvailable,
                RetryEvent::UnsafeFix,
                RetryEvent::ApplyFailed,
            ],
            RetryPhase::FixApplied => {
                vec![RetryEvent::RerunTriggered, RetryEvent::RerunTriggerFailed]
            }
            RetryPhase::AwaitingRerunResult => {
                vec![RetryEvent::RerunSucceeded, RetryEvent::RerunFailed]
            }
            RetryPhase::Retry { .. } => vec![RetryEvent::BackoffElapsed],
            RetryPhase::Succeeded | RetryPhase::Exhausted { .. } => vec![],
        }
    }

    /// Apply one event and return the new phase.
    ///
    /// `BackoffElapsed` is refused while `now` is still before the retry's
    /// `not_before`.
    pub fn apply(
        &self,
        state: &mut RetryState,
        event: RetryEvent,
        now: DateTime<Utc>,
    ) -> Result<RetryPhase, MedicError> {
        let from = state.phase().clone();

        let next = match (&from, event) {
            (RetryPhase::Pending, RetryEvent::FixCommitted) => RetryPhase::FixApplied,
            (RetryPhase::Pending, RetryEvent::NoFixAvailable) => RetryPhase::Exhausted {
                reason: EscalationReason::NoFixAvailable,
            },
            (RetryPhase::Pending, RetryEvent::UnsafeFix) => RetryPhase::Exhausted {
                reason: EscalationReason::UnsafeFix,
            },
            (RetryPhase::FixApplied, RetryEvent::RerunTriggered) => {
                RetryPhase::AwaitingRerunResult
            }
            (RetryPhase::AwaitingRerunResult, RetryEvent::RerunSucceeded) => {
                RetryPhase::Succeeded
            }
            // Each active phase accepts exactly one failure event.
            (phase, event)
                if event.consumes_attempt() && Self::accepted_events(phase).contains(&event) =>
            {
                self.consume_attempt(state, now)
            }
            (RetryPhase::Retry { not_before }, RetryEvent::BackoffElapsed) if now >= *not_before => {
                RetryPhase::Pending
            }
            _ => {
                return Err(MedicError::InvalidTransition {
                    phase: from.name().to_string(),
                    event: event.as_str().to_string(),
                })
            }
        };

        tracing::info!(
            correlation_id = state.correlation_id(),
            from = from.name(),
            to = next.name(),
            event = event.as_str(),
            attempts_made = state.attempts_made(),
            max_attempts = state.max_attempts(),
            "retry transition"
        );

        state.record(next.clone(), event, now);
        Ok(next)
    }

    fn consume_attempt(&self, state: &mut RetryState, now: DateTime<Utc>) -> RetryPhase {
        let made = state.consume_attempt();
        if made < state.max_attempts() {
            let delay = self.policy.delay_for(made - 1);
            state.set_delay(delay);
            RetryPhase::Retry {
                not_before: now + to_chrono(delay),
            }
        } else {
            RetryPhase::Exhausted {
                reason: EscalationReason::RetriesExhausted,
            }
        }
    }

    /// Time left before a `Retry` phase may resume. Zero once due, `None`
    /// outside `Retry`.
    pub fn backoff_remaining(&self, state: &RetryState, now: DateTime<Utc>) -> Option<Duration> {
        match state.phase() {
            RetryPhase::Retry { not_before } => {
                Some((*not_before - now).to_std().unwrap_or(Duration::ZERO))
            }
            _ => None,
        }
    }

    /// Move a due `Retry` back to `Pending`. Returns whether it moved.
    pub fn resume_if_due(
        &self,
        state: &mut RetryState,
        now: DateTime<Utc>,
    ) -> Result<bool, MedicError> {
        match self.backoff_remaining(state, now) {
            Some(remaining) if remaining.is_zero() => {
                self.apply(state, RetryEvent::BackoffElapsed, now)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
