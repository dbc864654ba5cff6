//! Typed errors and the remediation error taxonomy.
//!
//! `MedicError` is what library code returns when a caller may want to match on
//! the failure. Command glue wraps everything in `anyhow` with context.

use thiserror::Error;

use crate::retry::RetryEvent;

#[derive(Debug, Error)]
pub enum MedicError {
    /// Rate limits, network failures and 5xx responses that survived the
    /// request-level retries.
    #[error("transient failure talking to {service}: {message}")]
    TransientExternal { service: String, message: String },

    #[error("{service} API error (HTTP {status}): {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid repository name '{name}': {reason}")]
    InvalidRepo { name: String, reason: String },

    #[error("invalid retry transition: {event} is not accepted in phase {phase}")]
    InvalidTransition { phase: String, event: String },

    #[error("log archive error: {0}")]
    LogArchive(String),
}

impl MedicError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MedicError::TransientExternal { .. })
    }

    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            MedicError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Whether `err` or any of its causes is a transient `MedicError`.
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<MedicError>().is_some_and(MedicError::is_transient))
}

/// How a failure to remediate is handled by the retry controller.
///
/// - `TransientExternal` is retried at the API-call level and never counts
///   against the attempts budget.
/// - `UnsafeFix` and `NoFixAvailable` escalate immediately without consuming
///   an attempt.
/// - `ApplyFailed` consumes an attempt, exactly like a failed rerun.
/// - `UnknownDiagnosis` restricts fix generation to deterministic patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    TransientExternal,
    UnsafeFix,
    NoFixAvailable,
    ApplyFailed,
    UnknownDiagnosis,
}

impl ErrorClass {
    pub fn consumes_attempt(&self) -> bool {
        matches!(self, ErrorClass::ApplyFailed)
    }

    pub fn escalates_immediately(&self) -> bool {
        matches!(self, ErrorClass::UnsafeFix | ErrorClass::NoFixAvailable)
    }

    /// Class of an error raised while committing a fix. A transient
    /// `MedicError` anywhere in the context chain keeps it transient.
    pub fn of_apply_error(err: &anyhow::Error) -> Self {
        if is_transient(err) {
            ErrorClass::TransientExternal
        } else {
            ErrorClass::ApplyFailed
        }
    }

    /// The controller event for this class. `None` when the class does not
    /// settle the current step: transient errors leave the phase as it is.
    pub fn retry_event(&self) -> Option<RetryEvent> {
        match self {
            ErrorClass::UnsafeFix => Some(RetryEvent::UnsafeFix),
            ErrorClass::NoFixAvailable => Some(RetryEvent::NoFixAvailable),
            ErrorClass::ApplyFailed => Some(RetryEvent::ApplyFailed),
            ErrorClass::TransientExternal | ErrorClass::UnknownDiagnosis => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::TransientExternal => "transient-external",
            ErrorClass::UnsafeFix => "unsafe-fix",
            ErrorClass::NoFixAvailable => "no-fix-available",
            ErrorClass::ApplyFailed => "apply-failed",
            ErrorClass::UnknownDiagnosis => "unknown-diagnosis",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
