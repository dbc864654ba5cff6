//! Domain records shared by the remediation pipeline and persisted by the store.

pub mod diagnosis;
pub mod escalation;
pub mod failure;
pub mod fix;
pub mod rerun;
pub mod summary;

pub use diagnosis::{ConfidenceLevel, Diagnosis, FailureCategory};
pub use escalation::{EscalationReason, EscalationRecord};
pub use failure::{correlation_id, FailureRecord};
pub use fix::{AttemptOutcome, ChangeSet, FileEdit, FixAttempt, FixProposal, FixSource};
pub use rerun::RerunHandle;
pub use summary::CycleSummary;
