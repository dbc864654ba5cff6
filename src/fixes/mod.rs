//! Fix generation: deterministic patterns, model-written fixes, and the
//! safety policy both must pass.

mod generator;
pub mod patterns;
pub mod rewrite;
mod safety;

pub use generator::{FixGenerator, FixRequest, Proposal, FIX_SYSTEM_PROMPT};
pub use patterns::{FixAction, FixPattern, FixPatternMatcher, FixTarget, MatchOutcome};
pub use safety::SafetyPolicy;
