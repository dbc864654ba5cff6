//! FixPatternMatcher: an ordered table of known failure signatures.
//!
//! The first pattern whose predicate matches the error text wins. Order is
//! part of the contract:
//!
//! 1. `outdated-checkout`
//! 2. `outdated-setup-node`
//! 3. `outdated-setup-python`
//! 4. `outdated-cache`
//! 5. `outdated-upload-artifact`
//! 6. `outdated-download-artifact`
//! 7. `node-runtime`
//!
//! Action upgrades come before `node-runtime` because a deprecated action
//! usually also triggers the Node runtime warning, and upgrading the action
//! is the fix that removes it.

use regex::Regex;

use super::rewrite::{bump_node_versions, upgrade_action};
use crate::error::MedicError;
use crate::models::{ChangeSet, FileEdit};

/// The deterministic edit a pattern performs on the workflow file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixAction {
    UpgradeAction { action: &'static str, to_major: u32 },
    BumpNodeVersion,
}

impl FixAction {
    pub fn apply(&self, content: &str) -> String {
        match self {
            FixAction::UpgradeAction { action, to_major } => {
                upgrade_action(content, action, *to_major)
            }
            FixAction::BumpNodeVersion => bump_node_versions(content),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixPattern {
    pub name: &'static str,
    pub description: &'static str,
    predicate: Regex,
    action: FixAction,
}

impl FixPattern {
    fn new(
        name: &'static str,
        description: &'static str,
        predicate: &str,
        action: FixAction,
    ) -> Result<Self, MedicError> {
        let predicate = Regex::new(predicate).map_err(|e| {
            MedicError::InvalidConfig(format!("fix pattern '{name}' has an invalid predicate: {e}"))
        })?;
        Ok(Self {
            name,
            description,
            predicate,
            action,
        })
    }

    pub fn matches(&self, error_text: &str) -> bool {
        self.predicate.is_match(error_text)
    }

    pub fn action(&self) -> &FixAction {
        &self.action
    }
}

/// The file a pattern rewrites: the failed run's workflow file.
#[derive(Debug, Clone, Copy)]
pub struct FixTarget<'a> {
    pub path: &'a str,
    /// `None` when the file could not be fetched
    pub content: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    NoMatch,
    Matched {
        pattern: &'static str,
        description: &'static str,
        change_set: ChangeSet,
    },
    /// A predicate matched but its rewrite could not produce an edit.
    FixFailed {
        pattern: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct FixPatternMatcher {
    patterns: Vec<FixPattern>,
}

fn action_pattern(
    name: &'static str,
    description: &'static str,
    action: &'static str,
    outdated: &str,
    to_major: u32,
) -> Result<FixPattern, MedicError> {
    FixPattern::new(
        name,
        description,
        &format!(r"(?i){}@v{}\b", regex::escape(action), outdated),
        FixAction::UpgradeAction { action, to_major },
    )
}

impl FixPatternMatcher {
    /// The built-in table, in priority order.
    pub fn builtin() -> Result<Self, MedicError> {
        let patterns = vec![
            action_pattern(
                "outdated-checkout",
                "Upgrade actions/checkout to v4",
                "actions/checkout",
                "[1-3]",
                4,
            )?,
            action_pattern(
                "outdated-setup-node",
                "Upgrade actions/setup-node to v4",
                "actions/setup-node",
                "[1-3]",
                4,
            )?,
            action_pattern(
                "outdated-setup-python",
                "Upgrade actions/setup-python to v5",
                "actions/setup-python",
                "[1-4]",
                5,
            )?,
            action_pattern(
                "outdated-cache",
                "Upgrade actions/cache to v4",
                "actions/cache",
                "[1-3]",
                4,
            )?,
            action_pattern(
                "outdated-upload-artifact",
                "Upgrade actions/upload-artifact to v4",
                "actions/upload-artifact",
                "[1-3]",
                4,
            )?,
            action_pattern(
                "outdated-download-artifact",
                "Upgrade actions/download-artifact to v4",
                "actions/download-artifact",
                "[1-3]",
                4,
            )?,
            FixPattern::new(
                "node-runtime",
                "Upgrade Node.js version to 20 (LTS)",
                r"(?i)\bnode1[26]\b|node\.js version .* is no longer supported|node\.js 1[26] actions are deprecated",
                FixAction::BumpNodeVersion,
            )?,
        ];
        Ok(Self { patterns })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|p| p.name).collect()
    }

    /// First pattern matching `error_text` that is not in `excluded`.
    pub fn find(&self, error_text: &str, excluded: &[String]) -> Option<&FixPattern> {
        self.patterns
            .iter()
            .filter(|p| !excluded.iter().any(|e| e == p.name))
            .find(|p| p.matches(error_text))
    }

    pub fn match_failure(
        &self,
        error_text: &str,
        target: FixTarget<'_>,
        excluded: &[String],
    ) -> MatchOutcome {
        let Some(pattern) = self.find(error_text, excluded) else {
            return MatchOutcome::NoMatch;
        };

        let Some(content) = target.content else {
            return MatchOutcome::FixFailed {
                pattern: pattern.name,
                reason: format!("workflow file {} is unavailable", target.path),
            };
        };

        let fixed = pattern.action.apply(content);
        if fixed == content {
            return MatchOutcome::FixFailed {
                pattern: pattern.name,
                reason: format!("rewrite of {} produced no change", target.path),
            };
        }

        MatchOutcome::Matched {
            pattern: pattern.name,
            description: pattern.description,
            change_set: ChangeSet::single(FileEdit::new(target.path, fixed)),
        }
    }
}
