use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Full replacement content for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

impl FileEdit {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub edits: Vec<FileEdit>,
}

impl ChangeSet {
    pub fn new(edits: Vec<FileEdit>) -> Self {
        Self { edits }
    }

    pub fn single(edit: FileEdit) -> Self {
        Self { edits: vec![edit] }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.edits.iter().map(|e| e.path.as_str()).collect()
    }
}

/// Where a fix came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixSource {
    /// A named deterministic pattern
    Pattern(String),
    AiGenerated,
    /// No edit; the run is simply triggered again
    Rerun,
}

impl FixSource {
    pub fn pattern_name(&self) -> Option<&str> {
        match self {
            FixSource::Pattern(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for FixSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixSource::Pattern(name) => f.write_str(name),
            FixSource::AiGenerated => f.write_str("ai-generated"),
            FixSource::Rerun => f.write_str("rerun"),
        }
    }
}

/// A fix that passed the safety policy and may be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct FixProposal {
    pub source: FixSource,
    pub description: String,
    pub change_set: ChangeSet,
}

impl FixProposal {
    pub fn is_rerun_only(&self) -> bool {
        self.source == FixSource::Rerun
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Applied,
    RejectedUnsafe,
    FailedToApply,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Applied => "applied",
            AttemptOutcome::RejectedUnsafe => "rejected-unsafe",
            AttemptOutcome::FailedToApply => "failed-to-apply",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one fix tried against a failure, in attempt order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAttempt {
    /// 1-based position in the failure's attempt list
    pub number: u32,
    pub source: FixSource,
    pub description: String,
    pub change_set: ChangeSet,
    pub outcome: AttemptOutcome,
    /// Failing run this attempt responded to
    pub run_id: u64,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub pull_request: Option<u64>,
    /// Error text or safety violations
    #[serde(default)]
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_source_display() {
        assert_eq!(
            FixSource::Pattern("outdated-checkout".into()).to_string(),
            "outdated-checkout"
        );
        assert_eq!(FixSource::AiGenerated.to_string(), "ai-generated");
        assert_eq!(FixSource::Rerun.to_string(), "rerun");
        assert_eq!(FixSource::AiGenerated.pattern_name(), None);
    }

    #[test]
    fn test_change_set_paths() {
        let cs = ChangeSet::new(vec![
            FileEdit::new(".github/workflows/ci.yml", "a"),
            FileEdit::new("package.json", "{}"),
        ]);
        assert_eq!(cs.paths(), vec![".github/workflows/ci.yml", "package.json"]);
        assert!(!cs.is_empty());
        assert!(ChangeSet::default().is_empty());
    }
}
