use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of failure the analyzer believes it is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    DependencyConflict,
    MissingEnvVar,
    ConfigError,
    TestFailure,
    Timeout,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::DependencyConflict => "dependency-conflict",
            FailureCategory::MissingEnvVar => "missing-env-var",
            FailureCategory::ConfigError => "config-error",
            FailureCategory::TestFailure => "test-failure",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Unknown => "unknown",
        }
    }

    /// Map a free-form category label onto the enumeration.
    ///
    /// Accepts the canonical names plus the looser labels models tend to
    /// produce (`dependency`, `syntax`, `permission`, `secret`, ...).
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "dependency-conflict" | "dependency" | "dependencies" | "dependency-error" => {
                FailureCategory::DependencyConflict
            }
            "missing-env-var" | "env" | "env-var" | "environment" | "secret" | "secrets"
            | "missing-secret" => FailureCategory::MissingEnvVar,
            "config-error" | "config" | "configuration" | "syntax" | "syntax-error"
            | "permission" | "permissions" => FailureCategory::ConfigError,
            "test-failure" | "test" | "tests" => FailureCategory::TestFailure,
            "timeout" | "timed-out" => FailureCategory::Timeout,
            _ => FailureCategory::Unknown,
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.4 {
            ConfidenceLevel::Low
        } else if score < 0.7 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

/// Structured result of analysing one failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub category: FailureCategory,
    /// One-line summary of the failure
    pub summary: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub suggested_fix: String,
    /// Score in [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub requires_manual_intervention: bool,
    #[serde(default)]
    pub relevant_files: Vec<String>,
}

impl Diagnosis {
    /// Placeholder used when the model is unreachable or talks nonsense.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            category: FailureCategory::Unknown,
            summary: format!("Automatic analysis unavailable: {reason}"),
            root_cause: String::new(),
            suggested_fix: "Manual investigation required".to_string(),
            confidence: 0.0,
            requires_manual_intervention: true,
            relevant_files: Vec::new(),
        }
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.confidence)
    }

    pub fn is_unknown(&self) -> bool {
        self.category == FailureCategory::Unknown
    }
}
