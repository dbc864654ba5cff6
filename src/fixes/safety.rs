//! Safety policy for proposed change sets.
//!
//! Only files on the allow-list may be rewritten, and only a handful at a
//! time. Anything else sends the failure straight to a human.

use glob::{MatchOptions, Pattern};

use crate::config::SafetyConfig;
use crate::error::MedicError;
use crate::models::ChangeSet;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    allowed: Vec<Pattern>,
    max_files: usize,
    max_file_bytes: usize,
}

impl SafetyPolicy {
    pub fn from_config(config: &SafetyConfig) -> Result<Self, MedicError> {
        let allowed = config
            .allowed_paths
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    MedicError::InvalidConfig(format!("safety.allowed_paths entry '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            allowed,
            max_files: config.max_files,
            max_file_bytes: config.max_file_bytes,
        })
    }

    pub fn allowed_patterns(&self) -> Vec<&str> {
        self.allowed.iter().map(|p| p.as_str()).collect()
    }

    pub fn is_allowed_path(&self, path: &str) -> bool {
        path_problem(path).is_none()
            && self
                .allowed
                .iter()
                .any(|p| p.matches_with(path, MATCH_OPTIONS))
    }

    /// Every reason `change_set` may not be committed. Empty means safe.
    ///
    /// `allow_empty` is set for rerun-only proposals, which carry no edits.
    pub fn check(&self, change_set: &ChangeSet, allow_empty: bool) -> Vec<String> {
        let mut violations = Vec::new();

        if change_set.is_empty() && !allow_empty {
            violations.push("change set is empty".to_string());
        }

        if change_set.edits.len() > self.max_files {
            violations.push(format!(
                "change set touches {} files (max: {})",
                change_set.edits.len(),
                self.max_files
            ));
        }

        let mut seen: Vec<&str> = Vec::new();
        for edit in &change_set.edits {
            let path = edit.path.as_str();

            if let Some(problem) = path_problem(path) {
                violations.push(format!("{path}: {problem}"));
            } else if !self.allowed.iter().any(|p| p.matches_with(path, MATCH_OPTIONS)) {
                violations.push(format!("{path}: not in the allowed paths"));
            }

            if edit.content.len() > self.max_file_bytes {
                violations.push(format!(
                    "{path}: {} bytes (max: {})",
                    edit.content.len(),
                    self.max_file_bytes
                ));
            }

            if seen.contains(&path) {
                violations.push(format!("{path}: edited more than once"));
            }
            seen.push(path);
        }

        violations
    }
}

fn path_problem(path: &str) -> Option<&'static str> {
    if path.trim().is_empty() {
        return Some("empty path");
    }
    if path.starts_with('/') || path.contains(':') {
        return Some("absolute path");
    }
    if path.contains('\\') {
        return Some("backslash in path");
    }
    let mut parts = path.split('/');
    if parts.any(|part| part == "..") {
        return Some("path traversal");
    }
    if path.split('/').any(|part| part == ".git") {
        return Some("git metadata");
    }
    if path.split('/').any(|part| part.is_empty() || part == ".") {
        return Some("non-canonical path");
    }
    None
}
