//! Input validation for repository names and identifiers.
//!
//! Repository names end up in API paths, branch names and state file names,
//! so they are checked once at the edge and carried around as `RepoName`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MedicError;

/// Maximum length of the owner or the name part of a repository.
pub const MAX_REPO_PART_LENGTH: usize = 100;

/// A validated `owner/name` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName {
    owner: String,
    name: String,
}

impl RepoName {
    pub fn new(owner: &str, name: &str) -> Result<Self, MedicError> {
        let full = format!("{owner}/{name}");
        validate_part(owner, &full)?;
        validate_part(name, &full)?;
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

fn validate_part(part: &str, full: &str) -> Result<(), MedicError> {
    let invalid = |reason: String| MedicError::InvalidRepo {
        name: full.to_string(),
        reason,
    };

    if part.is_empty() {
        return Err(invalid("owner and name must both be non-empty".into()));
    }
    if part.len() > MAX_REPO_PART_LENGTH {
        return Err(invalid(format!(
            "'{part}' is {} characters (max {MAX_REPO_PART_LENGTH})",
            part.len()
        )));
    }
    if part == "." || part == ".." {
        return Err(invalid(format!("'{part}' is a reserved name")));
    }
    let valid_chars = part
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid_chars {
        return Err(invalid(format!(
            "'{part}' contains invalid characters. Use only alphanumeric characters, dashes (-), underscores (_) and dots (.)"
        )));
    }
    Ok(())
}

impl FromStr for RepoName {
    type Err = MedicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.split_once('/') {
            Some((owner, name)) if !name.contains('/') => RepoName::new(owner, name),
            _ => Err(MedicError::InvalidRepo {
                name: trimmed.to_string(),
                reason: "expected the form owner/name".into(),
            }),
        }
    }
}

impl TryFrom<String> for RepoName {
    type Error = MedicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoName> for String {
    fn from(repo: RepoName) -> Self {
        repo.full_name()
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Clap value parser for `owner/name` arguments.
pub fn clap_repo_validator(s: &str) -> Result<RepoName, String> {
    s.parse::<RepoName>().map_err(|e| e.to_string())
}

/// Turn free text into something safe for a branch name segment.
///
/// Lowercases, keeps `[a-z0-9]`, collapses everything else into single dashes
/// and caps the length at `max_len`.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let mut slug: String = slug.trim_matches('-').chars().take(max_len).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "workflow".to_string()
    } else {
        slug
    }
}
