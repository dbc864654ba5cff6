//! Command implementations behind the CLI.
//!
//! Each command loads what it needs, checks its configuration with
//! [`Config::validate_for`] and prints human output to stdout. Logs go to
//! stderr through `tracing`.

pub mod completions;
pub mod dashboard;
pub mod monitor;
pub mod scan;
pub mod status;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::MedicError;
use crate::github::{GitHubApi, GitHubClient};

/// Load the configuration, letting `--state-dir` win over file and env.
pub fn load_config(explicit: Option<&Path>, state_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load(explicit).context("Failed to load configuration")?;
    if let Some(dir) = state_dir {
        config.state_dir = dir;
    }
    Ok(config)
}

pub(crate) fn github_client(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn GitHubApi>> {
    let token = config
        .credentials
        .github_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| MedicError::MissingConfig("GITHUB_TOKEN is required".to_string()))?;
    let client = GitHubClient::new(&config.github, token, clock)
        .context("Failed to create GitHub client")?;
    Ok(Arc::new(client))
}

/// Shorten a string to `max` characters for table cells.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}
