use std::path::PathBuf;

use super::{Config, LogFormat};
use crate::error::MedicError;
use crate::validation::RepoName;

/// Overlay environment variables onto `config`. Environment wins.
///
/// `lookup` abstracts `std::env::var` so the mapping can be tested without
/// touching the process environment.
pub fn apply_env_overlay<F>(config: &mut Config, lookup: F) -> Result<(), MedicError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    config.credentials.github_token = get("GITHUB_TOKEN");
    config.credentials.openai_api_key = get("OPENAI_API_KEY");
    config.credentials.anthropic_api_key = get("ANTHROPIC_API_KEY");

    if let Some(org) = get("GITHUB_ORG") {
        config.github.org = Some(org);
    }
    if let Some(repos) = get("GITHUB_REPOS") {
        config.github.repositories = split_list(&repos)
            .iter()
            .map(|r| r.parse::<RepoName>())
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(url) = get("GITHUB_API_URL") {
        config.github.api_url = url;
    }
    if let Some(hours) = get("LOOKBACK_HOURS") {
        config.github.lookback_hours = parse_number("LOOKBACK_HOURS", &hours)?;
    }

    if let Some(provider) = get("AI_PROVIDER") {
        config.ai.provider = provider.parse()?;
    }
    if let Some(model) = get("AI_MODEL") {
        config.ai.model = Some(model);
    }

    if let Some(host) = get("DASHBOARD_HOST") {
        config.dashboard.host = host;
    }
    if let Some(port) = get("DASHBOARD_PORT") {
        config.dashboard.port = parse_number("DASHBOARD_PORT", &port)?;
    }

    if let Some(flag) = get("CREATE_ISSUES") {
        config.notify.create_issues = parse_bool("CREATE_ISSUES", &flag)?;
    }
    if let Some(assignees) = get("ISSUE_ASSIGNEES") {
        config.notify.assignees = split_list(&assignees);
    }

    if let Some(max) = get("MAX_RETRIES") {
        config.retry.max_attempts = parse_number("MAX_RETRIES", &max)?;
    }
    if let Some(delay) = get("RETRY_DELAY_SECONDS") {
        config.retry.base_delay_secs = parse_number("RETRY_DELAY_SECONDS", &delay)?;
    }
    if let Some(flag) = get("EXPONENTIAL_BACKOFF") {
        config.retry.exponential_backoff = parse_bool("EXPONENTIAL_BACKOFF", &flag)?;
    }

    if let Some(dir) = get("MEDIC_STATE_DIR") {
        config.state_dir = PathBuf::from(dir);
    }
    if let Some(format) = get("MEDIC_LOG_FORMAT") {
        config.log_format = match format.to_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(MedicError::InvalidConfig(format!(
                    "MEDIC_LOG_FORMAT must be text or json, got '{other}'"
                )))
            }
        };
    }

    Ok(())
}

/// Comma-separated list, blanks dropped.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, MedicError> {
    value
        .parse()
        .map_err(|_| MedicError::InvalidConfig(format!("{key} must be a number, got '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, MedicError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(MedicError::InvalidConfig(format!(
            "{key} must be true or false, got '{value}'"
        ))),
    }
}
