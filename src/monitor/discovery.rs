//! Which repositories to watch and which of their runs are new failures.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use glob::Pattern;

use crate::config::GitHubConfig;
use crate::github::{GitHubApi, WorkflowRun};
use crate::models::correlation_id;
use crate::store::StateStore;
use crate::validation::RepoName;

/// Repositories to process.
///
/// `explicit` (from the command line) wins over configured repositories,
/// which win over the organisation listing, which wins over the token
/// user's own repositories. The allow and deny globs apply to all sources.
pub fn select_repositories(
    github: &dyn GitHubApi,
    config: &GitHubConfig,
    explicit: &[RepoName],
) -> Result<Vec<RepoName>> {
    let mut repos = if !explicit.is_empty() {
        explicit.to_vec()
    } else if !config.repositories.is_empty() {
        config.repositories.clone()
    } else if let Some(org) = config.org.as_deref() {
        github
            .list_org_repositories(org)
            .with_context(|| format!("Failed to list repositories of {org}"))?
    } else {
        github
            .list_user_repositories()
            .context("Failed to list repositories of the authenticated user")?
    };

    let allow = compile(&config.allow, "github.allow")?;
    let deny = compile(&config.deny, "github.deny")?;

    repos.retain(|repo| {
        let name = repo.full_name();
        (allow.is_empty() || allow.iter().any(|p| p.matches(&name)))
            && !deny.iter().any(|p| p.matches(&name))
    });
    repos.sort_by_key(|r| r.full_name());
    repos.dedup();
    Ok(repos)
}

fn compile(patterns: &[String], field: &str) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("Invalid glob in {field}: {p}")))
        .collect()
}

/// Start of the failure window. Windows reaching past the representable
/// range start at the earliest representable instant.
pub fn lookback_start(now: DateTime<Utc>, lookback_hours: u64) -> DateTime<Utc> {
    i64::try_from(lookback_hours)
        .ok()
        .and_then(Duration::try_hours)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Failed runs worth remediating, newest first.
///
/// Runs on fix branches are results of earlier attempts, not new failures.
pub fn discover_failures(
    github: &dyn GitHubApi,
    repo: &RepoName,
    since: DateTime<Utc>,
    fix_branch_prefix: &str,
) -> Result<Vec<WorkflowRun>> {
    let mut runs = github
        .list_failed_runs(repo, since)
        .with_context(|| format!("Failed to list workflow runs of {repo}"))?;

    runs.retain(|run| !run.branch().starts_with(fix_branch_prefix));
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(runs)
}

/// One line of `medic scan` output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanEntry {
    pub repo: RepoName,
    pub correlation_id: String,
    pub run_id: u64,
    pub workflow: String,
    pub branch: String,
    pub conclusion: String,
    pub created_at: DateTime<Utc>,
    pub html_url: String,
    /// Phase of the tracked record, `None` when untracked
    pub tracked_phase: Option<String>,
}

/// Discovery without side effects.
pub fn scan(
    github: &dyn GitHubApi,
    config: &GitHubConfig,
    store: &StateStore,
    explicit: &[RepoName],
    fix_branch_prefix: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ScanEntry>> {
    let since = lookback_start(now, config.lookback_hours);
    let mut entries = Vec::new();

    for repo in select_repositories(github, config, explicit)? {
        for run in discover_failures(github, &repo, since, fix_branch_prefix)? {
            let id = correlation_id(&repo, run.id);
            let tracked_phase = store
                .load(&id)?
                .map(|tracked| tracked.phase().name().to_string());
            entries.push(ScanEntry {
                repo: repo.clone(),
                correlation_id: id,
                run_id: run.id,
                workflow: run.workflow_name().to_string(),
                branch: run.branch().to_string(),
                conclusion: run.conclusion.clone().unwrap_or_default(),
                created_at: run.created_at,
                html_url: run.html_url.clone(),
                tracked_phase,
            });
        }
    }

    Ok(entries)
}
