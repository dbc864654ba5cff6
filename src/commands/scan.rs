use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{CommandKind, Config};
use crate::monitor::{scan, ScanEntry};
use crate::store::StateStore;
use crate::validation::RepoName;

use super::{github_client, truncate};

/// List failed runs in the lookback window. Nothing is written.
pub fn execute(config: &Config, repos: &[RepoName], json: bool) -> Result<()> {
    config.validate_for(CommandKind::Scan)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let github = github_client(config, clock.clone())?;
    let store = StateStore::new(&config.state_dir);

    let entries = scan(
        github.as_ref(),
        &config.github,
        &store,
        repos,
        &config.commit.branch_prefix,
        clock.now(),
    )?;

    if json {
        let out = serde_json::to_string_pretty(&entries).context("Failed to encode scan result")?;
        println!("{out}");
    } else {
        print_entries(&entries, config.github.lookback_hours);
    }
    Ok(())
}

fn print_entries(entries: &[ScanEntry], lookback_hours: u64) {
    if entries.is_empty() {
        println!("No failed runs in the last {lookback_hours}h");
        return;
    }

    println!(
        "{} ({} in the last {lookback_hours}h)",
        "Failed runs".bold().blue(),
        entries.len()
    );
    println!(
        "  {:<20} {:<28} {:<24} {:<18} {}",
        "CORRELATION", "REPOSITORY", "WORKFLOW", "BRANCH", "STATE"
    );

    for entry in entries {
        let state = match &entry.tracked_phase {
            Some(phase) => format!("tracked ({phase})").cyan().to_string(),
            None => "untracked".yellow().to_string(),
        };
        println!(
            "  {:<20} {:<28} {:<24} {:<18} {}",
            entry.correlation_id,
            truncate(&entry.repo.full_name(), 28),
            truncate(&entry.workflow, 24),
            truncate(&entry.branch, 18),
            state
        );
    }
}
