use anyhow::Result;
use colored::{ColoredString, Colorize};

use crate::config::{CommandKind, Config};
use crate::retry::RetryPhase;
use crate::store::{StateStore, TrackedFailure};

use super::truncate;

/// Table of tracked failures. Settled ones are hidden unless `all`.
pub fn execute(config: &Config, all: bool) -> Result<()> {
    config.validate_for(CommandKind::Status)?;

    let store = StateStore::new(&config.state_dir);
    let records: Vec<TrackedFailure> = store
        .list()?
        .into_iter()
        .filter(|t| all || !t.is_settled())
        .collect();

    println!("{}", "medic status".bold().blue());
    println!("{}", "=".repeat(50));

    match store.load_summary()? {
        Some(summary) => {
            let finished = summary
                .finished_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "unfinished".to_string());
            println!(
                "Last cycle: {finished} ({} discovered, {} succeeded, {} escalated, {} deferred)",
                summary.discovered, summary.succeeded, summary.escalated, summary.deferred
            );
        }
        None => println!("Last cycle: {}", "never".dimmed()),
    }

    if records.is_empty() {
        let what = if all { "tracked" } else { "open" };
        println!("\nNo {what} failures in {}", store.root().display());
        return Ok(());
    }

    println!(
        "\n  {:<20} {:<28} {:<24} {:<22} {:<8} {}",
        "CORRELATION", "REPOSITORY", "WORKFLOW", "PHASE", "ATTEMPTS", "ISSUE"
    );
    for tracked in &records {
        let issue = tracked
            .escalation
            .as_ref()
            .and_then(|e| e.issue_number)
            .map(|n| format!("#{n}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:<28} {:<24} {:<22} {:<8} {}",
            tracked.correlation_id(),
            truncate(&tracked.failure.repo.full_name(), 28),
            truncate(&tracked.failure.workflow_name, 24),
            phase_label(tracked.phase()),
            format!("{}/{}", tracked.retry.attempts_made(), tracked.retry.max_attempts()),
            issue
        );
    }

    println!();
    Ok(())
}

fn phase_label(phase: &RetryPhase) -> ColoredString {
    let name = format!("{:<22}", phase.name());
    match phase {
        RetryPhase::Succeeded => name.green(),
        RetryPhase::Exhausted { .. } => name.red(),
        RetryPhase::Retry { .. } => name.yellow(),
        _ => name.cyan(),
    }
}
