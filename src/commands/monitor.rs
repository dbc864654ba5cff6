use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{CommandKind, Config};
use crate::llm::{backend_from_config, LlmBackend};
use crate::models::CycleSummary;
use crate::monitor::{Monitor, MonitorDeps};
use crate::store::StateStore;
use crate::validation::RepoName;

use super::github_client;

/// Run one monitor cycle and print its summary.
///
/// Failures of individual runs are part of the summary; only errors that stop
/// the whole cycle (configuration, lock, repository listing) are returned.
pub fn execute(config: &Config, repos: &[RepoName]) -> Result<()> {
    config.validate_for(CommandKind::Monitor)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let github = github_client(config, clock.clone())?;
    let llm: Arc<dyn LlmBackend> = Arc::from(
        backend_from_config(config, clock.clone()).context("Failed to set up the AI backend")?,
    );

    let monitor = Monitor::new(
        config,
        MonitorDeps {
            github,
            llm,
            clock,
            store: StateStore::new(&config.state_dir),
        },
    )?;

    let summary = monitor.run_cycle(repos)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &CycleSummary) {
    println!("{}", "Monitor cycle".bold().blue());
    println!("{}", "=".repeat(40));
    println!("  Repositories: {}", summary.repositories);
    println!("  Discovered:   {}", summary.discovered);
    println!("  Resumed:      {}", summary.resumed);
    println!("  Succeeded:    {}", summary.succeeded.to_string().green());
    println!("  Escalated:    {}", summary.escalated.to_string().red());
    println!("  Deferred:     {}", summary.deferred.to_string().yellow());
    println!("  Skipped:      {}", summary.skipped);

    if summary.errors > 0 {
        println!("  Errors:       {}", summary.errors.to_string().red().bold());
        for message in &summary.error_messages {
            println!("    {} {message}", "-".red());
        }
    }
}
