use anyhow::Result;
use clap::CommandFactory;
use medic::commands::{self, completions, dashboard, monitor, scan, status};
use medic::logging::init_logging;

use super::types::{Cli, Commands};

pub fn run(cli: Cli) -> Result<()> {
    // Completions must work without a readable config.
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        return completions::execute(&mut cmd, shell);
    }

    let config = commands::load_config(cli.config.as_deref(), cli.state_dir)?;
    init_logging(cli.verbose, cli.quiet, config.log_format);

    match cli.command {
        Commands::Monitor { repos } => monitor::execute(&config, &repos),
        Commands::Scan { repos, json } => scan::execute(&config, &repos, json),
        Commands::Dashboard { host, port } => dashboard::execute(&config, host, port),
        Commands::Status { all } => status::execute(&config, all),
        Commands::Completions { .. } => Ok(()),
    }
}
