use clap::{Parser, Subcommand};
use medic::commands::completions::Shell;
use medic::validation::{clap_repo_validator, RepoName};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "
   ┌┬┐┌─┐┌┬┐┬┌─┐
   │││├┤  │││├─
   ┴ ┴└─┘─┴┘┴└─┘

{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}";

#[derive(Parser)]
#[command(name = "medic")]
#[command(
    about = "Watches GitHub Actions for failed runs, applies fixes, retries, and escalates",
    long_about = None
)]
#[command(version)]
#[command(help_template = HELP_TEMPLATE)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    /// Config file (default: ./medic.toml, then the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding tracked failures (overrides state_dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one full discovery, fix and retry cycle
    Monitor {
        /// Only look at this repository (repeatable)
        #[arg(long = "repo", value_name = "OWNER/NAME", value_parser = clap_repo_validator)]
        repos: Vec<RepoName>,
    },

    /// List failed runs without changing anything
    Scan {
        /// Only look at this repository (repeatable)
        #[arg(long = "repo", value_name = "OWNER/NAME", value_parser = clap_repo_validator)]
        repos: Vec<RepoName>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Serve the read-only status dashboard
    Dashboard {
        /// Address to bind (default from config, 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (default from config, 5000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show tracked failures
    Status {
        /// Include succeeded and escalated failures
        #[arg(short, long)]
        all: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}
