use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::{CommandKind, Config};
use crate::dashboard::serve;
use crate::store::StateStore;

/// Serve the dashboard until Ctrl-C.
pub fn execute(config: &Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    config.validate_for(CommandKind::Dashboard)?;

    let host = host.unwrap_or_else(|| config.dashboard.host.clone());
    let port = port.unwrap_or(config.dashboard.port);
    let store = StateStore::new(&config.state_dir);

    println!(
        "{} http://{host}:{port}/ (state: {})",
        "Dashboard".bold().blue(),
        store.root().display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(serve(store, &host, port))
}
