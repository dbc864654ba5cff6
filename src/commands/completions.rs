use anyhow::Result;
use clap::{Command, ValueEnum};
use clap_complete::{generate, shells};
use std::io::{self, Write};

/// Shells we generate completion scripts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

/// Write the completion script for `shell` to `out`.
pub fn generate_completions(cmd: &mut Command, shell: Shell, out: &mut dyn Write) {
    let bin_name = cmd.get_name().to_string();

    match shell {
        Shell::Bash => generate(shells::Bash, cmd, bin_name, out),
        Shell::Zsh => generate(shells::Zsh, cmd, bin_name, out),
        Shell::Fish => generate(shells::Fish, cmd, bin_name, out),
    }
}

pub fn execute(cmd: &mut Command, shell: Shell) -> Result<()> {
    let mut stdout = io::stdout();
    generate_completions(cmd, shell, &mut stdout);
    stdout.flush()?;
    Ok(())
}
