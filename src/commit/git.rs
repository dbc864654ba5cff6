//! Thin wrappers around the `git` binary used by the local writer.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Locate `git` on PATH.
pub fn git_binary() -> Result<PathBuf> {
    which::which("git").context("git executable not found on PATH")
}

/// Run `git <args>` in `dir` and return the raw output.
pub fn run_git(args: &[&str], dir: &Path) -> Result<Output> {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("Failed to execute: git {}", args.join(" ")))
}

/// Run `git <args>` in `dir`, fail on a non-zero exit, return trimmed stdout.
pub fn run_git_checked(args: &[&str], dir: &Path) -> Result<String> {
    let output = run_git(args, dir)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let cmd = args.first().unwrap_or(&"");
        bail!("git {cmd} failed: {}", stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Exit status as a bool. Spawn errors count as `false`.
pub fn run_git_bool(args: &[&str], dir: &Path) -> bool {
    run_git(args, dir)
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub fn commit_exists(sha: &str, dir: &Path) -> bool {
    let spec = format!("{sha}^{{commit}}");
    run_git_bool(&["cat-file", "-e", &spec], dir)
}
