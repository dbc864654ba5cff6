//! Fix commits made with the git CLI in a throwaway worktree.
//!
//! The configured checkout is never touched beyond `git worktree add`: the
//! fix branch is created at the failing commit inside a temporary directory,
//! the edits are written there, committed and optionally pushed. The
//! worktree is removed on every exit path.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::git::{commit_exists, git_binary, run_git, run_git_checked};
use super::ChangeWriter;
use crate::config::LocalCommitConfig;
use crate::github::{CommitRequest, CreatedCommit};
use crate::validation::RepoName;

pub struct LocalGitWriter {
    config: LocalCommitConfig,
}

/// Removes the worktree on drop, and the branch too unless `keep_branch`.
struct WorktreeGuard<'a> {
    checkout: &'a Path,
    path: PathBuf,
    branch: String,
    keep_branch: bool,
}

impl Drop for WorktreeGuard<'_> {
    fn drop(&mut self) {
        let path = self.path.to_string_lossy().to_string();
        if let Err(e) = run_git(&["worktree", "remove", "--force", &path], self.checkout) {
            tracing::warn!(error = %e, worktree = %path, "failed to remove worktree");
        }
        let _ = run_git(&["worktree", "prune"], self.checkout);
        if !self.keep_branch {
            let _ = run_git(&["branch", "-D", &self.branch], self.checkout);
        }
    }
}

impl LocalGitWriter {
    pub fn new(config: LocalCommitConfig) -> Result<Self> {
        git_binary()?;
        Ok(Self { config })
    }

    fn checkout_for(&self, repo: &RepoName) -> Result<&Path> {
        let path = self
            .config
            .checkouts
            .get(&repo.full_name())
            .with_context(|| format!("No local checkout configured for {repo}"))?;
        if !path.join(".git").exists() {
            bail!("{} is not a git checkout", path.display());
        }
        Ok(path)
    }

    fn ensure_base(&self, checkout: &Path, base_sha: &str) -> Result<()> {
        if commit_exists(base_sha, checkout) {
            return Ok(());
        }
        run_git_checked(&["fetch", &self.config.remote, base_sha], checkout)
            .with_context(|| format!("Failed to fetch {base_sha}"))?;
        Ok(())
    }
}

impl ChangeWriter for LocalGitWriter {
    fn name(&self) -> &str {
        "local"
    }

    fn write(&self, repo: &RepoName, request: &CommitRequest) -> Result<CreatedCommit> {
        let checkout = self.checkout_for(repo)?;
        self.ensure_base(checkout, &request.base_sha)?;

        let scratch = tempfile::Builder::new()
            .prefix("medic-")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let worktree = scratch.path().join("worktree");
        let worktree_arg = worktree.to_string_lossy().to_string();

        run_git_checked(
            &[
                "worktree",
                "add",
                "-b",
                &request.branch,
                &worktree_arg,
                &request.base_sha,
            ],
            checkout,
        )
        .with_context(|| format!("Failed to create worktree for {}", request.branch))?;

        let mut guard = WorktreeGuard {
            checkout,
            path: worktree.clone(),
            branch: request.branch.clone(),
            keep_branch: false,
        };

        for edit in &request.edits {
            let target = worktree.join(&edit.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&target, &edit.content)
                .with_context(|| format!("Failed to write {}", edit.path))?;
        }

        let mut add_args = vec!["add", "--"];
        add_args.extend(request.edits.iter().map(|e| e.path.as_str()));
        run_git_checked(&add_args, &worktree)?;

        let mut commit_args: Vec<String> = Vec::new();
        if let Some(author) = &request.author {
            commit_args.extend([
                "-c".to_string(),
                format!("user.name={}", author.name),
                "-c".to_string(),
                format!("user.email={}", author.email),
            ]);
        }
        commit_args.extend([
            "commit".to_string(),
            "--no-verify".to_string(),
            "-m".to_string(),
            request.message.clone(),
        ]);
        let commit_refs: Vec<&str> = commit_args.iter().map(String::as_str).collect();
        run_git_checked(&commit_refs, &worktree).context("Failed to commit fix")?;

        let sha = run_git_checked(&["rev-parse", "HEAD"], &worktree)?;

        if self.config.push {
            let refspec = format!("{0}:refs/heads/{0}", request.branch);
            run_git_checked(&["push", &self.config.remote, &refspec], &worktree)
                .with_context(|| format!("Failed to push {}", request.branch))?;
        }

        guard.keep_branch = true;
        drop(guard);

        tracing::debug!(branch = %request.branch, sha = %sha, "committed fix locally");
        Ok(CreatedCommit {
            branch: request.branch.clone(),
            sha,
        })
    }
}
