//! [`RepoOps`] backed by the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{validate_git_ref, RepoOps};
use crate::error::GitError;

/// Runs `git` as a subprocess inside each working copy.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, working_copy: &Path, args: &[&str]) -> Result<String, GitError> {
        tracing::debug!(repo = %working_copy.display(), args = ?args, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(working_copy)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn ref_exists(&self, working_copy: &Path, full_ref: &str) -> bool {
        self.run(working_copy, &["rev-parse", "--verify", "--quiet", full_ref])
            .await
            .is_ok()
    }

    /// `(ahead, behind)` of `local` relative to `remote_ref`.
    async fn divergence(
        &self,
        working_copy: &Path,
        local: &str,
        remote_ref: &str,
    ) -> Result<(u64, u64), GitError> {
        let range = format!("{local}...{remote_ref}");
        let out = self
            .run(working_copy, &["rev-list", "--left-right", "--count", &range])
            .await?;
        let mut counts = out.split_whitespace().map(|n| n.parse::<u64>().unwrap_or(0));
        Ok((counts.next().unwrap_or(0), counts.next().unwrap_or(0)))
    }
}

#[async_trait]
impl RepoOps for GitCli {
    async fn checkout(
        &self,
        working_copy: &Path,
        remote: &str,
        branch: &str,
    ) -> Result<(), GitError> {
        validate_git_ref(remote)?;
        validate_git_ref(branch)?;

        if let Err(e) = self.run(working_copy, &["fetch", remote]).await {
            tracing::warn!(repo = %working_copy.display(), error = %e, "Failed to fetch");
        }

        let local_ref = format!("refs/heads/{branch}");
        let remote_branch = format!("{remote}/{branch}");
        let remote_ref = format!("refs/remotes/{remote_branch}");

        if !self.ref_exists(working_copy, &remote_ref).await {
            return Err(GitError::BranchNotFoundOnRemote {
                remote: remote.to_string(),
                branch: branch.to_string(),
            });
        }

        if !self.ref_exists(working_copy, &local_ref).await {
            self.run(working_copy, &["checkout", "-b", branch, &remote_branch])
                .await?;
            return Ok(());
        }

        self.run(working_copy, &["checkout", branch]).await?;

        let (ahead, behind) = self.divergence(working_copy, branch, &remote_branch).await?;
        if ahead > 0 {
            tracing::warn!(
                repo = %working_copy.display(),
                ahead = ahead,
                behind = behind,
                "Local branch diverged from or is ahead of remote, resetting"
            );
            self.run(working_copy, &["reset", "--hard", &remote_branch])
                .await?;
        } else if behind > 0 {
            if let Err(e) = self
                .run(working_copy, &["merge", "--ff-only", &remote_branch])
                .await
            {
                tracing::warn!(repo = %working_copy.display(), error = %e, "Failed to fast-forward");
            }
        }

        Ok(())
    }

    async fn commit(
        &self,
        working_copy: &Path,
        files: &[PathBuf],
        message: &str,
    ) -> Result<String, GitError> {
        let paths: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        let mut add_args = vec!["add", "--"];
        add_args.extend(paths.iter().map(String::as_str));
        self.run(working_copy, &add_args).await?;

        self.run(working_copy, &["commit", "-m", message]).await?;

        let sha = self.run(working_copy, &["rev-parse", "HEAD"]).await?;
        Ok(sha.trim().to_string())
    }

    async fn push(&self, working_copy: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        validate_git_ref(remote)?;
        validate_git_ref(branch)?;
        self.run(working_copy, &["push", remote, branch]).await?;
        Ok(())
    }

    async fn restore(&self, working_copy: &Path, files: &[PathBuf]) -> Result<(), GitError> {
        if files.is_empty() {
            return Ok(());
        }
        let paths: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        let mut args = vec!["checkout", "HEAD", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run(working_copy, &args).await?;
        Ok(())
    }
}
