//! Git working-copy operations used by the update driver.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::GitError;

pub mod cli;

pub use cli::GitCli;

/// Default name of the remote pointing at the upstream source repository.
pub const DEFAULT_REMOTE: &str = "upstream";

/// Validate a git ref (branch or remote name) before it reaches a git
/// command line.
///
/// Accepts standard ref names (alphanumeric, `/`, `.`, `-`, `_`). Rejects
/// `..` sequences, refs starting with `-` (flag injection) and anything
/// containing shell or revision metacharacters.
pub fn validate_git_ref(s: &str) -> Result<(), GitError> {
    let invalid = |reason: String| GitError::InvalidRef(reason);

    if s.is_empty() {
        return Err(invalid("git ref is empty".to_string()));
    }
    if s.len() > 256 {
        return Err(invalid(format!("git ref too long ({} chars, max 256)", s.len())));
    }
    if s.starts_with('-') {
        return Err(invalid(format!(
            "git ref '{s}' must not start with '-' (could be interpreted as a flag)"
        )));
    }
    if s.contains("..") {
        return Err(invalid(format!("git ref '{s}' must not contain '..'")));
    }
    if s.ends_with('/') || s.ends_with(".lock") {
        return Err(invalid(format!("git ref '{s}' is not a valid branch name")));
    }
    for ch in s.chars() {
        if !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '/' | '.' | '-' | '_') {
            return Err(invalid(format!(
                "invalid character '{ch}' in git ref '{s}': only alphanumeric, /, ., -, _ allowed"
            )));
        }
    }
    Ok(())
}

/// Whether `name` can be joined onto a directory without leaving it: no
/// separators, not `.` or `..`, not empty.
pub fn is_plain_dir_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(&['/', '\\', '\0'][..])
}

/// Whether `path` looks like a git working copy.
pub fn is_working_copy(path: &Path) -> bool {
    path.join(".git").exists()
}

/// The git operations the update driver needs. Implemented by [`GitCli`];
/// tests substitute recording fakes.
#[async_trait]
pub trait RepoOps: Send + Sync {
    /// Check out `branch` tracking `<remote>/<branch>`, bringing it up to
    /// date with the remote.
    ///
    /// Returns [`GitError::BranchNotFoundOnRemote`] when the remote has no
    /// such branch.
    async fn checkout(&self, working_copy: &Path, remote: &str, branch: &str)
        -> Result<(), GitError>;

    /// Stage `files` (relative to the working copy) and commit them.
    /// Returns the new commit SHA.
    async fn commit(
        &self,
        working_copy: &Path,
        files: &[PathBuf],
        message: &str,
    ) -> Result<String, GitError>;

    /// Push `branch` to `remote`.
    async fn push(&self, working_copy: &Path, remote: &str, branch: &str) -> Result<(), GitError>;

    /// Reset `files` in both index and worktree to `HEAD`.
    async fn restore(&self, working_copy: &Path, files: &[PathBuf]) -> Result<(), GitError>;
}
