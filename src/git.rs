use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::GitError;

/// Remote every update pulls from
pub const DEFAULT_REMOTE: &str = "origin";

/// The two git operations a mirror run consumes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitOperations: Send + Sync {
    /// Clone `url` into `destination`, which must not exist yet
    async fn clone_repository(&self, url: &str, destination: &Path) -> Result<(), GitError>;

    /// Pull an existing local clone from its configured remote
    async fn update_repository(&self, path: &Path) -> Result<(), GitError>;
}

/// Git operations backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitClient {
    remote: String,
    fast_forward_only: bool,
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new(false)
    }
}

impl GitClient {
    pub fn new(fast_forward_only: bool) -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            fast_forward_only,
        }
    }

    async fn git(&self, dir: Option<&Path>, args: &[&str]) -> Result<Output, GitError> {
        let mut command = AsyncCommand::new("git");
        command.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            command.current_dir(dir);
            if let Some(ceiling) = ceiling_of(dir) {
                command.env("GIT_CEILING_DIRECTORIES", ceiling);
            }
        }

        command.output().await.map_err(|source| GitError::Spawn {
            command: args.first().copied().unwrap_or_default().to_string(),
            source,
        })
    }

    /// Run git and fail unless it exits successfully
    async fn git_checked(&self, dir: Option<&Path>, args: &[&str]) -> Result<Output, GitError> {
        let output = self.git(dir, args).await?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }

    async fn is_bare(&self, path: &Path) -> Result<bool, GitError> {
        let output = self
            .git(Some(path), &["rev-parse", "--is-bare-repository"])
            .await?;

        if !output.status.success() {
            return Err(GitError::NotARepository(path.to_path_buf()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> Result<bool, GitError> {
        let output = self
            .git_checked(Some(path), &["status", "--porcelain", "--untracked-files=no"])
            .await?;

        Ok(!output.stdout.is_empty())
    }

    async fn has_remote(&self, path: &Path) -> Result<bool, GitError> {
        let output = self
            .git(Some(path), &["remote", "get-url", &self.remote])
            .await?;

        Ok(output.status.success())
    }

    /// Reject checkouts a pull could damage or cannot serve
    async fn check_update_preconditions(&self, path: &Path) -> Result<(), GitError> {
        if self.is_bare(path).await? {
            return Err(GitError::Bare(path.to_path_buf()));
        }

        if self.has_uncommitted_changes(path).await? {
            return Err(GitError::DirtyWorkingTree(path.to_path_buf()));
        }

        if !self.has_remote(path).await? {
            return Err(GitError::MissingRemote {
                path: path.to_path_buf(),
                remote: self.remote.clone(),
            });
        }

        Ok(())
    }
}

/// Parent of `dir`, so git never discovers a repository enclosing `dir`
fn ceiling_of(dir: &Path) -> Option<PathBuf> {
    let dir = std::fs::canonicalize(dir).ok()?;
    dir.parent().map(Path::to_path_buf)
}

#[async_trait]
impl GitOperations for GitClient {
    async fn clone_repository(&self, url: &str, destination: &Path) -> Result<(), GitError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| GitError::CreateParent {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let destination_arg = destination.to_string_lossy();
        self.git_checked(None, &["clone", url, &destination_arg])
            .await?;

        Ok(())
    }

    async fn update_repository(&self, path: &Path) -> Result<(), GitError> {
        self.check_update_preconditions(path).await?;

        let mut args = vec!["pull", self.remote.as_str()];
        if self.fast_forward_only {
            args.push("--ff-only");
        }

        let output = self.git_checked(Some(path), &args).await?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("{}: {}", path.display(), line);
        }

        Ok(())
    }
}
