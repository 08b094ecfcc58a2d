//! Git access for git-p4-sync.
//!
//! The orchestrator only talks to [`DestinationVcs`]. [`GitClient`] does the
//! work in-process through libgit2; [`GitCli`] runs the `git` executable.

pub mod cli;
pub mod client;

pub use cli::GitCli;
pub use client::GitClient;

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{AuthorEntry, GitBackend};
use crate::errors::GitError;

/// Everything needed to record one replayed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub message: String,
    pub author_time: DateTime<Utc>,
    pub committer_time: DateTime<Utc>,
    /// Overrides the repository identity for the author only.
    pub author: Option<AuthorEntry>,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub id: String,
}

/// The operations the sync needs from the destination repository.
pub trait DestinationVcs {
    /// Drop anything staged but not committed.
    fn unstage_all(&self) -> Result<(), GitError>;

    /// Stage all changes (including deletions) under repo-relative `paths`.
    fn stage(&self, paths: &[PathBuf]) -> Result<(), GitError>;

    /// Commit the staged state. An unchanged tree is an error.
    fn commit(&self, request: &CommitRequest) -> Result<CommitReceipt, GitError>;
}

/// Open the configured backend on the repository at `repo_path`.
pub fn open_backend(backend: GitBackend, repo_path: &Path) -> Result<Box<dyn DestinationVcs>, GitError> {
    Ok(match backend {
        GitBackend::Libgit2 => Box::new(GitClient::new(repo_path)?),
        GitBackend::Cli => Box::new(GitCli::new(repo_path)?),
    })
}

/// Repo-relative paths as forward-slash pathspecs (`.` for the root).
pub(crate) fn pathspecs(paths: &[PathBuf]) -> Result<Vec<String>, GitError> {
    paths
        .iter()
        .map(|p| {
            let mut parts = Vec::new();
            for component in p.components() {
                match component {
                    Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
                    Component::CurDir => {}
                    _ => return Err(GitError::PathOutsideRepo(p.display().to_string())),
                }
            }
            Ok(if parts.is_empty() {
                ".".to_string()
            } else {
                parts.join("/")
            })
        })
        .collect()
}
