//! Error types for the git-p4-sync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ChangeId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    P4(#[from] P4Error),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Perforce errors
// ---------------------------------------------------------------------------

/// Errors from `p4` CLI operations.
#[derive(Debug, Error)]
pub enum P4Error {
    /// The `p4` binary was not found on `$PATH`.
    #[error("p4 binary not found: {0}")]
    BinaryNotFound(String),

    /// A `p4` command exited with a non-zero status.
    #[error("p4 command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// The server reported an error record in tagged output.
    #[error("p4 reported an error: {0}")]
    ServerError(String),

    /// Could not parse the tagged output produced by `p4`.
    #[error("failed to parse p4 output: {0}")]
    ParseError(String),

    /// `p4 describe` returned nothing for the change.
    #[error("p4 change {0} not found")]
    ChangeNotFound(ChangeId),

    /// Generic I/O wrapper.
    #[error("p4 I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from the destination Git repository.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// The staged tree is identical to HEAD.
    #[error("nothing to commit, staged tree matches HEAD")]
    NothingToCommit,

    /// `git commit` exited non-zero.
    #[error("git commit failed: {stderr}")]
    CommitFailed { stdout: String, stderr: String },

    /// Any other `git` invocation exited non-zero.
    #[error("git command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// A path to stage lies outside the repository work tree.
    #[error("path '{0}' is outside the repository work tree")]
    PathOutsideRepo(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GitError {
    /// Captured diagnostic output, if the error carries any.
    pub fn diagnostics(&self) -> String {
        match self {
            Self::CommitFailed { stdout, stderr } => {
                format!("{}\n{}", stderr.trim(), stdout.trim()).trim().to_string()
            }
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Mirror errors
// ---------------------------------------------------------------------------

/// Errors raised while mirroring one directory tree onto another.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Walking a tree failed (missing root, permission denied, loops).
    #[error("failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A filesystem operation on a single entry failed.
    #[error("failed to {op} '{path}': {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors from the changelist orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Committing a replayed change failed; the range stops here.
    #[error("failed to commit changes from CL {change}, no changes?\n{detail}")]
    CommitFailed { change: ChangeId, detail: String },

    /// No mapping survived path resolution.
    #[error("no mapped paths could be resolved to local workspace paths")]
    NoResolvedPaths,

    /// Underlying Perforce error.
    #[error("sync p4 error: {0}")]
    P4Error(#[from] P4Error),

    /// Underlying Git error (outside the commit step).
    #[error("sync git error: {0}")]
    GitError(#[from] GitError),

    /// Mirroring a mapped tree failed.
    #[error("sync mirror error: {0}")]
    MirrorError(#[from] MirrorError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// An ignore pattern does not compile.
    #[error("invalid ignore pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },

    /// A changelist range argument is malformed.
    #[error("invalid changelist range '{0}', expected FIRST,LAST")]
    InvalidRange(String),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = P4Error::ChangeNotFound(ChangeId::new(42));
        assert_eq!(err.to_string(), "p4 change 42 not found");

        let err = GitError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = SyncError::CommitFailed {
            change: ChangeId::new(103),
            detail: "nothing to commit".into(),
        };
        assert!(err.to_string().contains("CL 103"));

        let err = ConfigError::InvalidRange("abc".into());
        assert!(err.to_string().contains("FIRST,LAST"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = P4Error::ChangeNotFound(ChangeId::new(1)).into();
        assert!(matches!(core_err, CoreError::P4(_)));

        let core_err: CoreError = GitError::NothingToCommit.into();
        assert!(matches!(core_err, CoreError::Git(_)));
    }

    #[test]
    fn test_commit_failed_diagnostics() {
        let err = GitError::CommitFailed {
            stdout: "On branch main\nnothing to commit\n".into(),
            stderr: "".into(),
        };
        assert_eq!(err.diagnostics(), "On branch main\nnothing to commit");
        assert_eq!(
            GitError::NothingToCommit.diagnostics(),
            "nothing to commit, staged tree matches HEAD"
        );
    }
}
