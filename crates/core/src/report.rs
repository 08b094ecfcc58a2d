//! Reporting capability handed to the mirror and the orchestrator.
//!
//! Components never log decisions through a global formatter; they emit
//! [`Event`]s to the [`Reporter`] they were given. [`TracingReporter`] turns
//! every event into a `tracing` record and is what the library uses unless a
//! caller supplies something richer.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::models::{Change, ChangeId, ChangeRange, RunPhase};

/// A single filesystem decision made by the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorAction {
    CreateDir(PathBuf),
    Copy(PathBuf),
    RemoveFile(PathBuf),
    RemoveDir(PathBuf),
}

impl fmt::Display for MirrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDir(p) => write!(f, "mkdir {}", p.display()),
            Self::Copy(p) => write!(f, "copy  {}", p.display()),
            Self::RemoveFile(p) => write!(f, "rm    {}", p.display()),
            Self::RemoveDir(p) => write!(f, "rmdir {}/", p.display()),
        }
    }
}

/// Which version-control system a command was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vcs {
    P4,
    Git,
}

impl fmt::Display for Vcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P4 => write!(f, "p4"),
            Self::Git => write!(f, "git"),
        }
    }
}

/// Everything a run reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A mirror decision. `applied` is false in dry-run mode.
    Mirror { action: MirrorAction, applied: bool },
    /// A mutating VCS command. `applied` is false in dry-run mode.
    Command { vcs: Vcs, command: String, applied: bool },
    Phase(RunPhase),
    NoChanges(ChangeRange),
    Discovered(Vec<ChangeId>),
    Replaying(Change),
    Committed(Change),
    CommitFailed { change: ChangeId, detail: String },
}

/// Sink for [`Event`]s.
pub trait Reporter {
    fn report(&self, event: &Event);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &Event) {
        match event {
            Event::Mirror { action, applied } => {
                debug!(applied = *applied, "{}", action);
            }
            Event::Command { vcs, command, applied } => {
                debug!(applied = *applied, "{} {}", vcs, command);
            }
            Event::Phase(phase) => debug!(%phase, "phase changed"),
            Event::NoChanges(range) => {
                info!("No changes to mapped paths in range @{}", range);
            }
            Event::Discovered(ids) => info!(count = ids.len(), "found affected changelists"),
            Event::Replaying(change) => {
                debug!(change = %change.id, "Syncing CL {}: {}", change.id, change.summary());
            }
            Event::Committed(change) => {
                info!(change = %change.id, "Committed CL {}: {}", change.id, change.summary());
            }
            Event::CommitFailed { change, detail } => {
                error!(change = %change, "git: {}", detail);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_action_display() {
        assert_eq!(MirrorAction::Copy("a/b.txt".into()).to_string(), "copy  a/b.txt");
        assert_eq!(MirrorAction::RemoveDir("old".into()).to_string(), "rmdir old/");
        assert_eq!(MirrorAction::CreateDir("new".into()).to_string(), "mkdir new");
        assert_eq!(MirrorAction::RemoveFile("x".into()).to_string(), "rm    x");
    }

    #[test]
    fn test_vcs_display() {
        assert_eq!(Vcs::P4.to_string(), "p4");
        assert_eq!(Vcs::Git.to_string(), "git");
    }
}
