//! Domain model types used throughout git-p4-sync.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Changelists
// ---------------------------------------------------------------------------

/// A Perforce changelist number.
///
/// Changelist ids arrive as strings from `p4` but always order numerically:
/// `9` sorts before `10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(u64);

impl ChangeId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

/// An inclusive changelist range, parsed from `FIRST,LAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRange {
    pub first: ChangeId,
    pub last: ChangeId,
}

impl ChangeRange {
    pub fn new(first: ChangeId, last: ChangeId) -> Self {
        Self { first, last }
    }

    /// The revision-range suffix used in view expressions (`100,105`).
    pub fn revision_spec(&self) -> String {
        format!("{},{}", self.first, self.last)
    }
}

impl fmt::Display for ChangeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.first, self.last)
    }
}

impl FromStr for ChangeRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRange(s.to_string());
        let (first, last) = s.split_once(',').ok_or_else(invalid)?;
        let first: ChangeId = first.parse().map_err(|_| invalid())?;
        let last: ChangeId = last.parse().map_err(|_| invalid())?;
        if first > last {
            return Err(invalid());
        }
        Ok(Self { first, last })
    }
}

/// One row of `p4 changes` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub id: ChangeId,
    pub user: String,
    pub time: DateTime<Utc>,
}

/// A fully described submitted change, as returned by `p4 describe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    pub description: String,
    pub submit_time: DateTime<Utc>,
    pub user: String,
}

impl Change {
    /// First line of the description, for log output.
    pub fn summary(&self) -> &str {
        self.description.lines().next().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Path mappings
// ---------------------------------------------------------------------------

/// A configured depot path and where it lands in the Git repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// Depot path, e.g. `//depot/project/src/...`.
    pub logical: String,
    /// Destination path relative to the Git repository root.
    pub dest_rel: PathBuf,
}

/// A mapping whose depot path has been resolved to a local workspace path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    pub logical: String,
    /// Absolute local path of the depot path inside the Perforce workspace.
    pub source: PathBuf,
    /// Absolute destination path inside the Git work tree.
    pub dest: PathBuf,
    /// `dest` relative to the Git repository root, used for staging.
    pub dest_rel: PathBuf,
}

impl ResolvedMapping {
    /// Depot view covering everything under the mapping (`//depot/x/...`).
    pub fn view(&self) -> String {
        depot_view(&self.logical)
    }
}

/// Append `/...` to a depot path unless it already ends in a wildcard.
pub fn depot_view(logical: &str) -> String {
    if logical.ends_with("...") {
        logical.to_string()
    } else {
        format!("{}/...", logical.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Direction of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Perforce changelists replayed as Git commits.
    Forward,
    /// Git work tree pushed back into the Perforce workspace.
    Reverse,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Reverse => write!(f, "reverse"),
        }
    }
}

/// Where the orchestrator is within a range run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Discovering,
    Syncing,
    Mirroring,
    Committing,
    /// Terminal: a commit failed and the operator has to intervene.
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Discovering => write!(f, "discovering"),
            Self::Syncing => write!(f, "syncing"),
            Self::Mirroring => write!(f, "mirroring"),
            Self::Committing => write!(f, "committing"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
