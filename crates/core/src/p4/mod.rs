//! Perforce access for git-p4-sync.
//!
//! The orchestrator only talks to [`SourceControl`]; [`P4Client`] is the
//! implementation that shells out to `p4`.

pub mod client;
pub mod parser;

pub use client::P4Client;
pub use parser::LocalMapping;

use crate::errors::P4Error;
use crate::models::{Change, ChangeId, ChangeSummary};

/// The operations the sync needs from the source version-control system.
pub trait SourceControl {
    /// Local filesystem locations of a depot path (`p4 where`).
    fn where_local(&self, logical: &str) -> Result<Vec<LocalMapping>, P4Error>;

    /// Submitted changes touching any of the view expressions.
    fn changes(&self, views: &[String]) -> Result<Vec<ChangeSummary>, P4Error>;

    /// Description, submit time and user of one change.
    fn describe(&self, id: ChangeId) -> Result<Change, P4Error>;

    /// Sync the workspace to the given revision-qualified views.
    fn sync(&self, views: &[String]) -> Result<(), P4Error>;

    /// Open added, edited and deleted files under the views as pending work.
    fn reconcile(&self, views: &[String]) -> Result<(), P4Error>;
}
