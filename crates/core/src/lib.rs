//! git-p4-sync core library.
//!
//! Replays Perforce changelists as Git commits: configuration, ignore rules,
//! the tree mirror, depot path resolution, the Perforce and Git clients, and
//! the changelist orchestrator that ties them together.

pub mod config;
pub mod errors;
pub mod git;
pub mod ignore;
pub mod mirror;
pub mod models;
pub mod orchestrator;
pub mod p4;
pub mod report;
pub mod resolver;

// Re-exports for convenience.
pub use config::SyncConfig;
pub use git::{DestinationVcs, GitCli, GitClient};
pub use ignore::IgnoreRules;
pub use mirror::TreeMirror;
pub use models::{ChangeId, ChangeRange};
pub use orchestrator::{ChangelistOrchestrator, RangeSummary, SyncOptions};
pub use p4::{P4Client, SourceControl};
pub use report::{Event, Reporter, TracingReporter};
pub use resolver::PathResolver;
