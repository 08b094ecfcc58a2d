//! Changelist replay engine.
//!
//! The [`ChangelistOrchestrator`] drives a forward run one change at a time:
//!
//! 1. Discover the changes touching the mapped views within a range.
//! 2. Drop whatever a previous interrupted run left staged.
//! 3. For each change in ascending numeric order: describe it, sync the
//!    workspace to it, mirror every mapping, stage and commit.
//!
//! A failed commit is fatal for the range. Nothing already committed or
//! mirrored is rolled back. Runs are strictly sequential; only one instance
//! may work against a given workspace and repository at a time.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::{AuthorEntry, SyncConfig};
use crate::errors::SyncError;
use crate::git::{CommitReceipt, CommitRequest, DestinationVcs};
use crate::ignore::IgnoreRules;
use crate::mirror::TreeMirror;
use crate::models::{Change, ChangeId, ChangeRange, ResolvedMapping, RunPhase, SyncDirection};
use crate::p4::SourceControl;
use crate::report::{Event, Reporter, Vcs};

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Compute and report every decision without mutating anything.
    pub dry_run: bool,
    /// Append `CL <id>` to each commit message.
    pub trailer: bool,
    /// Source user -> git author.
    pub authors: HashMap<String, AuthorEntry>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            trailer: true,
            authors: HashMap::new(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig, dry_run: bool) -> Self {
        Self {
            dry_run,
            trailer: config.commit.trailer,
            authors: config.authors.clone(),
        }
    }
}

/// Outcome of [`ChangelistOrchestrator::sync_range`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSummary {
    pub discovered: Vec<ChangeId>,
    /// Changes fully replayed (committed, or walked through in dry-run).
    pub replayed: Vec<ChangeId>,
    /// Commit ids created, in order. Empty in dry-run.
    pub commits: Vec<String>,
}

pub struct ChangelistOrchestrator<'a> {
    source: &'a dyn SourceControl,
    dest: &'a dyn DestinationVcs,
    mappings: Vec<ResolvedMapping>,
    rules: &'a IgnoreRules,
    reporter: &'a dyn Reporter,
    options: SyncOptions,
    phase: Cell<RunPhase>,
}

impl<'a> ChangelistOrchestrator<'a> {
    pub fn new(
        source: &'a dyn SourceControl,
        dest: &'a dyn DestinationVcs,
        mappings: Vec<ResolvedMapping>,
        rules: &'a IgnoreRules,
        reporter: &'a dyn Reporter,
        options: SyncOptions,
    ) -> Self {
        info!(
            mappings = mappings.len(),
            dry_run = options.dry_run,
            "initializing changelist orchestrator"
        );
        Self {
            source,
            dest,
            mappings,
            rules,
            reporter,
            options,
            phase: Cell::new(RunPhase::Idle),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase.get()
    }

    /// Ids of submitted changes touching any mapped view within `range`,
    /// deduplicated and in ascending numeric order.
    pub fn discover(&self, range: ChangeRange) -> Result<Vec<ChangeId>, SyncError> {
        self.ensure_resolved()?;
        self.set_phase(RunPhase::Discovering);

        let views = self.views_at(&range.revision_spec());
        let summaries = self.source.changes(&views)?;
        let ids: Vec<ChangeId> = summaries
            .into_iter()
            .map(|s| s.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if ids.is_empty() {
            self.reporter.report(&Event::NoChanges(range));
        } else {
            self.reporter.report(&Event::Discovered(ids.clone()));
        }
        Ok(ids)
    }

    /// Replay every change in `range` as one commit each.
    ///
    /// An empty range is a successful no-op. Stops at the first failure.
    pub fn sync_range(&self, range: ChangeRange) -> Result<RangeSummary, SyncError> {
        info!(direction = %SyncDirection::Forward, %range, "starting sync");
        let result = self.run_range(range);
        self.finish(result)
    }

    fn run_range(&self, range: ChangeRange) -> Result<RangeSummary, SyncError> {
        let mut summary = RangeSummary {
            discovered: self.discover(range)?,
            ..Default::default()
        };
        if summary.discovered.is_empty() {
            return Ok(summary);
        }

        self.mutate(Vcs::Git, "reset HEAD".to_string(), || self.dest.unstage_all())?;

        for &id in &summary.discovered {
            if let Some(receipt) = self.sync_one(id)? {
                summary.commits.push(receipt.id);
            }
            summary.replayed.push(id);
        }
        Ok(summary)
    }

    /// Replay a single change. Returns the commit receipt, or `None` in
    /// dry-run.
    pub fn sync_one(&self, id: ChangeId) -> Result<Option<CommitReceipt>, SyncError> {
        self.ensure_resolved()?;
        let change = self.source.describe(id)?;
        self.reporter.report(&Event::Replaying(change.clone()));

        self.set_phase(RunPhase::Syncing);
        let views = self.views_at(&id.to_string());
        self.mutate(Vcs::P4, format!("sync {}", views.join(" ")), || {
            self.source.sync(&views)
        })?;

        self.set_phase(RunPhase::Mirroring);
        let mirror = TreeMirror::new(self.rules, self.reporter, self.options.dry_run);
        for mapping in &self.mappings {
            let report = mirror.mirror(&mapping.source, &mapping.dest)?;
            debug!(
                change = %id,
                logical = %mapping.logical,
                copied = report.copied(),
                removed = report.removed(),
                "mirrored mapping"
            );
        }

        self.set_phase(RunPhase::Committing);
        let paths: Vec<PathBuf> = self.mappings.iter().map(|m| m.dest_rel.clone()).collect();
        let listed = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.mutate(Vcs::Git, format!("add {}", listed), || self.dest.stage(&paths))?;

        let request = self.commit_request(&change);
        self.reporter.report(&Event::Command {
            vcs: Vcs::Git,
            command: format!("commit -m {:?}", change.summary()),
            applied: !self.options.dry_run,
        });
        if self.options.dry_run {
            return Ok(None);
        }

        match self.dest.commit(&request) {
            Ok(receipt) => {
                self.reporter.report(&Event::Committed(change));
                Ok(Some(receipt))
            }
            Err(e) => {
                let detail = e.diagnostics();
                self.set_phase(RunPhase::Failed);
                self.reporter.report(&Event::CommitFailed {
                    change: id,
                    detail: detail.clone(),
                });
                Err(SyncError::CommitFailed { change: id, detail })
            }
        }
    }

    /// Push the destination trees back into the workspace and open the
    /// differences as pending work with `p4 reconcile`.
    ///
    /// Nothing is synced first and nothing is submitted.
    pub fn reverse(&self) -> Result<(), SyncError> {
        info!(direction = %SyncDirection::Reverse, "starting sync");
        let result = self.run_reverse();
        self.finish(result)
    }

    fn run_reverse(&self) -> Result<(), SyncError> {
        self.ensure_resolved()?;
        self.set_phase(RunPhase::Mirroring);
        let mirror = TreeMirror::new(self.rules, self.reporter, self.options.dry_run);
        for mapping in &self.mappings {
            mirror.mirror(&mapping.dest, &mapping.source)?;
        }

        self.set_phase(RunPhase::Syncing);
        let views = self.views();
        self.mutate(Vcs::P4, format!("reconcile {}", views.join(" ")), || {
            self.source.reconcile(&views)
        })
    }

    fn commit_request(&self, change: &Change) -> CommitRequest {
        let message = if self.options.trailer {
            format!("{}\nCL {}", change.description, change.id)
        } else {
            change.description.clone()
        };
        let author = self.options.authors.get(&change.user).cloned();
        if author.is_none() && !self.options.authors.is_empty() {
            debug!(user = %change.user, "no author mapping, using repository identity");
        }
        CommitRequest {
            message,
            author_time: change.submit_time,
            committer_time: change.submit_time,
            author,
        }
    }

    /// Report a mutating command and run it unless this is a dry run.
    fn mutate<E>(&self, vcs: Vcs, command: String, op: impl FnOnce() -> Result<(), E>) -> Result<(), SyncError>
    where
        SyncError: From<E>,
    {
        let applied = !self.options.dry_run;
        self.reporter.report(&Event::Command { vcs, command, applied });
        if applied {
            op()?;
        }
        Ok(())
    }

    fn views(&self) -> Vec<String> {
        self.mappings.iter().map(ResolvedMapping::view).collect()
    }

    fn views_at(&self, revision: &str) -> Vec<String> {
        self.mappings
            .iter()
            .map(|m| format!("{}@{}", m.view(), revision))
            .collect()
    }

    fn ensure_resolved(&self) -> Result<(), SyncError> {
        if self.mappings.is_empty() {
            return Err(SyncError::NoResolvedPaths);
        }
        Ok(())
    }

    fn set_phase(&self, phase: RunPhase) {
        if self.phase.replace(phase) != phase {
            self.reporter.report(&Event::Phase(phase));
        }
    }

    fn finish<T>(&self, result: Result<T, SyncError>) -> Result<T, SyncError> {
        match &result {
            Ok(_) => self.set_phase(RunPhase::Idle),
            Err(e) => {
                warn!(error = %e, "run stopped");
                self.set_phase(RunPhase::Failed);
            }
        }
        result
    }
}
