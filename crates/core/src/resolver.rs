//! Resolve configured depot paths to local workspace paths.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::models::{depot_view, PathMapping, ResolvedMapping};
use crate::p4::SourceControl;

/// Turns `[paths]` entries into absolute source/destination pairs using
/// `p4 where`.
pub struct PathResolver<'a> {
    source: &'a dyn SourceControl,
    dest_root: PathBuf,
}

impl<'a> PathResolver<'a> {
    pub fn new(source: &'a dyn SourceControl, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            dest_root: dest_root.into(),
        }
    }

    /// Resolve every mapping, keeping configuration order.
    ///
    /// A mapping whose depot path does not resolve to exactly one local path
    /// is logged and dropped; the rest still resolve.
    pub fn resolve(&self, mappings: &[PathMapping]) -> Vec<ResolvedMapping> {
        let mut resolved = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            match self.resolve_one(mapping) {
                Some(r) => resolved.push(r),
                None => error!("No local path for: {}", mapping.logical),
            }
        }
        info!(
            resolved = resolved.len(),
            configured = mappings.len(),
            "resolved depot paths"
        );
        resolved
    }

    fn resolve_one(&self, mapping: &PathMapping) -> Option<ResolvedMapping> {
        let view = depot_view(&mapping.logical);
        let locations = match self.source.where_local(&view) {
            Ok(locations) => locations,
            Err(e) => {
                debug!(logical = %mapping.logical, error = %e, "p4 where failed");
                return None;
            }
        };
        let [location] = locations.as_slice() else {
            debug!(logical = %mapping.logical, count = locations.len(), "ambiguous p4 where result");
            return None;
        };

        let source = strip_wildcard(&location.path);
        let dest = self.dest_root.join(&mapping.dest_rel);
        debug!(
            logical = %mapping.logical,
            source = %source.display(),
            dest = %dest.display(),
            "resolved mapping"
        );
        Some(ResolvedMapping {
            logical: mapping.logical.clone(),
            source,
            dest,
            dest_rel: mapping.dest_rel.clone(),
        })
    }
}

/// `/work/ws/proj/...` -> `/work/ws/proj`.
fn strip_wildcard(local: &str) -> PathBuf {
    let trimmed = local
        .strip_suffix("/...")
        .or_else(|| local.strip_suffix("\\..."))
        .unwrap_or(local);
    Path::new(trimmed).to_path_buf()
}
