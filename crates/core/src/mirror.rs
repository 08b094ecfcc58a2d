//! Make one directory tree an exact copy of another.
//!
//! [`TreeMirror::mirror`] runs two passes:
//!
//! 1. **Copy** (top-down, source-driven): every non-ignored directory is
//!    created and every non-ignored file is copied over unconditionally,
//!    clearing the read-only bit of an existing destination file first.
//! 2. **Delete** (bottom-up, destination-driven): every non-ignored file or
//!    directory with no counterpart in the source is removed.
//!
//! Ignored paths are never touched by either pass. A destination directory
//! that has no source counterpart but still holds ignored entries is kept.
//!
//! In dry-run mode every decision is computed and reported but nothing on
//! disk changes.
//!
//! A source root that does not exist is an error, not an empty tree. When a
//! mapped depot path has no files at some change (not yet added, or deleted
//! at that change) the replay of that change stops there, and its Git copy
//! is left as it was.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::errors::MirrorError;
use crate::ignore::IgnoreRules;
use crate::report::{Event, MirrorAction, Reporter};

/// Everything a mirror run decided, in the order it was decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub actions: Vec<MirrorAction>,
}

impl MirrorReport {
    pub fn copied(&self) -> usize {
        self.count(|a| matches!(a, MirrorAction::Copy(_)))
    }

    pub fn removed(&self) -> usize {
        self.count(|a| matches!(a, MirrorAction::RemoveFile(_) | MirrorAction::RemoveDir(_)))
    }

    pub fn created(&self) -> usize {
        self.count(|a| matches!(a, MirrorAction::CreateDir(_)))
    }

    /// Whether anything other than a plain file copy was decided.
    pub fn changed_structure(&self) -> bool {
        self.actions.iter().any(|a| !matches!(a, MirrorAction::Copy(_)))
    }

    fn count(&self, pred: impl Fn(&MirrorAction) -> bool) -> usize {
        self.actions.iter().filter(|a| pred(a)).count()
    }
}

/// Mirrors a source tree onto a destination tree under a set of ignore rules.
pub struct TreeMirror<'a> {
    rules: &'a IgnoreRules,
    reporter: &'a dyn Reporter,
    dry_run: bool,
}

impl<'a> TreeMirror<'a> {
    pub fn new(rules: &'a IgnoreRules, reporter: &'a dyn Reporter, dry_run: bool) -> Self {
        Self {
            rules,
            reporter,
            dry_run,
        }
    }

    /// Make `dest` match `source`.
    ///
    /// Filesystem errors are fatal and returned as-is; nothing already done
    /// is rolled back.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub fn mirror(&self, source: &Path, dest: &Path) -> Result<MirrorReport, MirrorError> {
        debug!("Mirroring {} -> {}", source.display(), dest.display());

        let meta = fs::metadata(source).map_err(|e| io_err("read", source, e))?;
        if !meta.is_dir() {
            return Err(io_err(
                "mirror",
                source,
                io::Error::other("source is not a directory"),
            ));
        }

        let mut report = MirrorReport::default();
        let replaced = self.copy_pass(source, dest, &mut report)?;
        self.delete_pass(source, dest, &replaced, &mut report)?;

        debug!(
            copied = report.copied(),
            created = report.created(),
            removed = report.removed(),
            "mirror complete"
        );
        Ok(report)
    }

    /// Returns the destination paths whose type the copy pass changed.
    fn copy_pass(
        &self,
        source: &Path,
        dest: &Path,
        report: &mut MirrorReport,
    ) -> Result<HashSet<PathBuf>, MirrorError> {
        if !dest.is_dir() {
            self.apply(report, MirrorAction::CreateDir(PathBuf::from(".")), || {
                fs::create_dir_all(dest).map_err(|e| io_err("create directory", dest, e))
            })?;
        }

        let mut replaced = HashSet::new();
        let rules = self.rules;
        let walker = WalkDir::new(source)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_ignored_entry(rules, source, e));

        for entry in walker {
            let entry = entry.map_err(|e| walk_err(source, e))?;
            let rel = relative(source, entry.path()).to_path_buf();
            let dst = dest.join(&rel);

            if entry.file_type().is_dir() {
                if dst.is_dir() {
                    continue;
                }
                if exists_no_follow(&dst) {
                    self.apply(report, MirrorAction::RemoveFile(rel.clone()), || remove_file(&dst))?;
                    replaced.insert(rel.clone());
                }
                self.apply(report, MirrorAction::CreateDir(rel), || {
                    fs::create_dir(&dst).map_err(|e| io_err("create directory", &dst, e))
                })?;
            } else {
                if dst.is_dir() && !dst.is_symlink() {
                    self.apply(report, MirrorAction::RemoveDir(rel.clone()), || {
                        fs::remove_dir_all(&dst).map_err(|e| io_err("remove directory", &dst, e))
                    })?;
                    replaced.insert(rel.clone());
                }
                self.apply(report, MirrorAction::Copy(rel), || {
                    copy_file(entry.path(), &dst).map_err(|e| io_err("copy", &dst, e))
                })?;
            }
        }
        Ok(replaced)
    }

    /// `replaced` holds the paths the copy pass changed type on. A dry run
    /// still sees their old type on disk, so they are skipped along with
    /// anything under them.
    fn delete_pass(
        &self,
        source: &Path,
        dest: &Path,
        replaced: &HashSet<PathBuf>,
        report: &mut MirrorReport,
    ) -> Result<(), MirrorError> {
        // Nothing was created in dry-run mode, so there is nothing to prune.
        if !dest.exists() {
            return Ok(());
        }

        // Directories (relative to `dest`) that still hold ignored entries.
        let pinned: RefCell<HashSet<PathBuf>> = RefCell::new(HashSet::new());
        let rules = self.rules;
        let walker = WalkDir::new(dest)
            .min_depth(1)
            .contents_first(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if self.dry_run && replaced.contains(relative(dest, e.path())) {
                    return false;
                }
                if is_ignored_entry(rules, dest, e) {
                    pin_ancestors(&mut pinned.borrow_mut(), relative(dest, e.path()));
                    false
                } else {
                    true
                }
            });

        for entry in walker {
            let entry = entry.map_err(|e| walk_err(dest, e))?;
            let rel = relative(dest, entry.path()).to_path_buf();
            let src = source.join(&rel);
            let path = entry.path();

            if entry.file_type().is_dir() {
                if src.is_dir() {
                    continue;
                }
                if pinned.borrow().contains(&rel) {
                    debug!(path = %rel.display(), "keeping directory that holds ignored entries");
                    continue;
                }
                self.apply(report, MirrorAction::RemoveDir(rel), || {
                    fs::remove_dir_all(path).map_err(|e| io_err("remove directory", path, e))
                })?;
            } else {
                if exists_no_follow(&src) && !src.is_dir() {
                    continue;
                }
                self.apply(report, MirrorAction::RemoveFile(rel), || remove_file(path))?;
            }
        }
        Ok(())
    }

    /// Record and report `action`, running `op` unless this is a dry run.
    fn apply<F>(&self, report: &mut MirrorReport, action: MirrorAction, op: F) -> Result<(), MirrorError>
    where
        F: FnOnce() -> Result<(), MirrorError>,
    {
        self.reporter.report(&Event::Mirror {
            action: action.clone(),
            applied: !self.dry_run,
        });
        if !self.dry_run {
            op()?;
        }
        report.actions.push(action);
        Ok(())
    }
}

fn is_ignored_entry(rules: &IgnoreRules, root: &Path, entry: &DirEntry) -> bool {
    rules.is_ignored(relative(root, entry.path()))
}

fn relative<'p>(root: &Path, path: &'p Path) -> &'p Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn pin_ancestors(pinned: &mut HashSet<PathBuf>, rel: &Path) {
    let mut parent = rel.parent();
    while let Some(dir) = parent {
        if dir.as_os_str().is_empty() {
            break;
        }
        pinned.insert(dir.to_path_buf());
        parent = dir.parent();
    }
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Give the owner write permission on `path` if it exists and lacks it.
fn make_writable(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) if !meta.file_type().is_symlink() => meta,
        Ok(_) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let mut perms = meta.permissions();
    if !perms.readonly() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }
    fs::set_permissions(path, perms)
}

/// Copy contents, permissions and modification time from `src` to `dst`.
fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    make_writable(dst)?;
    fs::copy(src, dst)?;

    let meta = fs::metadata(src)?;
    let perms = meta.permissions();
    if perms.readonly() {
        make_writable(dst)?;
    }
    let file = fs::File::options().write(true).open(dst)?;
    file.set_modified(meta.modified()?)?;
    drop(file);
    if perms.readonly() {
        fs::set_permissions(dst, perms)?;
    }
    Ok(())
}

fn remove_file(path: &Path) -> Result<(), MirrorError> {
    make_writable(path).map_err(|e| io_err("make writable", path, e))?;
    fs::remove_file(path).map_err(|e| io_err("remove file", path, e))
}

fn io_err(op: &'static str, path: &Path, source: io::Error) -> MirrorError {
    MirrorError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

fn walk_err(root: &Path, source: walkdir::Error) -> MirrorError {
    let path = source.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    MirrorError::Walk { path, source }
}
