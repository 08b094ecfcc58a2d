//! Local Git repository operations via `git2`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::{ErrorCode, IndexAddOption, Repository, Signature, Time};
use tracing::{debug, info, instrument};

use super::{pathspecs, CommitReceipt, CommitRequest, DestinationVcs};
use crate::errors::GitError;

/// Destination client wrapping a `git2::Repository`.
///
/// The client may be rooted in a subdirectory of the work tree; paths passed
/// to [`DestinationVcs::stage`] are relative to that root.
pub struct GitClient {
    repo: Repository,
    /// Client root relative to the repository work tree (empty at the top).
    prefix: PathBuf,
}

impl GitClient {
    /// Open the Git repository containing `root`, searching parent
    /// directories the way `git` does.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, GitError> {
        let path = root.as_ref();
        info!(path = %path.display(), "opening git repository");
        let not_found = || GitError::RepositoryNotFound(path.display().to_string());
        let repo = Repository::discover(path).map_err(|_| not_found())?;
        let workdir = repo.workdir().ok_or_else(not_found)?;

        let root = fs::canonicalize(path).map_err(|_| not_found())?;
        let top = fs::canonicalize(workdir).map_err(|_| not_found())?;
        let prefix = root.strip_prefix(&top).map_err(|_| not_found())?.to_path_buf();
        debug!(prefix = %prefix.display(), "repository discovered");
        Ok(Self { repo, prefix })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// HEAD commit, or `None` on an unborn branch.
    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn signature(name: &str, email: &str, when: DateTime<Utc>) -> Result<Signature<'static>, GitError> {
        Ok(Signature::new(name, email, &Time::new(when.timestamp(), 0))?)
    }
}

impl DestinationVcs for GitClient {
    /// Reset the index to HEAD (`git reset HEAD`), leaving the work tree.
    #[instrument(skip(self))]
    fn unstage_all(&self) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        match self.head_commit()? {
            Some(head) => index.read_tree(&head.tree()?)?,
            None => index.clear()?,
        }
        index.write()?;
        debug!("index reset to HEAD");
        Ok(())
    }

    /// Stage additions, modifications and deletions under `paths`.
    #[instrument(skip(self))]
    fn stage(&self, paths: &[PathBuf]) -> Result<(), GitError> {
        let rooted: Vec<PathBuf> = paths.iter().map(|p| self.prefix.join(p)).collect();
        // libgit2 has no `.` pathspec for the whole tree.
        let specs: Vec<String> = pathspecs(&rooted)?
            .into_iter()
            .map(|s| if s == "." { "*".to_string() } else { s })
            .collect();
        let mut index = self.repo.index()?;
        index.add_all(specs.iter().map(String::as_str), IndexAddOption::DEFAULT, None)?;
        index.update_all(specs.iter().map(String::as_str), None)?;
        index.write()?;
        debug!(paths = specs.len(), "staged paths");
        Ok(())
    }

    #[instrument(skip(self, request))]
    fn commit(&self, request: &CommitRequest) -> Result<CommitReceipt, GitError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let parent = self.head_commit()?;

        let unchanged = match &parent {
            Some(p) => p.tree_id() == tree_oid,
            None => index.is_empty(),
        };
        if unchanged {
            return Err(GitError::NothingToCommit);
        }

        let identity = self.repo.signature()?;
        let identity_name = identity.name().unwrap_or_default();
        let identity_email = identity.email().unwrap_or_default();
        let committer = Self::signature(identity_name, identity_email, request.committer_time)?;
        let author = match &request.author {
            Some(a) => Self::signature(&a.name, &a.email, request.author_time)?,
            None => Self::signature(identity_name, identity_email, request.author_time)?,
        };

        let mut message = request.message.clone();
        if !message.ends_with('\n') {
            message.push('\n');
        }

        let tree = self.repo.find_tree(tree_oid)?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &author, &committer, &message, &tree, &parents)?;
        info!(sha = %oid, "created commit");
        Ok(CommitReceipt { id: oid.to_string() })
    }
}
