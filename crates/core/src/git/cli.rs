//! Destination client that runs the `git` executable.
//!
//! Commit timestamps travel through `GIT_AUTHOR_DATE` and
//! `GIT_COMMITTER_DATE`, so hooks and signing configured for the repository
//! apply exactly as they would for a manual commit.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::{debug, info, instrument, warn};

use super::{pathspecs, CommitReceipt, CommitRequest, DestinationVcs};
use crate::errors::GitError;

#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
}

impl GitCli {
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        if !path.is_dir() {
            return Err(GitError::RepositoryNotFound(path.display().to_string()));
        }
        let cli = Self {
            repo_path: path.to_path_buf(),
        };
        if !cli.run(&["rev-parse", "--git-dir"], &[])?.status.success() {
            return Err(GitError::RepositoryNotFound(path.display().to_string()));
        }
        info!(path = %path.display(), "using git executable");
        Ok(cli)
    }

    fn run(&self, args: &[&str], envs: &[(&str, String)]) -> Result<Output, GitError> {
        debug!(cmd = ?format!("git {}", args.join(" ")), "running git command");
        let output = Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;
        Ok(output)
    }

    fn run_checked(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(args, &[])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "git command failed");
            return Err(GitError::CommandFailed { exit_code, stderr });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn has_head(&self) -> Result<bool, GitError> {
        Ok(self
            .run(&["rev-parse", "--verify", "-q", "HEAD"], &[])?
            .status
            .success())
    }
}

/// Git's internal date format: `<unix seconds> <offset>`.
fn git_date(when: chrono::DateTime<chrono::Utc>) -> String {
    format!("{} +0000", when.timestamp())
}

impl DestinationVcs for GitCli {
    #[instrument(skip(self))]
    fn unstage_all(&self) -> Result<(), GitError> {
        if self.has_head()? {
            self.run_checked(&["reset", "-q", "HEAD"])?;
        } else {
            self.run_checked(&["read-tree", "--empty"])?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn stage(&self, paths: &[PathBuf]) -> Result<(), GitError> {
        let specs = pathspecs(paths)?;
        let mut args = vec!["add", "--all", "--"];
        args.extend(specs.iter().map(String::as_str));
        self.run_checked(&args)?;
        Ok(())
    }

    #[instrument(skip(self, request))]
    fn commit(&self, request: &CommitRequest) -> Result<CommitReceipt, GitError> {
        let mut envs = vec![
            ("GIT_AUTHOR_DATE", git_date(request.author_time)),
            ("GIT_COMMITTER_DATE", git_date(request.committer_time)),
        ];
        if let Some(author) = &request.author {
            envs.push(("GIT_AUTHOR_NAME", author.name.clone()));
            envs.push(("GIT_AUTHOR_EMAIL", author.email.clone()));
        }

        let output = self.run(&["commit", "-m", &request.message], &envs)?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(GitError::CommitFailed { stdout, stderr });
        }
        debug!("git: {}", stdout.trim());

        let id = self.run_checked(&["rev-parse", "HEAD"])?.trim().to_string();
        info!(sha = %id, "created commit");
        Ok(CommitReceipt { id })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn init_repo(dir: &Path) -> GitCli {
        let repo = git2::Repository::init(dir).unwrap();
        let mut cfg = repo.config().unwrap();
        cfg.set_str("user.name", "Sync Bot").unwrap();
        cfg.set_str("user.email", "sync@example.com").unwrap();
        cfg.set_bool("commit.gpgsign", false).unwrap();
        GitCli::new(dir).unwrap()
    }

    fn request(message: &str, secs: i64) -> CommitRequest {
        let when = DateTime::from_timestamp(secs, 0).unwrap();
        CommitRequest {
            message: message.into(),
            author_time: when,
            committer_time: when,
            author: None,
        }
    }

    #[test]
    fn test_git_date_format() {
        let when = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(git_date(when), "1700000000 +0000");
    }

    #[test]
    fn test_not_a_directory() {
        assert!(matches!(
            GitCli::new("/nonexistent/repo"),
            Err(GitError::RepositoryNotFound(_))
        ));
    }

    #[test]
    fn test_commit_with_env_dates() {
        if !git_available() {
            eprintln!("SKIP: git not available");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let cli = init_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        cli.unstage_all().unwrap();
        cli.stage(&[PathBuf::from("a.txt")]).unwrap();
        let receipt = cli.commit(&request("First\nCL 7", 1_600_000_000)).unwrap();

        let repo = git2::Repository::open(dir.path()).unwrap();
        let commit = repo.find_commit(git2::Oid::from_str(&receipt.id).unwrap()).unwrap();
        assert_eq!(commit.author().when().seconds(), 1_600_000_000);
        assert_eq!(commit.committer().when().seconds(), 1_600_000_000);
        assert_eq!(commit.message(), Some("First\nCL 7\n"));
    }

    #[test]
    fn test_commit_failure_captures_output() {
        if !git_available() {
            eprintln!("SKIP: git not available");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let cli = init_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        cli.stage(&[PathBuf::from("a.txt")]).unwrap();
        cli.commit(&request("one", 1_600_000_000)).unwrap();

        cli.stage(&[PathBuf::from("a.txt")]).unwrap();
        let result = cli.commit(&request("two", 1_600_000_100));
        match result {
            Err(GitError::CommitFailed { stdout, .. }) => assert!(stdout.contains("nothing")),
            other => panic!("expected CommitFailed, got {:?}", other.map(|r| r.id)),
        }
    }
}
