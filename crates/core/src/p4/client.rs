//! Perforce client backed by the `p4` executable.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, instrument, warn};

use super::parser::{
    parse_changes, parse_describe, parse_records, parse_where, LocalMapping, Record,
};
use super::SourceControl;
use crate::config::SourceConfig;
use crate::errors::P4Error;
use crate::models::{Change, ChangeId, ChangeSummary};

/// Runs `p4 -Mj -ztag` from the workspace root.
#[derive(Debug, Clone)]
pub struct P4Client {
    root: PathBuf,
    port: Option<String>,
    user: Option<String>,
    client: Option<String>,
}

impl P4Client {
    /// Create a client that runs from the workspace `root`, relying on
    /// `P4CONFIG`/environment for connection settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let client = Self {
            root: root.into(),
            port: None,
            user: None,
            client: None,
        };
        info!(root = %client.root.display(), "created P4Client");
        client
    }

    /// Create a client from the `[source]` config section.
    pub fn from_config(source: &SourceConfig) -> Self {
        let mut client = Self::new(&source.root);
        client.port = source.port.clone();
        client.user = source.user.clone();
        client.client = source.client.clone();
        client
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = vec![
            "-Mj".to_string(),
            "-ztag".to_string(),
            "-d".to_string(),
            self.root.to_string_lossy().to_string(),
        ];
        for (flag, value) in [("-p", &self.port), ("-u", &self.user), ("-c", &self.client)] {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        args
    }

    fn run_p4(&self, args: &[&str]) -> Result<Vec<Record>, P4Error> {
        let mut cmd = Command::new("p4");
        cmd.current_dir(&self.root)
            .args(self.global_args())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = ?format!("p4 {}", args.join(" ")), "running p4 command");
        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                P4Error::BinaryNotFound("p4".into())
            } else {
                P4Error::IoError(e)
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        // Error records are reported on stdout in tagged mode; surface them
        // before falling back to the exit status.
        let records = parse_records(&stdout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "p4 command failed");
            return Err(P4Error::CommandFailed { exit_code, stderr });
        }
        Ok(records)
    }
}

impl SourceControl for P4Client {
    #[instrument(skip(self))]
    fn where_local(&self, logical: &str) -> Result<Vec<LocalMapping>, P4Error> {
        let records = self.run_p4(&["where", logical])?;
        parse_where(&records)
    }

    #[instrument(skip(self))]
    fn changes(&self, views: &[String]) -> Result<Vec<ChangeSummary>, P4Error> {
        let mut args = vec!["changes", "-s", "submitted"];
        args.extend(views.iter().map(String::as_str));
        let records = self.run_p4(&args)?;
        parse_changes(&records)
    }

    #[instrument(skip(self), fields(change = %id))]
    fn describe(&self, id: ChangeId) -> Result<Change, P4Error> {
        let id_str = id.to_string();
        let records = self.run_p4(&["describe", "-s", &id_str])?;
        parse_describe(id, &records)
    }

    #[instrument(skip(self))]
    fn sync(&self, views: &[String]) -> Result<(), P4Error> {
        let mut args = vec!["sync"];
        args.extend(views.iter().map(String::as_str));
        let records = self.run_p4(&args)?;
        info!(files = records.len(), "p4 sync completed");
        Ok(())
    }

    #[instrument(skip(self))]
    fn reconcile(&self, views: &[String]) -> Result<(), P4Error> {
        let mut args = vec!["reconcile"];
        args.extend(views.iter().map(String::as_str));
        let records = self.run_p4(&args)?;
        info!(files = records.len(), "p4 reconcile completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_construction() {
        let client = P4Client::new("/work/ws");
        assert_eq!(client.root(), Path::new("/work/ws"));
        assert_eq!(client.global_args(), vec!["-Mj", "-ztag", "-d", "/work/ws"]);
    }

    #[test]
    fn test_connection_overrides() {
        let source = SourceConfig {
            root: "/work/ws".into(),
            port: Some("ssl:perforce:1666".into()),
            user: Some("jdoe".into()),
            client: None,
        };
        let client = P4Client::from_config(&source);
        assert_eq!(
            client.global_args(),
            vec!["-Mj", "-ztag", "-d", "/work/ws", "-p", "ssl:perforce:1666", "-u", "jdoe"]
        );
    }
}
