//! TOML-based configuration for git-p4-sync.
//!
//! ```toml
//! [source]
//! root = "/work/p4ws"
//!
//! [paths]
//! "//depot/project/src/..." = "src"
//!
//! [destination]
//! ignore = ["\\.git"]
//! ```
//!
//! The Git repository root is the directory holding the config file,
//! optionally adjusted by `destination.root`. Unknown keys are ignored.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::ignore::{IgnoreRules, IgnoreSyntax};
use crate::models::PathMapping;

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "git-p4-sync.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Perforce workspace settings.
    pub source: SourceConfig,

    /// Depot path -> destination path, in file order.
    #[serde(deserialize_with = "ordered_paths")]
    pub paths: Vec<PathMapping>,

    /// Git-side settings.
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Commit message settings.
    #[serde(default)]
    pub commit: CommitConfig,

    /// Perforce user -> Git author identity.
    #[serde(default)]
    pub authors: HashMap<String, AuthorEntry>,

    /// Directory the config was loaded from (set by `load_from_file`).
    #[serde(skip)]
    pub config_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Perforce workspace and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Workspace root; `p4` runs from here.
    pub root: PathBuf,

    /// `P4PORT` override.
    #[serde(default)]
    pub port: Option<String>,

    /// `P4USER` override.
    #[serde(default)]
    pub user: Option<String>,

    /// `P4CLIENT` override.
    #[serde(default)]
    pub client: Option<String>,
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

/// How commits are written to the Git repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitBackend {
    /// In-process via libgit2.
    #[default]
    Libgit2,
    /// By running the `git` executable.
    Cli,
}

/// Git repository settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Patterns matched against individual path segments.
    #[serde(default, alias = "ignore_patterns")]
    pub ignore: Vec<String>,

    /// Pattern syntax for `ignore`.
    #[serde(default)]
    pub ignore_syntax: IgnoreSyntax,

    /// Repository root, relative to the config file directory.
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub backend: GitBackend,
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Commit message settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Append a `CL <id>` line to every commit message.
    #[serde(default = "default_true")]
    pub trailer: bool,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self { trailer: true }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Authors
// ---------------------------------------------------------------------------

/// A Git identity for a Perforce user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorEntry {
    pub name: String,
    pub email: String,
}

// ---------------------------------------------------------------------------
// Ordered [paths] table
// ---------------------------------------------------------------------------

fn ordered_paths<'de, D>(deserializer: D) -> Result<Vec<PathMapping>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PathsVisitor;

    impl<'de> Visitor<'de> for PathsVisitor {
        type Value = Vec<PathMapping>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a table of depot path = destination path")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut paths = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((logical, dest)) = map.next_entry::<String, String>()? {
                paths.push(PathMapping {
                    logical,
                    dest_rel: PathBuf::from(dest),
                });
            }
            Ok(paths)
        }
    }

    deserializer.deserialize_map(PathsVisitor)
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Parse a config from a TOML string, anchored at `config_dir`.
    pub fn from_toml_str(contents: &str, config_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let mut config: SyncConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.config_dir = config_dir.into();
        Ok(config)
    }

    /// Load a [`SyncConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let absolute = path.canonicalize()?;
        let config_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let config = Self::from_toml_str(&contents, config_dir)?;
        debug!(paths = config.paths.len(), "configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "source.root".into(),
                detail: "workspace root must not be empty".into(),
            });
        }
        if self.paths.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "paths".into(),
                detail: "at least one depot path mapping is required".into(),
            });
        }
        for mapping in &self.paths {
            if mapping.logical.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "paths".into(),
                    detail: "depot path must not be empty".into(),
                });
            }
            if !is_confined(&mapping.dest_rel) {
                return Err(ConfigError::InvalidValue {
                    field: format!("paths.\"{}\"", mapping.logical),
                    detail: format!(
                        "destination '{}' must be a relative path inside the repository",
                        mapping.dest_rel.display()
                    ),
                });
            }
        }
        if let Some(root) = &self.destination.root {
            if root.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    field: "destination.root".into(),
                    detail: "must be relative to the config file directory".into(),
                });
            }
        }
        self.ignore_rules()?;
        if self.destination.ignore.is_empty() {
            warn!("no destination.ignore patterns configured; repository metadata is not protected");
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Absolute Git repository root.
    pub fn dest_root(&self) -> PathBuf {
        match &self.destination.root {
            Some(root) => self.config_dir.join(root),
            None => self.config_dir.clone(),
        }
    }

    /// Compile `destination.ignore`.
    pub fn ignore_rules(&self) -> Result<IgnoreRules, ConfigError> {
        IgnoreRules::new(&self.destination.ignore, self.destination.ignore_syntax)
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# git-p4-sync configuration
# The Git repository root is the directory containing this file.

[source]
root = "/path/to/p4/workspace"
# port = "ssl:perforce:1666"
# user = "your_p4_user"
# client = "your_p4_client"

[paths]
"//depot/project/src/..." = "src"

[destination]
ignore = ["\\.git"]
ignore_syntax = "regex"
# backend = "libgit2"   # or "cli"

[commit]
trailer = true

# [authors]
# jdoe = { name = "John Doe", email = "jdoe@example.com" }
"#
    }
}

/// Relative, and never climbs out of its base.
fn is_confined(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
