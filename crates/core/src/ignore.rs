//! Ignore rules applied while mirroring.
//!
//! Rules are tested against each individual segment of a path relative to
//! the root being walked. If any segment matches any rule the whole path is
//! ignored, and for a directory so is its entire subtree.
//!
//! | Syntax  | Engine       | Match                          |
//! |---------|--------------|--------------------------------|
//! | `regex` | `regex-lite` | anchored, whole segment        |
//! | `glob`  | `glob-match` | whole segment (`*`, `?`, `[]`) |

use std::path::{Component, Path};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;

/// Pattern syntax for `destination.ignore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreSyntax {
    #[default]
    Regex,
    Glob,
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Glob(String),
}

/// One compiled ignore pattern.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: String,
    matcher: Matcher,
}

impl IgnoreRule {
    pub fn new(pattern: &str, syntax: IgnoreSyntax) -> Result<Self, ConfigError> {
        let matcher = match syntax {
            IgnoreSyntax::Regex => {
                let anchored = format!("^(?:{})$", pattern);
                let re = Regex::new(&anchored).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    detail: e.to_string(),
                })?;
                Matcher::Regex(re)
            }
            IgnoreSyntax::Glob => {
                if pattern.contains('/') {
                    return Err(ConfigError::InvalidPattern {
                        pattern: pattern.to_string(),
                        detail: "glob ignore patterns match single path segments and cannot contain '/'"
                            .into(),
                    });
                }
                Matcher::Glob(pattern.to_string())
            }
        };
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Test a single path segment.
    pub fn matches_segment(&self, segment: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(segment),
            Matcher::Glob(glob) => glob_match::glob_match(glob, segment),
        }
    }
}

/// The full set of ignore rules for a run.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    /// Compile every pattern, failing on the first one that does not compile.
    pub fn new<S: AsRef<str>>(patterns: &[S], syntax: IgnoreSyntax) -> Result<Self, ConfigError> {
        let rules = patterns
            .iter()
            .map(|p| IgnoreRule::new(p.as_ref(), syntax))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// No rules at all; nothing is ignored.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether `rel_path` (relative to a walked root) is ignored.
    ///
    /// Returns the pattern that matched, for logging.
    pub fn matching_rule(&self, rel_path: &Path) -> Option<&str> {
        for component in rel_path.components() {
            let Component::Normal(segment) = component else {
                continue;
            };
            let segment = segment.to_string_lossy();
            if let Some(rule) = self.rules.iter().find(|r| r.matches_segment(&segment)) {
                debug!(path = %rel_path.display(), pattern = rule.pattern(), "path matches ignore rule");
                return Some(rule.pattern());
            }
        }
        None
    }

    pub fn is_ignored(&self, rel_path: &Path) -> bool {
        self.matching_rule(rel_path).is_some()
    }
}
