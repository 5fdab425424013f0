//! Engine configuration (`.patchdance.toml`).
//!
//! Typed configuration for rewrite and fuzzy-application behavior. Missing
//! fields use defaults; a missing file means all defaults (no error).
//!
//! ```toml
//! [rewrite]
//! elide_empty_commits = true
//! backup_retention_days = 14
//! timeout_secs = 300
//!
//! [apply]
//! min_confidence = 50
//! max_context_mismatches = 3
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diff::apply::ApplyOptions;

/// File name probed at the repository root.
pub const CONFIG_FILE: &str = ".patchdance.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchdanceConfig {
    /// Transaction behavior.
    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Fuzzy hunk-location behavior.
    #[serde(default)]
    pub apply: ApplyConfig,
}

impl PatchdanceConfig {
    /// Load configuration from `<root>/.patchdance.toml`.
    ///
    /// # Errors
    /// Returns an error for unreadable or unparsable files; a missing file
    /// is all defaults.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path),
                    message: e.to_string(),
                });
            }
        };
        toml::from_str(&text).map_err(|e| ConfigError {
            path: Some(path),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// RewriteConfig
// ---------------------------------------------------------------------------

/// Transaction behavior.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteConfig {
    /// Drop rewritten commits whose tree equals their parent's
    /// (default: true).
    #[serde(default = "default_elide_empty")]
    pub elide_empty_commits: bool,

    /// How long backup refs are kept before pruning (default: 14 days).
    #[serde(default = "default_retention_days")]
    pub backup_retention_days: u32,

    /// Wall-clock budget for one transaction (default: 300 s).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            elide_empty_commits: default_elide_empty(),
            backup_retention_days: default_retention_days(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

const fn default_elide_empty() -> bool {
    true
}

const fn default_retention_days() -> u32 {
    14
}

const fn default_timeout_secs() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// ApplyConfig
// ---------------------------------------------------------------------------

/// Fuzzy hunk-location behavior.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyConfig {
    /// Minimum confidence a fuzzy candidate must reach, 0–100
    /// (default: 50).
    #[serde(default = "default_min_confidence")]
    pub min_confidence: i32,

    /// Context lines allowed to mismatch per hunk (default: 3).
    #[serde(default = "default_max_context_mismatches")]
    pub max_context_mismatches: u32,
}

impl ApplyConfig {
    /// Convert into the diff engine's option struct.
    #[must_use]
    pub const fn options(&self) -> ApplyOptions {
        ApplyOptions {
            min_confidence: self.min_confidence,
            max_context_mismatches: self.max_context_mismatches,
        }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_context_mismatches: default_max_context_mismatches(),
        }
    }
}

const fn default_min_confidence() -> i32 {
    50
}

const fn default_max_context_mismatches() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be loaded or parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// Path to the offending file, when known.
    pub path: Option<PathBuf>,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "config error in '{}': {}", path.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::error::PatchdanceError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            detail: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
