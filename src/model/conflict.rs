//! Structured conflict model.
//!
//! Conflicts are structured and localizable — per file, per line — not
//! marker soup. Ids are deterministic so the same input produces the same
//! ids across runs: `<file>:<line>` for content conflicts, `<file>:mode`,
//! `<file>:delete`, and `<file>:rename` for the other kinds.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConflictKind
// ---------------------------------------------------------------------------

/// The kind of disagreement between two patches, or between a patch and a
/// target commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Overlapping edits to the same file region.
    Content,
    /// Disagreement about the file's mode bits.
    Mode,
    /// One side deletes a file the other modifies (or references lines
    /// that no longer exist).
    DeleteModify,
    /// The same file renamed to different destinations.
    Rename,
}

impl ConflictKind {
    /// Return the kind as a stable machine-readable string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content_conflict",
            Self::Mode => "mode_conflict",
            Self::DeleteModify => "delete_modify_conflict",
            Self::Rename => "rename_conflict",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Conflict
// ---------------------------------------------------------------------------

/// A single detected conflict.
///
/// `our_content` / `their_content` carry the competing text for content
/// conflicts; for mode and existence conflicts they describe the competing
/// states (e.g. octal modes, rename destinations).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Deterministic id, e.g. `src/lib.rs:42` or `src/lib.rs:mode`.
    pub id: String,
    /// What kind of conflict this is.
    pub kind: ConflictKind,
    /// The file the conflict is about.
    pub file_path: PathBuf,
    /// Human-readable description.
    pub description: String,
    /// The first side's content or state.
    pub our_content: String,
    /// The second side's content or state.
    pub their_content: String,
}

impl Conflict {
    /// Build a content conflict anchored at a 1-based line number.
    #[must_use]
    pub fn content(
        file: &Path,
        line: u32,
        description: impl Into<String>,
        ours: impl Into<String>,
        theirs: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("{}:{line}", file.display()),
            kind: ConflictKind::Content,
            file_path: file.to_path_buf(),
            description: description.into(),
            our_content: ours.into(),
            their_content: theirs.into(),
        }
    }

    /// Build a mode conflict (`<file>:mode`).
    #[must_use]
    pub fn mode(
        file: &Path,
        description: impl Into<String>,
        ours: impl Into<String>,
        theirs: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("{}:mode", file.display()),
            kind: ConflictKind::Mode,
            file_path: file.to_path_buf(),
            description: description.into(),
            our_content: ours.into(),
            their_content: theirs.into(),
        }
    }

    /// Build a delete/modify conflict (`<file>:delete`).
    #[must_use]
    pub fn delete_modify(
        file: &Path,
        description: impl Into<String>,
        ours: impl Into<String>,
        theirs: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("{}:delete", file.display()),
            kind: ConflictKind::DeleteModify,
            file_path: file.to_path_buf(),
            description: description.into(),
            our_content: ours.into(),
            their_content: theirs.into(),
        }
    }

    /// Build a rename conflict (`<file>:rename`).
    #[must_use]
    pub fn rename(
        file: &Path,
        description: impl Into<String>,
        ours: impl Into<String>,
        theirs: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("{}:rename", file.display()),
            kind: ConflictKind::Rename,
            file_path: file.to_path_buf(),
            description: description.into(),
            our_content: ours.into(),
            their_content: theirs.into(),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.id, self.kind, self.description)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
