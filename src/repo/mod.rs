//! Repository Port — the narrow abstraction the engine consumes.
//!
//! Any backend may provide it: the engine ships a subprocess-git backend
//! ([`git::GitCliRepository`]) and a deterministic in-memory fake
//! ([`memory::InMemoryRepository`]) for engine-isolated unit tests.
//!
//! The port is read-mostly: a rewrite transaction is the only writer, and
//! it holds exclusive use of the handle for its duration. Readers see only
//! committed refs.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::model::types::{CommitId, CommitInfo, TreeId};

pub mod git;
pub mod memory;

pub use git::GitCliRepository;
pub use memory::InMemoryRepository;

// ---------------------------------------------------------------------------
// Port value types
// ---------------------------------------------------------------------------

/// An author or committer identity with timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Person's name.
    pub name: String,
    /// Person's email.
    pub email: String,
    /// When the action happened, UTC.
    pub when: DateTime<Utc>,
}

impl Signature {
    /// Build a signature stamped with the current time.
    #[must_use]
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when: Utc::now(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// One tree mutation handed to [`Repository::write_tree`].
///
/// `content: None` removes the path from the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// POSIX file mode (e.g. `0o100644`); ignored for removals.
    pub mode: u32,
    /// New blob content, or `None` to delete the path.
    pub content: Option<Vec<u8>>,
}

impl TreeEntry {
    /// An entry that writes `content` at `path` with the given mode.
    #[must_use]
    pub fn write(path: impl Into<PathBuf>, mode: u32, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            mode,
            content: Some(content),
        }
    }

    /// An entry that removes `path`.
    #[must_use]
    pub fn remove(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: 0,
            content: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository trait
// ---------------------------------------------------------------------------

/// The Repository Port.
///
/// All operations are fallible; implementations translate backend failures
/// into [`RepoError`]. `read_blob`/`read_mode` return `Ok(None)` for absent
/// paths — absence is an answer, not an error.
pub trait Repository {
    /// Root directory of the repository (the work tree for git).
    fn path(&self) -> &Path;

    /// The commit the current branch points at.
    fn head(&self) -> Result<CommitId, RepoError>;

    /// Name of the current branch (`"HEAD"` when detached).
    fn current_branch(&self) -> Result<String, RepoError>;

    /// `true` when the work tree has no uncommitted or untracked changes.
    fn is_clean(&self) -> Result<bool, RepoError>;

    /// Metadata for one commit.
    fn commit_info(&self, id: &CommitId) -> Result<CommitInfo, RepoError>;

    /// First-parent history from `start`, newest first, at most `limit`
    /// entries.
    fn walk_history(&self, start: &CommitId, limit: usize) -> Result<Vec<CommitInfo>, RepoError>;

    /// Content of `path` in `commit`'s tree, or `None` if absent.
    fn read_blob(&self, commit: &CommitId, path: &Path) -> Result<Option<Vec<u8>>, RepoError>;

    /// Mode bits of `path` in `commit`'s tree, or `None` if absent.
    fn read_mode(&self, commit: &CommitId, path: &Path) -> Result<Option<u32>, RepoError>;

    /// Unified diff between two commits' trees (`from = None` means the
    /// empty tree, for root commits).
    fn tree_to_tree_diff(
        &self,
        from: Option<&CommitId>,
        to: &CommitId,
    ) -> Result<String, RepoError>;

    /// Write a tree: start from `base`'s tree (or empty) and apply
    /// `entries`.
    fn write_tree(
        &self,
        base: Option<&CommitId>,
        entries: &[TreeEntry],
    ) -> Result<TreeId, RepoError>;

    /// The tree id of an existing commit.
    fn commit_tree_id(&self, commit: &CommitId) -> Result<TreeId, RepoError>;

    /// Create a commit object. Does not move any ref.
    fn create_commit(
        &self,
        parents: &[CommitId],
        tree: &TreeId,
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<CommitId, RepoError>;

    /// Resolve a ref name to a commit, or `None` if the ref is absent.
    fn resolve_ref(&self, name: &str) -> Result<Option<CommitId>, RepoError>;

    /// Create a ref that must not already exist.
    fn create_ref(&self, name: &str, commit: &CommitId) -> Result<(), RepoError>;

    /// Compare-and-swap a ref from `expected_old` to `new`.
    ///
    /// # Errors
    /// [`RepoError::RefMoved`] when the ref's current value is not
    /// `expected_old` (someone else moved it).
    fn update_ref(
        &self,
        name: &str,
        expected_old: &CommitId,
        new: &CommitId,
    ) -> Result<(), RepoError>;

    /// Delete a ref. Idempotent.
    fn delete_ref(&self, name: &str) -> Result<(), RepoError>;

    /// All refs under `prefix`, sorted by name.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, CommitId)>, RepoError>;

    /// The identity rewritten commits are committed under.
    fn default_signature(&self) -> Result<Signature, RepoError>;

    /// Directory for operation journals, when the backend has one.
    fn journal_dir(&self) -> Option<PathBuf> {
        None
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from a Repository Port backend.
#[derive(Debug)]
pub enum RepoError {
    /// No repository at (or above) the given path.
    NotFound {
        /// The path that was probed.
        path: PathBuf,
    },

    /// A git command failed (non-zero exit).
    GitCommand {
        /// The command that was run (e.g. `"git rev-parse HEAD"`).
        command: String,
        /// Stderr output, trimmed.
        stderr: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },

    /// An unknown or malformed commit id.
    InvalidCommitId {
        /// The offending id.
        id: String,
    },

    /// A backend returned an object id that failed validation.
    InvalidOid {
        /// What was being read when the bad oid appeared.
        context: String,
        /// The raw value.
        raw: String,
    },

    /// A CAS ref update lost the race: the ref moved concurrently.
    RefMoved {
        /// The ref that could not be updated.
        ref_name: String,
    },

    /// Backend output could not be interpreted.
    Malformed {
        /// What was being parsed.
        context: String,
        /// The offending text.
        detail: String,
    },

    /// An I/O error (e.g. spawning git).
    Io(std::io::Error),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => {
                write!(
                    f,
                    "no git repository found at '{}'.\n  To fix: run inside a repository or pass its path.",
                    path.display()
                )
            }
            Self::GitCommand {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::InvalidCommitId { id } => write!(f, "invalid commit id: {id:?}"),
            Self::InvalidOid { context, raw } => {
                write!(
                    f,
                    "invalid object id while {context}: {raw:?} (expected 40 lowercase hex characters)"
                )
            }
            Self::RefMoved { ref_name } => {
                write!(
                    f,
                    "ref '{ref_name}' was modified concurrently — read the current value and retry"
                )
            }
            Self::Malformed { context, detail } => {
                write!(f, "unexpected output while {context}: {detail}")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for RepoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<std::io::Error> for RepoError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
