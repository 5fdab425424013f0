//! Unified error type for patch-engine operations.
//!
//! Defines [`PatchdanceError`], the error surface of the engine API. Each
//! variant carries a stable machine-readable kind ([`PatchdanceError::kind`])
//! and a human-readable description sufficient for a front-end to render
//! without inspecting internals. Lower layers (`repo`, `diff`) define their
//! own error enums and convert into this one at the engine boundary.

use std::fmt;

use crate::diff::DiffError;
use crate::model::Conflict;
use crate::model::types::ValidationError;
use crate::repo::RepoError;

// ---------------------------------------------------------------------------
// PatchdanceError
// ---------------------------------------------------------------------------

/// Unified error type for engine operations.
///
/// Each variant is designed to be self-contained: a caller receiving this
/// error should understand what happened and what to do next without
/// additional context.
#[derive(Debug)]
pub enum PatchdanceError {
    /// A repository-layer failure (missing, locked, corrupt, command failed).
    Repository {
        /// Human-readable description of the failure.
        detail: String,
    },

    /// An I/O error from underlying storage.
    Io(std::io::Error),

    /// An unknown or malformed commit id.
    InvalidCommitId {
        /// The offending id as provided.
        id: String,
    },

    /// A unified diff could not be parsed.
    PatchParse {
        /// 1-based line number in the diff text, when known.
        line_number: Option<usize>,
        /// What was wrong.
        detail: String,
    },

    /// A hunk could not be located with sufficient confidence.
    PatchApplication {
        /// Index of the failing hunk within its patch.
        hunk_index: usize,
        /// Why application failed.
        reason: String,
    },

    /// One or more conflicts stopped the operation.
    ///
    /// Non-fatal for previews; fatal for `apply_operation` unless a
    /// resolver callback resolves them.
    Conflicts(Vec<Conflict>),

    /// Rollback succeeded after a downstream failure; carries the root cause.
    TransactionAborted {
        /// The error that triggered the rollback.
        cause: Box<PatchdanceError>,
    },

    /// The operation was cancelled by the caller or timed out.
    Cancelled {
        /// Why (e.g. "cancellation requested", "deadline exceeded").
        reason: String,
    },

    /// A configuration file could not be loaded or parsed.
    Config {
        /// Human-readable description of the problem.
        detail: String,
    },
}

impl PatchdanceError {
    /// Stable machine-readable kind string for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Repository { .. } => "repository_error",
            Self::Io(_) => "io_error",
            Self::InvalidCommitId { .. } => "invalid_commit_id",
            Self::PatchParse { .. } => "patch_parse_error",
            Self::PatchApplication { .. } => "patch_application_error",
            Self::Conflicts(_) => "conflict_error",
            Self::TransactionAborted { .. } => "transaction_aborted",
            Self::Cancelled { .. } => "operation_cancelled",
            Self::Config { .. } => "config_error",
        }
    }

    /// The root cause of a [`Self::TransactionAborted`]; `self` otherwise.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::TransactionAborted { cause } => cause.root_cause(),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for PatchdanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository { detail } => {
                write!(
                    f,
                    "repository error: {detail}\n  To fix: check repository state with `git status` and retry."
                )
            }
            Self::Io(err) => {
                write!(
                    f,
                    "I/O error: {err}\n  To fix: check file permissions and disk space."
                )
            }
            Self::InvalidCommitId { id } => {
                write!(
                    f,
                    "invalid commit id '{id}'.\n  To fix: verify the id with `git rev-parse {id}`."
                )
            }
            Self::PatchParse { line_number, detail } => {
                write!(f, "malformed unified diff")?;
                if let Some(n) = line_number {
                    write!(f, " at line {n}")?;
                }
                write!(f, ": {detail}")
            }
            Self::PatchApplication { hunk_index, reason } => {
                write!(
                    f,
                    "hunk {hunk_index} could not be applied: {reason}\n  \
                     To fix: the target content has drifted too far; re-extract the patch."
                )
            }
            Self::Conflicts(conflicts) => {
                write!(f, "operation conflicts in {} place(s):", conflicts.len())?;
                for c in conflicts {
                    write!(f, "\n  - {c}")?;
                }
                write!(
                    f,
                    "\n  To fix: resolve the conflicts (or preview the operation to inspect them) and retry."
                )
            }
            Self::TransactionAborted { cause } => {
                write!(
                    f,
                    "transaction aborted and rolled back; the repository is unchanged.\n  cause: {cause}"
                )
            }
            Self::Cancelled { reason } => {
                write!(f, "operation cancelled: {reason}")
            }
            Self::Config { detail } => {
                write!(
                    f,
                    "configuration error: {detail}\n  To fix: edit .patchdance.toml and correct the issue."
                )
            }
        }
    }
}

impl std::error::Error for PatchdanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::TransactionAborted { cause } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<std::io::Error> for PatchdanceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<RepoError> for PatchdanceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::InvalidCommitId { id } => Self::InvalidCommitId { id },
            RepoError::Io(e) => Self::Io(e),
            other => Self::Repository {
                detail: other.to_string(),
            },
        }
    }
}

impl From<DiffError> for PatchdanceError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::InvalidPatchFormat { line_number, detail } => Self::PatchParse {
                line_number: Some(line_number),
                detail,
            },
            DiffError::HunkApplicationFailed { hunk_index, reason } => {
                Self::PatchApplication { hunk_index, reason }
            }
            other => Self::PatchApplication {
                hunk_index: 0,
                reason: other.to_string(),
            },
        }
    }
}

impl From<ValidationError> for PatchdanceError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidCommitId {
            id: err.value,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
