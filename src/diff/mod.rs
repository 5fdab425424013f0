//! Diff engine: parse, apply, and merge structured patches.
//!
//! - [`parse`] — unified diff text → [`crate::model::Patch`]es
//! - [`apply`] — pure textual application with exact and fuzzy matching
//! - [`merge`] — combine same-file patches into one
//! - [`extract`] — commit → patches via the Repository Port

use std::fmt;
use std::path::PathBuf;

pub mod apply;
pub mod extract;
pub mod merge;
pub mod parse;

pub use apply::{apply_patch, apply_patch_with};
pub use extract::extract_patches;
pub use merge::merge_patches;
pub use parse::parse_unified_diff;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the diff engine.
#[derive(Debug)]
pub enum DiffError {
    /// The unified diff text is malformed.
    InvalidPatchFormat {
        /// 1-based line number in the diff text.
        line_number: usize,
        /// What was wrong.
        detail: String,
    },

    /// A hunk could not be located in the target text with sufficient
    /// confidence.
    HunkApplicationFailed {
        /// Index of the failing hunk within its patch.
        hunk_index: usize,
        /// Why application failed.
        reason: String,
    },

    /// The patch is a binary delta and cannot be applied as text.
    BinaryPatchUnsupported {
        /// The file the binary patch targets.
        path: PathBuf,
    },

    /// Two hunks overlap in the old coordinate space.
    OverlappingHunks {
        /// The file the patches target.
        path: PathBuf,
        /// Index of the first hunk of the overlapping pair.
        first: usize,
        /// Index of the second hunk of the overlapping pair.
        second: usize,
    },

    /// Patches passed to a same-file merge target different files.
    MixedTargets {
        /// The first patch's target.
        expected: PathBuf,
        /// The conflicting target.
        found: PathBuf,
    },
}

impl fmt::Display for DiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPatchFormat { line_number, detail } => {
                write!(f, "malformed unified diff at line {line_number}: {detail}")
            }
            Self::HunkApplicationFailed { hunk_index, reason } => {
                write!(f, "hunk {hunk_index} failed to apply: {reason}")
            }
            Self::BinaryPatchUnsupported { path } => {
                write!(
                    f,
                    "binary patch for {} cannot be applied as text",
                    path.display()
                )
            }
            Self::OverlappingHunks { path, first, second } => {
                write!(
                    f,
                    "hunks {first} and {second} overlap in old coordinates of {}",
                    path.display()
                )
            }
            Self::MixedTargets { expected, found } => {
                write!(
                    f,
                    "cannot merge patches for different files: {} vs {}",
                    expected.display(),
                    found.display()
                )
            }
        }
    }
}

impl std::error::Error for DiffError {}
