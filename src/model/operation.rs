//! History-surgery operations and their results.
//!
//! An [`Operation`] is the caller's request: move a patch, split a commit,
//! synthesize a commit from patches, or merge a range. The engine answers
//! with an [`OperationPreview`] (read-only) or an [`OperationResult`]
//! (after a transaction).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::conflict::Conflict;
use super::patch::PatchId;
use super::types::CommitId;

// ---------------------------------------------------------------------------
// InsertPosition
// ---------------------------------------------------------------------------

/// Where a new or moved commit lands in the history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "position", rename_all = "snake_case")]
pub enum InsertPosition {
    /// Insert immediately before (as the parent of) the given commit.
    Before(CommitId),
    /// Insert immediately after (as a child of) the given commit.
    After(CommitId),
    /// Insert on top of the current branch head.
    AtBranchHead,
}

impl fmt::Display for InsertPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before(id) => write!(f, "before {}", id.short()),
            Self::After(id) => write!(f, "after {}", id.short()),
            Self::AtBranchHead => write!(f, "at branch head"),
        }
    }
}

// ---------------------------------------------------------------------------
// NewCommit
// ---------------------------------------------------------------------------

/// One commit to be created by a [`Operation::SplitCommit`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommit {
    /// Message for the new commit.
    pub message: String,
    /// The patches (by id) that make up the new commit.
    pub patches: Vec<PatchId>,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A history-surgery request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Move a single patch from one commit to another.
    MovePatch {
        /// The patch to move.
        patch_id: PatchId,
        /// The commit currently carrying the patch.
        from_commit: CommitId,
        /// The commit that should carry it instead.
        to_commit: CommitId,
        /// Where the receiving commit sits (used when `to_commit` must be
        /// created; for existing targets the patch is folded in).
        position: InsertPosition,
    },
    /// Split one commit into several, partitioning its patches.
    SplitCommit {
        /// The commit to split.
        source_commit: CommitId,
        /// Replacement commits, oldest first.
        new_commits: Vec<NewCommit>,
    },
    /// Synthesize a brand-new commit from selected patches.
    CreateCommit {
        /// Patches (by id) the new commit should carry.
        patches: Vec<PatchId>,
        /// Message for the new commit.
        message: String,
        /// Where to insert it.
        position: InsertPosition,
    },
    /// Squash a contiguous range of commits into one.
    MergeCommits {
        /// The commits to merge, oldest first.
        commit_ids: Vec<CommitId>,
        /// Message for the merged commit.
        message: String,
    },
}

impl Operation {
    /// Short label for logging and result messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MovePatch { .. } => "move_patch",
            Self::SplitCommit { .. } => "split_commit",
            Self::CreateCommit { .. } => "create_commit",
            Self::MergeCommits { .. } => "merge_commits",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MovePatch {
                patch_id,
                from_commit,
                to_commit,
                ..
            } => write!(
                f,
                "move patch {patch_id} from {} to {}",
                from_commit.short(),
                to_commit.short()
            ),
            Self::SplitCommit {
                source_commit,
                new_commits,
            } => write!(
                f,
                "split {} into {} commit(s)",
                source_commit.short(),
                new_commits.len()
            ),
            Self::CreateCommit {
                patches, position, ..
            } => write!(
                f,
                "create commit from {} patch(es) {position}",
                patches.len()
            ),
            Self::MergeCommits { commit_ids, .. } => {
                write!(f, "merge {} commit(s)", commit_ids.len())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OperationResult
// ---------------------------------------------------------------------------

/// The outcome of [`Operation`] execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the transaction committed.
    pub success: bool,
    /// Commits created by the operation itself (splits, creates, merges).
    pub new_commit_ids: Vec<CommitId>,
    /// All rewritten commits, including rebased descendants.
    pub modified_commits: Vec<CommitId>,
    /// Conflicts encountered (empty on success).
    pub conflicts: Vec<Conflict>,
    /// Human-readable summary.
    pub message: String,
}

impl OperationResult {
    /// A successful result.
    #[must_use]
    pub fn succeeded(
        new_commit_ids: Vec<CommitId>,
        modified_commits: Vec<CommitId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            new_commit_ids,
            modified_commits,
            conflicts: Vec::new(),
            message: message.into(),
        }
    }

    /// A failed result carrying the conflicts that stopped it.
    #[must_use]
    pub fn failed(conflicts: Vec<Conflict>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            new_commit_ids: Vec::new(),
            modified_commits: Vec::new(),
            conflicts,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationPreview
// ---------------------------------------------------------------------------

/// A read-only dry run of an operation.
///
/// Previews are deterministic: the same repository state and operation
/// produce bytewise-equal previews.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPreview {
    /// Human-readable change descriptions, in plan order.
    pub changes: Vec<String>,
    /// Conflicts the detector anticipates.
    pub potential_conflicts: Vec<Conflict>,
    /// Commits the transaction would rewrite, oldest first.
    pub affected_commits: Vec<CommitId>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
