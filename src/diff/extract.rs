//! Patch extraction: commit → structured patches.
//!
//! Resolves the commit's first parent (or the empty tree for a root
//! commit), asks the Repository Port for the tree-to-tree unified diff,
//! and parses it into [`Patch`]es stamped with the source commit.

use tracing::debug;

use crate::error::PatchdanceError;
use crate::model::patch::Patch;
use crate::model::types::CommitId;
use crate::repo::Repository;

use super::parse::parse_unified_diff;

/// Extract every patch a commit introduces relative to its first parent.
///
/// A commit with a non-empty diff yields a non-empty patch list; every
/// patch's `source_commit` is `commit_id`.
///
/// # Errors
/// - [`PatchdanceError::InvalidCommitId`] when the commit is unknown.
/// - [`PatchdanceError::PatchParse`] when the backend's diff is malformed.
pub fn extract_patches(
    repo: &dyn Repository,
    commit_id: &CommitId,
) -> Result<Vec<Patch>, PatchdanceError> {
    let info = repo.commit_info(commit_id)?;
    let parent = info.first_parent();
    let diff_text = repo.tree_to_tree_diff(parent, commit_id)?;
    let patches = parse_unified_diff(&diff_text, commit_id)?;
    debug!(
        commit = commit_id.short(),
        parent = parent.map_or("none", CommitId::short),
        patches = patches.len(),
        "extracted patches"
    );
    Ok(patches)
}
