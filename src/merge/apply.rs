//! The patch applicator: one patch onto one target commit.
//!
//! Reconstructs the merge base (the patch's pre-image at its source
//! commit's first parent), produces "ours" by textual application, reads
//! "theirs" from the target commit, and three-way merges. The result is
//! either new file content (or a deletion) or structured conflicts — the
//! applicator never writes anything itself.

use tracing::debug;

use crate::diff::apply::{apply_patch_with, ApplyOptions};
use crate::error::PatchdanceError;
use crate::merge::diff3::{three_way_merge, MergeResult};
use crate::model::conflict::Conflict;
use crate::model::patch::{ModeChange, Patch};
use crate::model::types::CommitId;
use crate::repo::Repository;

/// Mode used when neither the patch nor the target dictates one.
const FALLBACK_MODE: u32 = 0o100644;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What applying a patch to a target commit produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The merge was clean.
    Clean {
        /// New file bytes, or `None` when the patch deletes the file.
        content: Option<Vec<u8>>,
        /// Resulting file mode (meaningful when `content` is `Some`).
        mode: u32,
    },
    /// The merge produced conflicts; nothing should be written.
    Conflicted {
        /// Structured conflicts, deterministic ids.
        conflicts: Vec<Conflict>,
        /// The merge base text.
        base: String,
        /// The patch's side.
        ours: String,
        /// The target commit's side.
        theirs: String,
    },
}

impl ApplyOutcome {
    /// Return `true` for a clean outcome.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean { .. })
    }
}

// ---------------------------------------------------------------------------
// Applicator
// ---------------------------------------------------------------------------

/// Three-way merge `patch` onto `target`.
///
/// # Errors
/// - [`PatchdanceError::PatchApplication`] when a hunk cannot be located
///   in the merge base (a corrupt or mis-attributed patch).
/// - Repository errors from the port.
pub fn apply_patch_to_commit(
    repo: &dyn Repository,
    patch: &Patch,
    target: &CommitId,
    options: &ApplyOptions,
) -> Result<ApplyOutcome, PatchdanceError> {
    let file = patch.target_file.as_path();
    let theirs = match repo.read_blob(target, file)? {
        Some(bytes) => {
            let mode = repo.read_mode(target, file)?.unwrap_or(FALLBACK_MODE);
            Some((mode, bytes))
        }
        None => None,
    };
    apply_patch_to_state(repo, patch, theirs, target.short(), options)
}

/// Three-way merge `patch` onto explicit target-file state.
///
/// The history rewriter uses this form: while a commit is being rebuilt,
/// "theirs" is the in-progress tree state rather than any existing commit.
/// `theirs` is the target's `(mode, content)` for the file, or `None` when
/// the target lacks it; `target_label` names the target in conflict
/// descriptions.
///
/// # Errors
/// As [`apply_patch_to_commit`].
pub fn apply_patch_to_state(
    repo: &dyn Repository,
    patch: &Patch,
    theirs: Option<(u32, Vec<u8>)>,
    target_label: &str,
    options: &ApplyOptions,
) -> Result<ApplyOutcome, PatchdanceError> {
    let file = patch.target_file.as_path();

    // A rename's pre-image lives at the old path.
    let pre_image = patch.renamed_from.as_deref().unwrap_or(file);
    let source_info = repo.commit_info(&patch.source_commit)?;
    let base_bytes = match source_info.first_parent() {
        Some(parent) => repo.read_blob(parent, pre_image)?,
        None => None,
    };

    if patch.is_binary {
        return apply_binary(repo, patch, theirs.map(|(_, b)| b), base_bytes);
    }

    let base = base_bytes
        .as_deref()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default();
    let (target_mode, theirs_bytes) = match theirs {
        Some((mode, bytes)) => (Some(mode), Some(bytes)),
        None => (None, None),
    };

    // Deletion patch: drop the file unless the target diverged from the
    // content the deletion was based on.
    if patch.is_deletion() {
        return Ok(match &theirs_bytes {
            None => ApplyOutcome::Clean {
                content: None,
                mode: 0,
            },
            Some(bytes) if bytes.as_slice() == base.as_bytes() => ApplyOutcome::Clean {
                content: None,
                mode: 0,
            },
            Some(bytes) => {
                let theirs = String::from_utf8_lossy(bytes).into_owned();
                ApplyOutcome::Conflicted {
                    conflicts: vec![Conflict::delete_modify(
                        file,
                        format!("patch {} deletes a file {target_label} modified", patch.id),
                        String::new(),
                        theirs.clone(),
                    )],
                    base,
                    ours: String::new(),
                    theirs,
                }
            }
        });
    }

    let ours = apply_patch_with(&base, patch, options)?;

    let Some(theirs_bytes) = theirs_bytes else {
        // Absent in target — expected when the patch creates the path,
        // by a new file or by renaming onto it.
        if patch.is_new_file() || patch.renamed_from.is_some() {
            let mode = match patch.mode_change.and_then(|mc| mc.resulting_mode()) {
                Some(mode) => mode,
                None => repo
                    .read_mode(&patch.source_commit, file)?
                    .unwrap_or(FALLBACK_MODE),
            };
            return Ok(ApplyOutcome::Clean {
                content: Some(ours.into_bytes()),
                mode,
            });
        }
        return Ok(ApplyOutcome::Conflicted {
            conflicts: vec![Conflict::delete_modify(
                file,
                format!("patch {} modifies a file absent from {target_label}", patch.id),
                ours.clone(),
                String::new(),
            )],
            base,
            ours,
            theirs: String::new(),
        });
    };
    let theirs = String::from_utf8_lossy(&theirs_bytes).into_owned();

    // Resolve the resulting mode; a target mode incompatible with the
    // patch's expected transition is a mode conflict.
    let mode = match patch.mode_change {
        Some(ModeChange::NewFile { mode }) => mode,
        Some(ModeChange::Changed { old_mode, new_mode }) => {
            if let Some(tm) = target_mode
                && tm != old_mode
                && tm != new_mode
            {
                return Ok(ApplyOutcome::Conflicted {
                    conflicts: vec![Conflict::mode(
                        file,
                        format!(
                            "patch {} changes mode {old_mode:o} → {new_mode:o} but target has {tm:o}",
                            patch.id
                        ),
                        format!("{new_mode:o}"),
                        format!("{tm:o}"),
                    )],
                    base,
                    ours,
                    theirs,
                });
            }
            new_mode
        }
        Some(ModeChange::DeletedFile { .. }) | None => target_mode.unwrap_or(FALLBACK_MODE),
    };

    match three_way_merge(&base, &ours, &theirs) {
        MergeResult::Clean(merged) => {
            debug!(patch = %patch.id, target = target_label, "clean three-way merge");
            Ok(ApplyOutcome::Clean {
                content: Some(merged.into_bytes()),
                mode,
            })
        }
        MergeResult::Conflicted(regions) => {
            let mut conflicts: Vec<Conflict> = Vec::new();
            for region in &regions {
                let conflict = if region.their_side_deleted() {
                    Conflict::delete_modify(
                        file,
                        format!("target {target_label} deleted lines patch {} modifies", patch.id),
                        region.ours.clone(),
                        region.theirs.clone(),
                    )
                } else {
                    Conflict::content(
                        file,
                        region.base_start,
                        format!("patch {} and target {target_label} both change this region", patch.id),
                        region.ours.clone(),
                        region.theirs.clone(),
                    )
                };
                if !conflicts.iter().any(|c| c.id == conflict.id) {
                    conflicts.push(conflict);
                }
            }
            debug!(
                patch = %patch.id,
                target = target_label,
                conflicts = conflicts.len(),
                "three-way merge conflicted"
            );
            Ok(ApplyOutcome::Conflicted {
                conflicts,
                base,
                ours,
                theirs,
            })
        }
    }
}

/// Binary patches apply only as whole-blob replacements when the target
/// still has exactly the content the patch was based on.
fn apply_binary(
    repo: &dyn Repository,
    patch: &Patch,
    theirs: Option<Vec<u8>>,
    base_bytes: Option<Vec<u8>>,
) -> Result<ApplyOutcome, PatchdanceError> {
    let file = patch.target_file.as_path();

    if theirs == base_bytes {
        let new_bytes = repo.read_blob(&patch.source_commit, file)?;
        let mode = repo
            .read_mode(&patch.source_commit, file)?
            .unwrap_or(FALLBACK_MODE);
        return Ok(ApplyOutcome::Clean {
            content: new_bytes,
            mode,
        });
    }

    Err(PatchdanceError::PatchApplication {
        hunk_index: 0,
        reason: format!(
            "binary patch for {} requires the target content to match the source pre-image exactly",
            file.display()
        ),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
