//! Merging same-file patches.
//!
//! [`merge_patches`] combines several patches that target the same file —
//! from the same or different source commits — into one patch whose hunks
//! are renumbered into a single coordinate space. Hunks that overlap in the
//! old coordinate space are a merge conflict; the caller resolves those
//! through the conflict detector first.

use crate::model::patch::{Hunk, Patch};

use super::DiffError;

/// Merge patches targeting the same file into a single patch.
///
/// Hunks are sorted by `old_start`. The merged patch's `new_start` values
/// are recomputed from the cumulative line delta of the preceding hunks.
/// The merged patch keeps the first patch's source commit (and therefore
/// its id), and the first non-`None` mode change.
///
/// # Errors
/// - [`DiffError::MixedTargets`] when the patches disagree on target file.
/// - [`DiffError::OverlappingHunks`] when two hunks overlap in old
///   coordinates.
///
/// # Panics
/// Panics if `patches` is empty (a caller bug).
pub fn merge_patches(patches: &[Patch]) -> Result<Patch, DiffError> {
    assert!(!patches.is_empty(), "merge_patches requires at least one patch");

    let first = &patches[0];
    for p in &patches[1..] {
        if p.target_file != first.target_file {
            return Err(DiffError::MixedTargets {
                expected: first.target_file.clone(),
                found: p.target_file.clone(),
            });
        }
    }

    let mut hunks: Vec<Hunk> = patches.iter().flat_map(|p| p.hunks.iter().cloned()).collect();
    hunks.sort_by_key(|h| (h.old_start, h.old_end()));

    for (i, pair) in hunks.windows(2).enumerate() {
        if pair[1].old_start < pair[0].old_end() {
            return Err(DiffError::OverlappingHunks {
                path: first.target_file.clone(),
                first: i,
                second: i + 1,
            });
        }
    }

    // Renumber new_start into the merged coordinate space.
    let mut delta = 0i64;
    for hunk in &mut hunks {
        hunk.new_start = (i64::from(hunk.old_start) + delta).max(0) as u32;
        delta += i64::from(hunk.new_lines) - i64::from(hunk.old_lines);
    }

    let mode_change = patches.iter().find_map(|p| p.mode_change);
    let mut merged = Patch::new(
        first.source_commit.clone(),
        first.target_file.clone(),
        hunks,
        mode_change,
    );
    merged.renamed_from = patches.iter().find_map(|p| p.renamed_from.clone());
    merged.is_binary = patches.iter().any(|p| p.is_binary);
    Ok(merged)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
