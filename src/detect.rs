//! Conflict detection over candidate patch sets.
//!
//! Two layers:
//! - [`detect_patch_conflicts`] — pure pairwise analysis of a patch set
//!   (line overlap, mode disagreement, delete-vs-modify, rename
//!   divergence); no repository involved.
//! - [`detect_conflicts`] — the engine entry point: pairwise analysis plus
//!   target-state divergence (lines the patches touch that changed between
//!   each patch's source and the target commit).
//!
//! Output is sorted by conflict id and deduplicated, so the result is
//! deterministic and independent of input order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use imara_diff::sources::lines as lines_with_terminator;
use imara_diff::{Algorithm, Diff, InternedInput};
use tracing::debug;

use crate::error::PatchdanceError;
use crate::model::conflict::Conflict;
use crate::model::patch::{Hunk, Patch};
use crate::model::types::CommitId;
use crate::repo::Repository;

// ---------------------------------------------------------------------------
// Pure pairwise detection
// ---------------------------------------------------------------------------

/// Detect conflicts among the patches themselves, without repository state.
#[must_use]
pub fn detect_patch_conflicts(patches: &[Patch]) -> Vec<Conflict> {
    let mut sorted: Vec<&Patch> = patches.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut found: BTreeMap<String, Conflict> = BTreeMap::new();

    // Group by target file.
    let mut by_file: BTreeMap<&Path, Vec<&Patch>> = BTreeMap::new();
    for patch in &sorted {
        by_file
            .entry(patch.target_file.as_path())
            .or_default()
            .push(*patch);
    }

    for (file, group) in &by_file {
        if group.len() < 2 {
            continue;
        }
        for (ai, a) in group.iter().enumerate() {
            for b in &group[ai + 1..] {
                content_overlaps(&mut found, file, a, b);
                mode_disagreement(&mut found, file, a, b);
                delete_vs_modify(&mut found, file, a, b);
            }
        }
    }

    rename_divergence(&mut found, &sorted);

    found.into_values().collect()
}

/// Per-line overlap: for each pair of hunks overlapping in the old
/// coordinate space, every old-file line both patches modify yields a
/// `<file>:<line>` content conflict. Context lines position a hunk but do
/// not count as modifications, so touching context alone never conflicts.
fn content_overlaps(found: &mut BTreeMap<String, Conflict>, file: &Path, a: &Patch, b: &Patch) {
    for (ia, ha) in a.hunks.iter().enumerate() {
        for (ib, hb) in b.hunks.iter().enumerate() {
            // Overlap in the old coordinate space (half-open ranges).
            if ha.old_end() <= hb.old_start || hb.old_end() <= ha.old_start {
                continue;
            }
            let lines_a = modified_lines(ha);
            for line in modified_lines(hb) {
                if !lines_a.contains(&line) {
                    continue;
                }
                let conflict = Conflict::content(
                    file,
                    line,
                    format!(
                        "patches {} (hunk {ia}) and {} (hunk {ib}) both modify line {line}",
                        a.id, b.id
                    ),
                    new_text(ha),
                    new_text(hb),
                );
                found.entry(conflict.id.clone()).or_insert(conflict);
            }
        }
    }
}

/// Old-file lines a hunk actually modifies (its deletions).
fn modified_lines(hunk: &Hunk) -> Vec<u32> {
    let mut out = Vec::new();
    let mut cursor = hunk.old_start;
    for line in &hunk.lines {
        match line {
            crate::model::patch::DiffLine::Context(_) => cursor += 1,
            crate::model::patch::DiffLine::Deletion(_) => {
                out.push(cursor);
                cursor += 1;
            }
            crate::model::patch::DiffLine::Addition(_) => {}
        }
    }
    out
}

fn mode_disagreement(found: &mut BTreeMap<String, Conflict>, file: &Path, a: &Patch, b: &Patch) {
    let (Some(ma), Some(mb)) = (a.mode_change, b.mode_change) else {
        return;
    };
    if ma != mb {
        let conflict = Conflict::mode(
            file,
            format!("patches {} and {} disagree on mode change", a.id, b.id),
            ma.to_string(),
            mb.to_string(),
        );
        found.entry(conflict.id.clone()).or_insert(conflict);
    }
}

fn delete_vs_modify(found: &mut BTreeMap<String, Conflict>, file: &Path, a: &Patch, b: &Patch) {
    let (deleter, modifier) = if a.is_deletion() && !b.is_deletion() {
        (a, b)
    } else if b.is_deletion() && !a.is_deletion() {
        (b, a)
    } else {
        return;
    };
    let conflict = Conflict::delete_modify(
        file,
        format!("patch {} deletes a file patch {} modifies", deleter.id, modifier.id),
        String::new(),
        modifier.hunks.iter().map(new_text).collect::<Vec<_>>().join("\n"),
    );
    found.entry(conflict.id.clone()).or_insert(conflict);
}

/// The same rename source sent to different destinations.
fn rename_divergence(found: &mut BTreeMap<String, Conflict>, patches: &[&Patch]) {
    let mut by_source: BTreeMap<&Path, Vec<&Patch>> = BTreeMap::new();
    for patch in patches {
        if let Some(from) = &patch.renamed_from {
            by_source.entry(from.as_path()).or_default().push(patch);
        }
    }

    for (source, group) in &by_source {
        let mut destinations: Vec<&PathBuf> = group.iter().map(|p| &p.target_file).collect();
        destinations.sort();
        destinations.dedup();
        if destinations.len() > 1 {
            let conflict = Conflict::rename(
                source,
                format!(
                    "renamed to {} different destinations",
                    destinations.len()
                ),
                destinations[0].display().to_string(),
                destinations[1].display().to_string(),
            );
            found.entry(conflict.id.clone()).or_insert(conflict);
        }
    }
}

fn new_text(hunk: &Hunk) -> String {
    hunk.new_window().join("\n")
}

// ---------------------------------------------------------------------------
// Target-state detection
// ---------------------------------------------------------------------------

/// Detect all conflicts for applying `patches` to `target`: pairwise
/// conflicts plus divergence between each patch's source content and the
/// target commit's content. Never mutates state.
///
/// # Errors
/// Repository access failures; unknown source commits.
pub fn detect_conflicts(
    repo: &dyn Repository,
    patches: &[Patch],
    target: &CommitId,
) -> Result<Vec<Conflict>, PatchdanceError> {
    let mut found: BTreeMap<String, Conflict> = detect_patch_conflicts(patches)
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();

    let mut sorted: Vec<&Patch> = patches.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    for patch in sorted {
        target_state_conflicts(repo, patch, target, &mut found)?;
    }

    let conflicts: Vec<Conflict> = found.into_values().collect();
    debug!(
        target = target.short(),
        patches = patches.len(),
        conflicts = conflicts.len(),
        "conflict detection finished"
    );
    Ok(conflicts)
}

fn target_state_conflicts(
    repo: &dyn Repository,
    patch: &Patch,
    target: &CommitId,
    found: &mut BTreeMap<String, Conflict>,
) -> Result<(), PatchdanceError> {
    let file = patch.target_file.as_path();

    let source_info = repo.commit_info(&patch.source_commit)?;
    let pre_image = patch.renamed_from.as_deref().unwrap_or(file);
    let base = match source_info.first_parent() {
        Some(parent) => repo
            .read_blob(parent, pre_image)?
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default(),
        None => String::new(),
    };

    let Some(theirs_bytes) = repo.read_blob(target, file)? else {
        // Absent in target: fine when the patch creates the path.
        if !patch.is_new_file() && patch.renamed_from.is_none() {
            let conflict = Conflict::delete_modify(
                file,
                format!(
                    "patch {} modifies a file absent from {}",
                    patch.id,
                    target.short()
                ),
                patch.hunks.iter().map(new_text).collect::<Vec<_>>().join("\n"),
                String::new(),
            );
            found.entry(conflict.id.clone()).or_insert(conflict);
        }
        return Ok(());
    };
    let theirs = String::from_utf8_lossy(&theirs_bytes).into_owned();

    // Mode drift: the patch expects to transition from a mode the target
    // no longer has.
    if let Some(crate::model::patch::ModeChange::Changed { old_mode, .. }) = patch.mode_change {
        let target_mode = repo.read_mode(target, file)?;
        if target_mode != Some(old_mode) {
            let conflict = Conflict::mode(
                file,
                format!("patch {} expects mode {old_mode:o} but target differs", patch.id),
                format!("{old_mode:o}"),
                target_mode.map_or_else(|| "absent".to_owned(), |m| format!("{m:o}")),
            );
            found.entry(conflict.id.clone()).or_insert(conflict);
        }
    }

    if base == theirs {
        return Ok(());
    }

    // A target that already contains exactly the patch's result is not a
    // divergence.
    if let Ok(ours) = crate::diff::apply_patch(&base, patch)
        && ours == theirs
    {
        return Ok(());
    }

    // Lines of the base the target changed, intersected with the lines
    // the patch modifies. The three-way merge decides the real outcome;
    // this is the preview over-approximation.
    let changed = changed_base_lines(&base, &theirs);
    let theirs_lines: Vec<&str> = theirs.lines().collect();
    for hunk in &patch.hunks {
        for line in modified_lines(hunk) {
            let in_changed = changed.iter().any(|&(start, end)| line >= start && line < end);
            if !in_changed {
                continue;
            }
            let their_text = theirs_lines
                .get((line as usize).saturating_sub(1))
                .copied()
                .unwrap_or("");
            let conflict = Conflict::content(
                file,
                line,
                format!(
                    "line {line} changed between {}'s parent and {}",
                    patch.source_commit.short(),
                    target.short()
                ),
                new_text(hunk),
                their_text,
            );
            found.entry(conflict.id.clone()).or_insert(conflict);
        }
    }
    Ok(())
}

/// 1-based, half-open ranges of base lines edited by `theirs`.
fn changed_base_lines(base: &str, theirs: &str) -> Vec<(u32, u32)> {
    let input = InternedInput::new(
        lines_with_terminator(base),
        lines_with_terminator(theirs),
    );
    let mut diff = Diff::compute(Algorithm::Myers, &input);
    diff.postprocess_lines(&input);
    diff.hunks()
        .map(|h| (h.before.start + 1, h.before.end + 1))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
