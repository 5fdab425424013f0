//! Line-level three-way merge.
//!
//! Computes Myers edit scripts `base → ours` and `base → theirs`
//! (imara-diff) and walks them in lockstep over the base:
//!
//! - a region changed by one side takes that side;
//! - disjoint changes are both included;
//! - identical changes to the same region are taken once;
//! - anything else becomes a [`ConflictRegion`] carrying the competing
//!   base / ours / theirs text.
//!
//! Lines are handled with their terminators, so the merged output
//! reproduces trailing-newline state exactly.

use imara_diff::sources::lines as lines_with_terminator;
use imara_diff::{Algorithm, Diff, InternedInput};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Outcome of a three-way merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeResult {
    /// Both sides merged without overlap.
    Clean(String),
    /// One or more regions conflict; no merged content is produced.
    Conflicted(Vec<ConflictRegion>),
}

impl MergeResult {
    /// Return `true` for a clean merge.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }
}

/// A region both sides changed, incompatibly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictRegion {
    /// 1-based first base line of the region (for a conflicting insertion,
    /// the line before which both sides insert).
    pub base_start: u32,
    /// The base text of the region.
    pub base: String,
    /// Our side's replacement.
    pub ours: String,
    /// Their side's replacement.
    pub theirs: String,
}

impl ConflictRegion {
    /// `true` when their side deleted base lines ours still modifies —
    /// the patch references lines that no longer exist.
    #[must_use]
    pub fn their_side_deleted(&self) -> bool {
        self.theirs.is_empty() && !self.base.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Edit scripts
// ---------------------------------------------------------------------------

/// One edit: replace base lines `[base_start, base_end)` with `lines`.
#[derive(Clone, Debug)]
struct Edit {
    base_start: usize,
    base_end: usize,
    lines: Vec<String>,
}

fn edit_script(base: &str, side: &str) -> Vec<Edit> {
    let input = InternedInput::new(lines_with_terminator(base), lines_with_terminator(side));
    let mut diff = Diff::compute(Algorithm::Myers, &input);
    diff.postprocess_lines(&input);

    let side_lines = split_keep_terminators(side);
    diff.hunks()
        .map(|h| Edit {
            base_start: h.before.start as usize,
            base_end: h.before.end as usize,
            lines: (h.after.start as usize..h.after.end as usize)
                .map(|i| side_lines[i].to_owned())
                .collect(),
        })
        .collect()
}

fn split_keep_terminators(s: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (idx, b) in s.bytes().enumerate() {
        if b == b'\n' {
            lines.push(&s[start..=idx]);
            start = idx + 1;
        }
    }
    if start < s.len() {
        lines.push(&s[start..]);
    }
    lines
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge `ours` and `theirs` over their common ancestor `base`.
#[must_use]
pub fn three_way_merge(base: &str, ours: &str, theirs: &str) -> MergeResult {
    let base_lines = split_keep_terminators(base);
    let our_edits = edit_script(base, ours);
    let their_edits = edit_script(base, theirs);

    let mut out = String::new();
    let mut conflicts: Vec<ConflictRegion> = Vec::new();
    let mut cursor = 0usize;
    let (mut i, mut j) = (0usize, 0usize);

    while i < our_edits.len() || j < their_edits.len() {
        // Take the side whose next edit starts first.
        let ours_next = our_edits.get(i).map(|e| e.base_start);
        let theirs_next = their_edits.get(j).map(|e| e.base_start);

        let take_ours = match (ours_next, theirs_next) {
            (Some(a), Some(b)) => a <= b,
            (Some(_), None) => true,
            (None, _) => false,
        };

        // Seed a group with the earliest edit, then absorb edits from
        // either side that overlap it. Zero-length edits (insertions) at
        // the exact same point are grouped too: both sides inserting at
        // one spot has no well-defined order.
        let (mut gs, mut ge) = if take_ours {
            (our_edits[i].base_start, our_edits[i].base_end)
        } else {
            (their_edits[j].base_start, their_edits[j].base_end)
        };
        let (gi, gj) = (i, j);
        if take_ours {
            i += 1;
        } else {
            j += 1;
        }

        let mut grew = true;
        while grew {
            grew = false;
            while let Some(e) = our_edits.get(i) {
                if e.base_start < ge || (e.base_start == gs && e.base_start == ge) {
                    ge = ge.max(e.base_end);
                    i += 1;
                    grew = true;
                } else {
                    break;
                }
            }
            while let Some(e) = their_edits.get(j) {
                if e.base_start < ge || (e.base_start == gs && e.base_start == ge) {
                    gs = gs.min(e.base_start);
                    ge = ge.max(e.base_end);
                    j += 1;
                    grew = true;
                } else {
                    break;
                }
            }
        }

        // Copy untouched base up to the group.
        out.push_str(&base_lines[cursor..gs].concat());
        cursor = ge;

        let ours_in_group = &our_edits[gi..i];
        let theirs_in_group = &their_edits[gj..j];

        match (ours_in_group.is_empty(), theirs_in_group.is_empty()) {
            (false, true) => {
                out.push_str(&render_region(&base_lines, gs, ge, ours_in_group));
            }
            (true, false) => {
                out.push_str(&render_region(&base_lines, gs, ge, theirs_in_group));
            }
            (false, false) => {
                let our_region = render_region(&base_lines, gs, ge, ours_in_group);
                let their_region = render_region(&base_lines, gs, ge, theirs_in_group);
                if our_region == their_region {
                    out.push_str(&our_region);
                } else {
                    conflicts.push(ConflictRegion {
                        base_start: (gs + 1) as u32,
                        base: base_lines[gs..ge].concat(),
                        ours: our_region,
                        theirs: their_region,
                    });
                }
            }
            (true, true) => unreachable!("group always seeded with an edit"),
        }
    }

    out.push_str(&base_lines[cursor..].concat());

    if conflicts.is_empty() {
        MergeResult::Clean(out)
    } else {
        MergeResult::Conflicted(conflicts)
    }
}

/// Apply one side's edits within `[gs, ge)` to the base slice.
fn render_region(base_lines: &[&str], gs: usize, ge: usize, edits: &[Edit]) -> String {
    let mut out = String::new();
    let mut cursor = gs;
    for edit in edits {
        out.push_str(&base_lines[cursor..edit.base_start].concat());
        out.push_str(&edit.lines.concat());
        cursor = edit.base_end;
    }
    out.push_str(&base_lines[cursor..ge].concat());
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
