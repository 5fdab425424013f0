//! Pure textual patch application.
//!
//! [`apply_patch`] applies a [`Patch`] to an explicit original string, with
//! no repository involvement. Each hunk is located by exact match at its
//! recorded position first; when that fails, a fuzzy search scans the whole
//! file scoring context-line overlap. All hunks must locate before anything
//! is written — a failing hunk aborts the whole application.
//!
//! Scoring: +10 per matching line, −5 per mismatching context line,
//! saturating at 100; a candidate needs ≥ the configured minimum (default
//! 50) and at most the configured number of context mismatches (default 3).
//! Ties break toward the hunk's recorded position.

use crate::model::patch::{DiffLine, Hunk, Patch};

use super::DiffError;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Tunables for fuzzy hunk location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Minimum confidence score a fuzzy candidate must reach (0–100).
    pub min_confidence: i32,
    /// Maximum context lines allowed to mismatch per hunk.
    pub max_context_mismatches: u32,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            min_confidence: 50,
            max_context_mismatches: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Apply `patch` to `original` with default options.
///
/// # Errors
/// See [`apply_patch_with`].
pub fn apply_patch(original: &str, patch: &Patch) -> Result<String, DiffError> {
    apply_patch_with(original, patch, &ApplyOptions::default())
}

/// Apply `patch` to `original`.
///
/// Line terminators follow the original file's convention (`\r\n` is
/// preserved); the trailing-newline state follows the side that produced
/// the final line. A patch with no hunks returns the original unchanged.
///
/// # Errors
/// - [`DiffError::BinaryPatchUnsupported`] for binary patches.
/// - [`DiffError::HunkApplicationFailed`] when a hunk cannot be located
///   with sufficient confidence, or located hunks overlap. No partial
///   result is ever produced.
pub fn apply_patch_with(
    original: &str,
    patch: &Patch,
    options: &ApplyOptions,
) -> Result<String, DiffError> {
    if patch.is_binary {
        return Err(DiffError::BinaryPatchUnsupported {
            path: patch.target_file.clone(),
        });
    }
    if patch.hunks.is_empty() {
        return Ok(original.to_owned());
    }

    let eol = if original.contains("\r\n") { "\r\n" } else { "\n" };
    let had_trailing_newline = original.ends_with('\n');
    let old_lines: Vec<&str> = original.lines().collect();

    // Locate every hunk before touching anything.
    let mut replacements = Vec::with_capacity(patch.hunks.len());
    for (index, hunk) in patch.hunks.iter().enumerate() {
        replacements.push(locate_hunk(&old_lines, hunk, index, options)?);
    }
    replacements.sort_by_key(|r| r.start);
    for pair in replacements.windows(2) {
        if pair[1].start < pair[0].start + pair[0].old_len {
            return Err(DiffError::HunkApplicationFailed {
                hunk_index: pair[1].hunk_index,
                reason: format!(
                    "fuzzy positions overlap: hunks landed at lines {} and {}",
                    pair[0].start + 1,
                    pair[1].start + 1
                ),
            });
        }
    }

    // Materialize.
    let mut out: Vec<&str> = Vec::with_capacity(old_lines.len());
    let mut cursor = 0usize;
    let mut tail_from_patch: Option<bool> = None;
    for r in &replacements {
        out.extend_from_slice(&old_lines[cursor..r.start]);
        out.extend_from_slice(&r.new_lines);
        cursor = r.start + r.old_len;
        if cursor >= old_lines.len() && !r.new_lines.is_empty() {
            tail_from_patch = Some(!r.new_missing_newline);
        }
    }
    if cursor < old_lines.len() {
        out.extend_from_slice(&old_lines[cursor..]);
        tail_from_patch = None;
    }

    if out.is_empty() {
        return Ok(String::new());
    }
    let trailing = tail_from_patch.unwrap_or(had_trailing_newline);
    let mut result = out.join(eol);
    if trailing {
        result.push_str(eol);
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Internal: hunk location
// ---------------------------------------------------------------------------

/// A located hunk: a window of old lines to replace with new lines.
struct Replacement<'a> {
    hunk_index: usize,
    /// 0-based start in the old line array.
    start: usize,
    old_len: usize,
    new_lines: Vec<&'a str>,
    new_missing_newline: bool,
}

fn locate_hunk<'a>(
    old_lines: &[&'a str],
    hunk: &'a Hunk,
    hunk_index: usize,
    options: &ApplyOptions,
) -> Result<Replacement<'a>, DiffError> {
    let window = hunk.old_window();

    // Pure addition: old_start names the line after which to insert.
    if window.is_empty() {
        let at = hunk.old_start as usize;
        if at > old_lines.len() {
            return Err(DiffError::HunkApplicationFailed {
                hunk_index,
                reason: format!(
                    "insertion point {} is beyond end of file ({} lines)",
                    at,
                    old_lines.len()
                ),
            });
        }
        return Ok(Replacement {
            hunk_index,
            start: at,
            old_len: 0,
            new_lines: materialize_new(old_lines, at, hunk),
            new_missing_newline: hunk.new_missing_newline,
        });
    }

    let anchor = (hunk.old_start as usize).saturating_sub(1);

    // Exact match at the recorded position.
    if matches_exact(old_lines, anchor, &window) {
        return Ok(Replacement {
            hunk_index,
            start: anchor,
            old_len: window.len(),
            new_lines: materialize_new(old_lines, anchor, hunk),
            new_missing_newline: hunk.new_missing_newline,
        });
    }

    // Fuzzy: scan the entire file, scoring each candidate window.
    let is_context: Vec<bool> = hunk
        .lines
        .iter()
        .filter(|l| l.in_old())
        .map(|l| matches!(l, DiffLine::Context(_)))
        .collect();

    let mut best: Option<(i32, usize)> = None;
    if window.len() <= old_lines.len() {
        for start in 0..=(old_lines.len() - window.len()) {
            let Some(score) = score_candidate(old_lines, start, &window, &is_context, options)
            else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_score, best_start)) => {
                    score > best_score
                        || (score == best_score
                            && distance(start, anchor) < distance(best_start, anchor))
                }
            };
            if better {
                best = Some((score, start));
            }
        }
    }

    match best {
        Some((score, start)) => {
            tracing::debug!(
                hunk_index,
                offset = start as i64 - anchor as i64,
                confidence = score,
                "hunk located by fuzzy match"
            );
            Ok(Replacement {
                hunk_index,
                start,
                old_len: window.len(),
                new_lines: materialize_new(old_lines, start, hunk),
                new_missing_newline: hunk.new_missing_newline,
            })
        }
        None => Err(DiffError::HunkApplicationFailed {
            hunk_index,
            reason: format!(
                "no location with confidence >= {} (expected at line {})",
                options.min_confidence, hunk.old_start
            ),
        }),
    }
}

fn distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

fn matches_exact(old_lines: &[&str], start: usize, window: &[&str]) -> bool {
    old_lines.len() >= start + window.len()
        && old_lines[start..start + window.len()]
            .iter()
            .zip(window)
            .all(|(a, b)| a == b)
}

/// Score a candidate position, or `None` when it is unacceptable
/// (a deletion line mismatches, or too many context mismatches).
fn score_candidate(
    old_lines: &[&str],
    start: usize,
    window: &[&str],
    is_context: &[bool],
    options: &ApplyOptions,
) -> Option<i32> {
    let mut score = 0i32;
    let mut mismatches = 0u32;
    for (i, expected) in window.iter().enumerate() {
        if old_lines[start + i] == *expected {
            score += 10;
        } else {
            if !is_context[i] {
                // Deleted lines must match: the patch removes exactly them.
                return None;
            }
            mismatches += 1;
            if mismatches > options.max_context_mismatches {
                return None;
            }
            score -= 5;
        }
    }
    let score = score.min(100);
    (score >= options.min_confidence).then_some(score)
}

/// Build the replacement lines for a hunk located at `start`: additions
/// come from the patch, context lines from the file itself (so tolerated
/// context mismatches keep the file's actual text).
fn materialize_new<'a>(old_lines: &[&'a str], start: usize, hunk: &'a Hunk) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut cursor = start;
    for line in &hunk.lines {
        match line {
            DiffLine::Context(text) => {
                out.push(old_lines.get(cursor).copied().unwrap_or(text.as_str()));
                cursor += 1;
            }
            DiffLine::Deletion(_) => cursor += 1,
            DiffLine::Addition(text) => out.push(text.as_str()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
