//! Unified diff parser.
//!
//! Consumes standard git unified diff syntax — `diff --git` file headers,
//! extended headers (modes, renames, similarity), `---`/`+++` markers,
//! `@@ -a,b +c,d @@` hunk headers, payload lines prefixed by ` `/`+`/`-`,
//! and the `\ No newline at end of file` sentinel — and produces structured
//! [`Patch`]es. Binary deltas (`Binary files … differ`, `GIT binary patch`)
//! are represented as a single opaque patch flagged binary.
//!
//! Hunk headers are preserved verbatim in [`Hunk::context`]; line counts
//! are validated against the header so malformed input fails loudly.

use std::path::PathBuf;

use crate::model::patch::{DiffLine, Hunk, ModeChange, Patch, PatchId};
use crate::model::types::CommitId;

use super::DiffError;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a unified diff into patches attributed to `source`.
///
/// # Errors
/// Returns [`DiffError::InvalidPatchFormat`] with the 1-based line number of
/// the first malformed line.
pub fn parse_unified_diff(text: &str, source: &CommitId) -> Result<Vec<Patch>, DiffError> {
    let mut parser = Parser {
        lines: text.lines().collect(),
        pos: 0,
        source: source.clone(),
    };
    parser.parse_all()
}

// ---------------------------------------------------------------------------
// Internal: per-file accumulator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FileDiff {
    old_path: Option<PathBuf>,
    new_path: Option<PathBuf>,
    old_mode: Option<u32>,
    new_mode: Option<u32>,
    new_file_mode: Option<u32>,
    deleted_file_mode: Option<u32>,
    rename_from: Option<PathBuf>,
    rename_to: Option<PathBuf>,
    is_binary: bool,
    hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Target file path: the new path if the file still exists, else the
    /// old path (deletions).
    fn target_file(&self) -> Option<PathBuf> {
        if self.deleted_file_mode.is_some() {
            self.old_path.clone().or_else(|| self.new_path.clone())
        } else {
            self.new_path
                .clone()
                .or_else(|| self.rename_to.clone())
                .or_else(|| self.old_path.clone())
        }
    }

    fn mode_change(&self) -> Option<ModeChange> {
        if let Some(mode) = self.new_file_mode {
            return Some(ModeChange::NewFile { mode });
        }
        if let Some(mode) = self.deleted_file_mode {
            return Some(ModeChange::DeletedFile { mode });
        }
        match (self.old_mode, self.new_mode) {
            (Some(old_mode), Some(new_mode)) if old_mode != new_mode => {
                Some(ModeChange::Changed { old_mode, new_mode })
            }
            _ => None,
        }
    }

    fn into_patch(self, source: &CommitId, line_number: usize) -> Result<Patch, DiffError> {
        let target_file = self.target_file().ok_or_else(|| DiffError::InvalidPatchFormat {
            line_number,
            detail: "file header has no usable path".to_owned(),
        })?;
        let mode_change = self.mode_change();
        let mut patch = Patch {
            id: PatchId::for_patch(source, &target_file),
            source_commit: source.clone(),
            target_file,
            hunks: self.hunks,
            mode_change,
            renamed_from: self.rename_from,
            is_binary: self.is_binary,
        };
        if patch.is_binary {
            patch.hunks.clear();
        }
        Ok(patch)
    }
}

// ---------------------------------------------------------------------------
// Internal: parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    source: CommitId,
}

impl Parser<'_> {
    fn parse_all(&mut self) -> Result<Vec<Patch>, DiffError> {
        let mut patches = Vec::new();
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            if line.starts_with("diff --git ") {
                patches.push(self.parse_file()?);
            } else if line.is_empty() {
                self.pos += 1;
            } else {
                // Leading noise (e.g. commit headers from `git show`) is
                // tolerated before the first file; anything after is not.
                if patches.is_empty() {
                    self.pos += 1;
                } else {
                    return Err(self.err("expected 'diff --git' file header"));
                }
            }
        }
        Ok(patches)
    }

    fn err(&self, detail: impl Into<String>) -> DiffError {
        DiffError::InvalidPatchFormat {
            line_number: self.pos + 1,
            detail: detail.into(),
        }
    }

    fn parse_file(&mut self) -> Result<Patch, DiffError> {
        let header_line = self.pos;
        let header = self.lines[self.pos];
        let mut file = FileDiff::default();

        let (old, new) = parse_git_header_paths(header)
            .ok_or_else(|| self.err("unparsable 'diff --git' header"))?;
        file.old_path = Some(old);
        file.new_path = Some(new);
        self.pos += 1;

        // Extended headers up to the first hunk, binary marker, or next file.
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            if line.starts_with("diff --git ") || line.starts_with("@@ ") {
                break;
            }
            if let Some(rest) = line.strip_prefix("old mode ") {
                file.old_mode = Some(self.parse_octal(rest)?);
            } else if let Some(rest) = line.strip_prefix("new mode ") {
                file.new_mode = Some(self.parse_octal(rest)?);
            } else if let Some(rest) = line.strip_prefix("new file mode ") {
                file.new_file_mode = Some(self.parse_octal(rest)?);
            } else if let Some(rest) = line.strip_prefix("deleted file mode ") {
                file.deleted_file_mode = Some(self.parse_octal(rest)?);
            } else if let Some(rest) = line.strip_prefix("rename from ") {
                file.rename_from = Some(PathBuf::from(rest));
            } else if let Some(rest) = line.strip_prefix("rename to ") {
                file.rename_to = Some(PathBuf::from(rest));
                file.new_path = Some(PathBuf::from(rest));
            } else if line.starts_with("similarity index ")
                || line.starts_with("dissimilarity index ")
                || line.starts_with("copy from ")
                || line.starts_with("copy to ")
                || line.starts_with("index ")
            {
                // Informational; nothing to record.
            } else if line.starts_with("Binary files ") && line.ends_with(" differ") {
                file.is_binary = true;
                self.pos += 1;
                break;
            } else if line == "GIT binary patch" {
                file.is_binary = true;
                self.pos += 1;
                self.skip_binary_body();
                break;
            } else if let Some(rest) = line.strip_prefix("--- ") {
                if rest != "/dev/null" {
                    file.old_path = Some(strip_prefix_path(rest));
                }
            } else if let Some(rest) = line.strip_prefix("+++ ") {
                if rest == "/dev/null" {
                    // Deletion: keep the old path as target.
                } else {
                    file.new_path = Some(strip_prefix_path(rest));
                }
            } else if line.is_empty() {
                // Blank line separates file sections in some producers.
                self.pos += 1;
                break;
            } else {
                return Err(self.err(format!("unrecognized diff header: {line:?}")));
            }
            self.pos += 1;
        }

        // Hunks.
        while self.pos < self.lines.len() && self.lines[self.pos].starts_with("@@ ") {
            let hunk = self.parse_hunk()?;
            file.hunks.push(hunk);
        }

        file.into_patch(&self.source, header_line + 1)
    }

    fn parse_octal(&self, s: &str) -> Result<u32, DiffError> {
        u32::from_str_radix(s.trim(), 8).map_err(|_| self.err(format!("bad file mode: {s:?}")))
    }

    /// Skip the base85 body of a `GIT binary patch` section (forward and
    /// reverse blocks, blank-line separated) up to the next file header.
    fn skip_binary_body(&mut self) {
        while self.pos < self.lines.len() {
            if self.lines[self.pos].starts_with("diff --git ") {
                break;
            }
            self.pos += 1;
        }
    }

    fn parse_hunk(&mut self) -> Result<Hunk, DiffError> {
        let header = self.lines[self.pos];
        let (old_start, old_lines, new_start, new_lines) = parse_hunk_header(header)
            .ok_or_else(|| self.err(format!("unparsable hunk header: {header:?}")))?;
        self.pos += 1;

        let mut lines = Vec::new();
        let mut old_remaining = old_lines;
        let mut new_remaining = new_lines;
        let mut old_missing_newline = false;
        let mut new_missing_newline = false;

        while old_remaining > 0 || new_remaining > 0 {
            let Some(&raw) = self.lines.get(self.pos) else {
                return Err(self.err(format!(
                    "hunk truncated: {old_remaining} old and {new_remaining} new line(s) missing"
                )));
            };
            let (prefix, text) = if raw.is_empty() {
                // Some transports strip the trailing space of an empty
                // context line.
                (' ', "")
            } else {
                let mut chars = raw.chars();
                (chars.next().unwrap_or(' '), chars.as_str())
            };
            match prefix {
                ' ' => {
                    if old_remaining == 0 || new_remaining == 0 {
                        return Err(self.err("context line exceeds hunk header counts"));
                    }
                    lines.push(DiffLine::Context(text.to_owned()));
                    old_remaining -= 1;
                    new_remaining -= 1;
                }
                '-' => {
                    if old_remaining == 0 {
                        return Err(self.err("deletion exceeds hunk header counts"));
                    }
                    lines.push(DiffLine::Deletion(text.to_owned()));
                    old_remaining -= 1;
                }
                '+' => {
                    if new_remaining == 0 {
                        return Err(self.err("addition exceeds hunk header counts"));
                    }
                    lines.push(DiffLine::Addition(text.to_owned()));
                    new_remaining -= 1;
                }
                '\\' => {
                    // `\ No newline at end of file` — attributes to the side
                    // of the preceding line.
                    match lines.last() {
                        Some(DiffLine::Deletion(_)) => old_missing_newline = true,
                        Some(DiffLine::Addition(_)) => new_missing_newline = true,
                        Some(DiffLine::Context(_)) => {
                            old_missing_newline = true;
                            new_missing_newline = true;
                        }
                        None => return Err(self.err("newline sentinel before any hunk line")),
                    }
                }
                _ => {
                    return Err(self.err(format!("unexpected line in hunk body: {raw:?}")));
                }
            }
            self.pos += 1;
        }

        // A trailing sentinel after the last consumed line.
        if self.pos < self.lines.len() && self.lines[self.pos].starts_with('\\') {
            match lines.last() {
                Some(DiffLine::Deletion(_)) => old_missing_newline = true,
                Some(DiffLine::Addition(_)) => new_missing_newline = true,
                _ => {
                    old_missing_newline = true;
                    new_missing_newline = true;
                }
            }
            self.pos += 1;
        }

        Ok(Hunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
            lines,
            context: header.to_owned(),
            old_missing_newline,
            new_missing_newline,
        })
    }
}

// ---------------------------------------------------------------------------
// Header parsing helpers
// ---------------------------------------------------------------------------

/// Parse `diff --git a/<old> b/<new>` into (old, new) paths.
///
/// Quoted paths are unwrapped but not unescaped; paths containing ` b/` are
/// resolved by taking the last occurrence (matching git's own output, where
/// both sides are equal for the ambiguous cases it prints unquoted).
fn parse_git_header_paths(line: &str) -> Option<(PathBuf, PathBuf)> {
    let rest = line.strip_prefix("diff --git ")?;
    if let Some(stripped) = rest.strip_prefix('"') {
        // "a/old" "b/new"
        let (old, tail) = stripped.split_once('"')?;
        let tail = tail.trim_start();
        let new = tail.strip_prefix('"')?.strip_suffix('"')?;
        return Some((
            strip_prefix_path(old),
            strip_prefix_path(new),
        ));
    }
    let idx = rest.rfind(" b/")?;
    let old = &rest[..idx];
    let new = &rest[idx + 1..];
    Some((strip_prefix_path(old), strip_prefix_path(new)))
}

/// Strip the `a/` or `b/` prefix git puts on header paths, and any
/// surrounding quotes.
fn strip_prefix_path(s: &str) -> PathBuf {
    let s = s.trim_matches('"');
    let s = s
        .strip_prefix("a/")
        .or_else(|| s.strip_prefix("b/"))
        .unwrap_or(s);
    PathBuf::from(s)
}

/// Parse `@@ -a[,b] +c[,d] @@ …` into (old_start, old_lines, new_start, new_lines).
///
/// Omitted counts default to 1, per the unified diff format.
fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    let rest = line.strip_prefix("@@ -")?;
    let (old_part, rest) = rest.split_once(" +")?;
    let (new_part, _) = rest.split_once(" @@")?;

    let parse_range = |s: &str| -> Option<(u32, u32)> {
        match s.split_once(',') {
            Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
            None => Some((s.parse().ok()?, 1)),
        }
    };

    let (old_start, old_lines) = parse_range(old_part)?;
    let (new_start, new_lines) = parse_range(new_part)?;
    Some((old_start, old_lines, new_start, new_lines))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
