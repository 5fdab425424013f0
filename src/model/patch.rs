//! Patch model — structured file-level patches extracted from commits.
//!
//! A [`Patch`] is the unit of history surgery: every change a commit makes
//! to one file, broken into [`Hunk`]s of [`DiffLine`]s. Patches carry only
//! the [`CommitId`] of their source commit — looking up live repository
//! state requires the Repository Port.
//!
//! Key types:
//! - [`PatchId`] — `<source_short>:<target_file>`; two patches collide iff
//!   they share source commit and target file
//! - [`DiffLine`] — context / addition / deletion, terminator excluded
//! - [`Hunk`] — a contiguous block with old/new line ranges (1-based)
//! - [`ModeChange`] — file creation, deletion, or mode bits change

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::CommitId;

// ---------------------------------------------------------------------------
// PatchId
// ---------------------------------------------------------------------------

/// Stable identifier of a patch: `<source_short>:<target_file_path>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(String);

impl PatchId {
    /// Build the id for a patch extracted from `source` touching `target_file`.
    #[must_use]
    pub fn for_patch(source: &CommitId, target_file: &Path) -> Self {
        Self(format!("{}:{}", source.short(), target_file.display()))
    }

    /// Wrap a raw id string (used when deserializing operation requests).
    #[must_use]
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Return the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the short source-commit prefix of the id.
    #[must_use]
    pub fn source_short(&self) -> &str {
        self.0.split_once(':').map_or("", |(s, _)| s)
    }

    /// Return the target-file portion of the id.
    #[must_use]
    pub fn target_file(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, f)| f)
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// DiffLine
// ---------------------------------------------------------------------------

/// One line of a hunk. Text excludes the line terminator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DiffLine {
    /// Unchanged line, present in both old and new file.
    Context(String),
    /// Line added by the patch (new file only).
    Addition(String),
    /// Line removed by the patch (old file only).
    Deletion(String),
}

impl DiffLine {
    /// Return the line text without its terminator.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Context(t) | Self::Addition(t) | Self::Deletion(t) => t,
        }
    }

    /// Return `true` if this line exists in the old file (context or deletion).
    #[must_use]
    pub const fn in_old(&self) -> bool {
        matches!(self, Self::Context(_) | Self::Deletion(_))
    }

    /// Return `true` if this line exists in the new file (context or addition).
    #[must_use]
    pub const fn in_new(&self) -> bool {
        matches!(self, Self::Context(_) | Self::Addition(_))
    }
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(t) => write!(f, " {t}"),
            Self::Addition(t) => write!(f, "+{t}"),
            Self::Deletion(t) => write!(f, "-{t}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hunk
// ---------------------------------------------------------------------------

/// A contiguous block of diff lines with old/new line ranges.
///
/// Invariants (checked by [`Hunk::validate`]):
/// - `old_lines` equals the count of context + deletion entries;
/// - `new_lines` equals the count of context + addition entries;
/// - when any context exists, the first and last lines are context
///   (enables fuzzy matching);
/// - line numbers are 1-based.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// First line of the hunk in the old file (1-based).
    pub old_start: u32,
    /// Number of old-file lines the hunk covers.
    pub old_lines: u32,
    /// First line of the hunk in the new file (1-based).
    pub new_start: u32,
    /// Number of new-file lines the hunk covers.
    pub new_lines: u32,
    /// The hunk body, in listed order.
    pub lines: Vec<DiffLine>,
    /// The raw `@@ -a,b +c,d @@ …` header line.
    pub context: String,
    /// The old side's last line carried `\ No newline at end of file`.
    #[serde(default)]
    pub old_missing_newline: bool,
    /// The new side's last line carried `\ No newline at end of file`.
    #[serde(default)]
    pub new_missing_newline: bool,
}

impl Hunk {
    /// End of the hunk in old coordinates, exclusive (`old_start + old_lines`).
    #[must_use]
    pub const fn old_end(&self) -> u32 {
        self.old_start + self.old_lines
    }

    /// The sequence of lines expected in the old file (context + deletions).
    #[must_use]
    pub fn old_window(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.in_old())
            .map(DiffLine::text)
            .collect()
    }

    /// The sequence of lines this hunk produces (context + additions).
    #[must_use]
    pub fn new_window(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.in_new())
            .map(DiffLine::text)
            .collect()
    }

    /// Check the count and boundary-context invariants.
    ///
    /// # Errors
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        let old_count = self.lines.iter().filter(|l| l.in_old()).count() as u32;
        let new_count = self.lines.iter().filter(|l| l.in_new()).count() as u32;
        if old_count != self.old_lines {
            return Err(format!(
                "old_lines is {} but hunk has {} context+deletion lines",
                self.old_lines, old_count
            ));
        }
        if new_count != self.new_lines {
            return Err(format!(
                "new_lines is {} but hunk has {} context+addition lines",
                self.new_lines, new_count
            ));
        }
        let has_context = self.lines.iter().any(|l| matches!(l, DiffLine::Context(_)));
        if has_context {
            if !matches!(self.lines.first(), Some(DiffLine::Context(_))) {
                return Err("hunk with context must start with a context line".to_owned());
            }
            if !matches!(self.lines.last(), Some(DiffLine::Context(_))) {
                return Err("hunk with context must end with a context line".to_owned());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ModeChange
// ---------------------------------------------------------------------------

/// A file-mode transition carried by a patch.
///
/// Modes are POSIX file-mode integers as git records them
/// (e.g. `0o100644`, `0o100755`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ModeChange {
    /// The file is created by this patch.
    NewFile {
        /// Mode of the created file.
        mode: u32,
    },
    /// The file is deleted by this patch.
    DeletedFile {
        /// Mode the file had before deletion.
        mode: u32,
    },
    /// Only the mode bits change (or they change alongside content).
    Changed {
        /// Mode before the patch.
        old_mode: u32,
        /// Mode after the patch.
        new_mode: u32,
    },
}

impl ModeChange {
    /// Return `true` if this change creates the file.
    #[must_use]
    pub const fn is_new_file(&self) -> bool {
        matches!(self, Self::NewFile { .. })
    }

    /// Return `true` if this change deletes the file.
    #[must_use]
    pub const fn is_deletion(&self) -> bool {
        matches!(self, Self::DeletedFile { .. })
    }

    /// The mode the file has after the patch, or `None` for a deletion.
    #[must_use]
    pub const fn resulting_mode(&self) -> Option<u32> {
        match self {
            Self::NewFile { mode } => Some(*mode),
            Self::DeletedFile { .. } => None,
            Self::Changed { new_mode, .. } => Some(*new_mode),
        }
    }
}

impl fmt::Display for ModeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewFile { mode } => write!(f, "new file ({mode:o})"),
            Self::DeletedFile { mode } => write!(f, "deleted file ({mode:o})"),
            Self::Changed { old_mode, new_mode } => {
                write!(f, "mode {old_mode:o} → {new_mode:o}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Every change one commit makes to one file.
///
/// Invariant: `hunks` are ordered by `old_start` ascending and do not
/// overlap in the old coordinate space ([`Patch::validate`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Stable identifier, `<source_short>:<target_file>`.
    pub id: PatchId,
    /// The commit this patch was extracted from.
    pub source_commit: CommitId,
    /// Path of the file the patch applies to, relative to the repo root.
    pub target_file: PathBuf,
    /// Hunks ordered by `old_start`.
    pub hunks: Vec<Hunk>,
    /// Mode transition, if any.
    pub mode_change: Option<ModeChange>,
    /// Rename source, when the delta was detected as a rename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<PathBuf>,
    /// Binary delta — carried opaquely, not applicable as text.
    #[serde(default)]
    pub is_binary: bool,
}

impl Patch {
    /// Construct a patch, computing its id from source and target file.
    #[must_use]
    pub fn new(
        source_commit: CommitId,
        target_file: PathBuf,
        hunks: Vec<Hunk>,
        mode_change: Option<ModeChange>,
    ) -> Self {
        let id = PatchId::for_patch(&source_commit, &target_file);
        Self {
            id,
            source_commit,
            target_file,
            hunks,
            mode_change,
            renamed_from: None,
            is_binary: false,
        }
    }

    /// Return `true` if the patch deletes its target file.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.mode_change.is_some_and(|mc| mc.is_deletion())
    }

    /// Return `true` if the patch creates its target file.
    #[must_use]
    pub fn is_new_file(&self) -> bool {
        self.mode_change.is_some_and(|mc| mc.is_new_file())
    }

    /// Check per-hunk invariants plus hunk ordering and disjointness.
    ///
    /// # Errors
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        for (i, hunk) in self.hunks.iter().enumerate() {
            hunk.validate().map_err(|e| format!("hunk {i}: {e}"))?;
        }
        for pair in self.hunks.windows(2) {
            if pair[1].old_start < pair[0].old_start {
                return Err(format!(
                    "hunks out of order: old_start {} before {}",
                    pair[0].old_start, pair[1].old_start
                ));
            }
            if pair[1].old_start < pair[0].old_end() {
                return Err(format!(
                    "hunks overlap in old coordinates: [{}, {}) and [{}, {})",
                    pair[0].old_start,
                    pair[0].old_end(),
                    pair[1].old_start,
                    pair[1].old_end()
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn commit_id(c: char) -> CommitId {
        CommitId::new(&c.to_string().repeat(40)).unwrap()
    }

    fn ctx(t: &str) -> DiffLine {
        DiffLine::Context(t.to_owned())
    }
    fn add(t: &str) -> DiffLine {
        DiffLine::Addition(t.to_owned())
    }
    fn del(t: &str) -> DiffLine {
        DiffLine::Deletion(t.to_owned())
    }

    /// The classic one-line replacement hunk: `a / b→B / c`.
    fn sample_hunk() -> Hunk {
        Hunk {
            old_start: 1,
            old_lines: 3,
            new_start: 1,
            new_lines: 3,
            lines: vec![ctx("a"), del("b"), add("B"), ctx("c")],
            context: "@@ -1,3 +1,3 @@".to_owned(),
            old_missing_newline: false,
            new_missing_newline: false,
        }
    }

    // -- PatchId --

    #[test]
    fn patch_id_format() {
        let id = PatchId::for_patch(&commit_id('a'), Path::new("src/lib.rs"));
        assert_eq!(id.as_str(), "aaaaaaaa:src/lib.rs");
        assert_eq!(id.source_short(), "aaaaaaaa");
        assert_eq!(id.target_file(), "src/lib.rs");
    }

    #[test]
    fn patch_id_collision_rule() {
        // Same source + same file → same id; different file → different id.
        let a = PatchId::for_patch(&commit_id('a'), Path::new("x.rs"));
        let b = PatchId::for_patch(&commit_id('a'), Path::new("x.rs"));
        let c = PatchId::for_patch(&commit_id('a'), Path::new("y.rs"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn patch_id_target_file_with_colon_in_path() {
        // Split happens at the first colon only.
        let id = PatchId::from_raw("abcd1234:dir/we:ird.txt");
        assert_eq!(id.source_short(), "abcd1234");
        assert_eq!(id.target_file(), "dir/we:ird.txt");
    }

    #[test]
    fn patch_id_serde_is_plain_string() {
        let id = PatchId::from_raw("abcd1234:file.txt");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abcd1234:file.txt\"");
    }

    // -- DiffLine --

    #[test]
    fn diff_line_sides() {
        assert!(ctx("x").in_old() && ctx("x").in_new());
        assert!(!add("x").in_old() && add("x").in_new());
        assert!(del("x").in_old() && !del("x").in_new());
    }

    #[test]
    fn diff_line_display_uses_diff_prefixes() {
        assert_eq!(format!("{}", ctx("ab")), " ab");
        assert_eq!(format!("{}", add("ab")), "+ab");
        assert_eq!(format!("{}", del("ab")), "-ab");
    }

    #[test]
    fn diff_line_serde_tagged() {
        let json = serde_json::to_string(&add("hello")).unwrap();
        assert!(json.contains("\"kind\":\"addition\""));
        assert!(json.contains("\"text\":\"hello\""));
        let decoded: DiffLine = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, add("hello"));
    }

    // -- Hunk --

    #[test]
    fn hunk_windows() {
        let h = sample_hunk();
        assert_eq!(h.old_window(), vec!["a", "b", "c"]);
        assert_eq!(h.new_window(), vec!["a", "B", "c"]);
        assert_eq!(h.old_end(), 4);
    }

    #[test]
    fn hunk_validate_ok() {
        assert!(sample_hunk().validate().is_ok());
    }

    #[test]
    fn hunk_validate_rejects_bad_old_count() {
        let mut h = sample_hunk();
        h.old_lines = 5;
        let err = h.validate().unwrap_err();
        assert!(err.contains("old_lines"));
    }

    #[test]
    fn hunk_validate_rejects_bad_new_count() {
        let mut h = sample_hunk();
        h.new_lines = 0;
        let err = h.validate().unwrap_err();
        assert!(err.contains("new_lines"));
    }

    #[test]
    fn hunk_validate_requires_context_boundaries() {
        let h = Hunk {
            old_start: 1,
            old_lines: 2,
            new_start: 1,
            new_lines: 2,
            lines: vec![del("b"), ctx("a"), add("B")],
            context: "@@ -1,2 +1,2 @@".to_owned(),
            old_missing_newline: false,
            new_missing_newline: false,
        };
        let err = h.validate().unwrap_err();
        assert!(err.contains("start with a context line"));
    }

    #[test]
    fn hunk_without_context_is_valid() {
        // A pure-replacement hunk (whole-file rewrite) has no context lines.
        let h = Hunk {
            old_start: 1,
            old_lines: 1,
            new_start: 1,
            new_lines: 1,
            lines: vec![del("old"), add("new")],
            context: "@@ -1 +1 @@".to_owned(),
            old_missing_newline: false,
            new_missing_newline: false,
        };
        assert!(h.validate().is_ok());
    }

    #[test]
    fn hunk_serde_defaults_newline_flags() {
        let json = r#"{"old_start":1,"old_lines":1,"new_start":1,"new_lines":1,
            "lines":[{"kind":"context","text":"x"}],"context":"@@ -1 +1 @@"}"#;
        let h: Hunk = serde_json::from_str(json).unwrap();
        assert!(!h.old_missing_newline);
        assert!(!h.new_missing_newline);
    }

    // -- ModeChange --

    #[test]
    fn mode_change_predicates() {
        let new = ModeChange::NewFile { mode: 0o100644 };
        let gone = ModeChange::DeletedFile { mode: 0o100644 };
        let chmod = ModeChange::Changed {
            old_mode: 0o100644,
            new_mode: 0o100755,
        };
        assert!(new.is_new_file() && !new.is_deletion());
        assert!(gone.is_deletion() && !gone.is_new_file());
        assert_eq!(new.resulting_mode(), Some(0o100644));
        assert_eq!(gone.resulting_mode(), None);
        assert_eq!(chmod.resulting_mode(), Some(0o100755));
    }

    #[test]
    fn mode_change_serde_tagged() {
        let mc = ModeChange::Changed {
            old_mode: 0o100644,
            new_mode: 0o100755,
        };
        let json = serde_json::to_string(&mc).unwrap();
        assert!(json.contains("\"change\":\"changed\""));
        let decoded: ModeChange = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, mc);
    }

    #[test]
    fn mode_change_display_octal() {
        let mc = ModeChange::Changed {
            old_mode: 0o100644,
            new_mode: 0o100755,
        };
        assert_eq!(format!("{mc}"), "mode 100644 → 100755");
    }

    // -- Patch --

    #[test]
    fn patch_new_computes_id() {
        let p = Patch::new(
            commit_id('a'),
            PathBuf::from("file.txt"),
            vec![sample_hunk()],
            None,
        );
        assert_eq!(p.id.as_str(), "aaaaaaaa:file.txt");
        assert!(!p.is_binary);
        assert!(p.renamed_from.is_none());
    }

    #[test]
    fn patch_deletion_and_new_file_predicates() {
        let mut p = Patch::new(commit_id('a'), PathBuf::from("f"), vec![], None);
        assert!(!p.is_deletion() && !p.is_new_file());

        p.mode_change = Some(ModeChange::DeletedFile { mode: 0o100644 });
        assert!(p.is_deletion());

        p.mode_change = Some(ModeChange::NewFile { mode: 0o100644 });
        assert!(p.is_new_file());
    }

    #[test]
    fn patch_validate_ok() {
        let p = Patch::new(
            commit_id('a'),
            PathBuf::from("f"),
            vec![sample_hunk()],
            None,
        );
        assert!(p.validate().is_ok());
    }

    #[test]
    fn patch_validate_rejects_out_of_order_hunks() {
        let mut second = sample_hunk();
        second.old_start = 10;
        second.new_start = 10;
        let p = Patch::new(
            commit_id('a'),
            PathBuf::from("f"),
            vec![second, sample_hunk()],
            None,
        );
        assert!(p.validate().is_err());
    }

    #[test]
    fn patch_validate_rejects_overlapping_hunks() {
        let mut second = sample_hunk();
        second.old_start = 2; // first covers [1, 4)
        second.new_start = 2;
        let p = Patch::new(
            commit_id('a'),
            PathBuf::from("f"),
            vec![sample_hunk(), second],
            None,
        );
        let err = p.validate().unwrap_err();
        assert!(err.contains("overlap"));
    }

    #[test]
    fn patch_adjacent_hunks_are_valid() {
        // [1, 4) then [4, 7): touching but disjoint.
        let mut second = sample_hunk();
        second.old_start = 4;
        second.new_start = 4;
        let p = Patch::new(
            commit_id('a'),
            PathBuf::from("f"),
            vec![sample_hunk(), second],
            None,
        );
        assert!(p.validate().is_ok());
    }

    #[test]
    fn patch_serde_roundtrip() {
        let mut p = Patch::new(
            commit_id('b'),
            PathBuf::from("src/x.rs"),
            vec![sample_hunk()],
            Some(ModeChange::NewFile { mode: 0o100644 }),
        );
        p.renamed_from = Some(PathBuf::from("src/old.rs"));
        let json = serde_json::to_string(&p).unwrap();
        let decoded: Patch = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, p);
    }
}
