//! Deterministic in-memory Repository Port.
//!
//! Backs engine-isolated unit tests: commits, trees, and refs live in
//! plain maps, object ids come from a monotonic counter, and
//! `tree_to_tree_diff` renders real unified diff text (Myers via
//! imara-diff, three lines of context) so the full extract → apply path
//! runs without a git binary.
//!
//! Not a mock: the behavior matches the git CLI backend closely enough
//! that the engine cannot tell them apart through the port.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use imara_diff::sources::lines as lines_with_terminator;
use imara_diff::{Algorithm, Diff, InternedInput};

use crate::model::types::{CommitId, CommitInfo, TreeId};

use super::{RepoError, Repository, Signature, TreeEntry};

/// Context lines rendered around each change, matching git's default.
const CONTEXT: usize = 3;

/// Regular-file mode used by the convenience builders.
pub const DEFAULT_MODE: u32 = 0o100644;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

type Tree = BTreeMap<PathBuf, (u32, Vec<u8>)>;

#[derive(Clone, Debug)]
struct StoredCommit {
    info: CommitInfo,
    tree: TreeId,
}

#[derive(Debug, Default)]
struct Inner {
    commits: BTreeMap<CommitId, StoredCommit>,
    trees: BTreeMap<TreeId, Tree>,
    refs: BTreeMap<String, CommitId>,
    next_object: u64,
}

impl Inner {
    fn fresh_hex(&mut self) -> String {
        self.next_object += 1;
        format!("{:040x}", self.next_object)
    }

    fn tree_of(&self, commit: &CommitId) -> Result<&Tree, RepoError> {
        let stored = self.commits.get(commit).ok_or_else(|| RepoError::InvalidCommitId {
            id: commit.as_str().to_owned(),
        })?;
        self.trees
            .get(&stored.tree)
            .ok_or_else(|| RepoError::Malformed {
                context: "resolving commit tree".to_owned(),
                detail: format!("commit {} has no stored tree", commit.short()),
            })
    }
}

// ---------------------------------------------------------------------------
// InMemoryRepository
// ---------------------------------------------------------------------------

/// In-memory implementation of [`Repository`].
#[derive(Debug)]
pub struct InMemoryRepository {
    inner: RefCell<Inner>,
    root: PathBuf,
    branch: String,
    clean: bool,
}

impl InMemoryRepository {
    /// Create an empty repository with the given branch checked out.
    #[must_use]
    pub fn new(branch: &str) -> Self {
        Self {
            inner: RefCell::new(Inner::default()),
            root: PathBuf::from("/in-memory/repo"),
            branch: branch.to_owned(),
            clean: true,
        }
    }

    /// Mark the work tree dirty or clean (preflight testing).
    pub fn set_clean(&mut self, clean: bool) {
        self.clean = clean;
    }

    /// The branch ref name, e.g. `refs/heads/main`.
    #[must_use]
    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    // -- test builders ------------------------------------------------------

    /// Commit tree mutations on top of the current head and advance the
    /// branch. Returns the new commit's id.
    pub fn commit_entries(&mut self, message: &str, entries: Vec<TreeEntry>) -> CommitId {
        let parents: Vec<CommitId> = self.head().ok().into_iter().collect();
        let tree = self
            .write_tree(parents.first(), &entries)
            .expect("in-memory write_tree cannot fail");
        let author = self.builder_signature();
        let id = self
            .create_commit(&parents, &tree, &author, &author, message)
            .expect("in-memory create_commit cannot fail");
        let branch_ref = self.branch_ref();
        self.inner.get_mut().refs.insert(branch_ref, id.clone());
        id
    }

    /// Commit file contents (text, default mode) and advance the branch.
    pub fn commit_files(&mut self, message: &str, files: &[(&str, &str)]) -> CommitId {
        let entries = files
            .iter()
            .map(|(path, content)| TreeEntry::write(*path, DEFAULT_MODE, content.as_bytes().to_vec()))
            .collect();
        self.commit_entries(message, entries)
    }

    /// Commit file removals and advance the branch.
    pub fn remove_files(&mut self, message: &str, paths: &[&str]) -> CommitId {
        let entries = paths.iter().map(|p| TreeEntry::remove(*p)).collect();
        self.commit_entries(message, entries)
    }

    fn builder_signature(&self) -> Signature {
        // Deterministic, monotonically increasing author times keep the
        // graph ordering stable across runs.
        let n = self.inner.borrow().next_object;
        Signature {
            name: "Test Author".to_owned(),
            email: "author@example.com".to_owned(),
            when: Utc.timestamp_opt(1_700_000_000 + n as i64, 0).single().unwrap(),
        }
    }

    fn files_changed(old: Option<&Tree>, new: &Tree) -> Vec<PathBuf> {
        let empty = Tree::new();
        let old = old.unwrap_or(&empty);
        let mut changed: Vec<PathBuf> = Vec::new();
        for (path, entry) in new {
            if old.get(path) != Some(entry) {
                changed.push(path.clone());
            }
        }
        for path in old.keys() {
            if !new.contains_key(path) {
                changed.push(path.clone());
            }
        }
        changed.sort();
        changed
    }
}

impl Repository for InMemoryRepository {
    fn path(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> Result<CommitId, RepoError> {
        self.resolve_ref(&self.branch_ref())?
            .ok_or_else(|| RepoError::Malformed {
                context: "resolving HEAD".to_owned(),
                detail: format!("branch '{}' has no commits", self.branch),
            })
    }

    fn current_branch(&self) -> Result<String, RepoError> {
        Ok(self.branch.clone())
    }

    fn is_clean(&self) -> Result<bool, RepoError> {
        Ok(self.clean)
    }

    fn commit_info(&self, id: &CommitId) -> Result<CommitInfo, RepoError> {
        let inner = self.inner.borrow();
        inner
            .commits
            .get(id)
            .map(|c| c.info.clone())
            .ok_or_else(|| RepoError::InvalidCommitId {
                id: id.as_str().to_owned(),
            })
    }

    fn walk_history(&self, start: &CommitId, limit: usize) -> Result<Vec<CommitInfo>, RepoError> {
        let mut out = Vec::new();
        let mut cursor = Some(start.clone());
        while let Some(id) = cursor {
            if out.len() >= limit {
                break;
            }
            let info = self.commit_info(&id)?;
            cursor = info.first_parent().cloned();
            out.push(info);
        }
        Ok(out)
    }

    fn read_blob(&self, commit: &CommitId, path: &Path) -> Result<Option<Vec<u8>>, RepoError> {
        let inner = self.inner.borrow();
        let tree = inner.tree_of(commit)?;
        Ok(tree.get(path).map(|(_, content)| content.clone()))
    }

    fn read_mode(&self, commit: &CommitId, path: &Path) -> Result<Option<u32>, RepoError> {
        let inner = self.inner.borrow();
        let tree = inner.tree_of(commit)?;
        Ok(tree.get(path).map(|(mode, _)| *mode))
    }

    fn tree_to_tree_diff(
        &self,
        from: Option<&CommitId>,
        to: &CommitId,
    ) -> Result<String, RepoError> {
        let inner = self.inner.borrow();
        let empty = Tree::new();
        let old_tree = match from {
            Some(id) => inner.tree_of(id)?,
            None => &empty,
        };
        let new_tree = inner.tree_of(to)?;

        let mut paths: Vec<&PathBuf> = old_tree.keys().chain(new_tree.keys()).collect();
        paths.sort();
        paths.dedup();

        let mut out = String::new();
        for path in paths {
            let old = old_tree.get(path);
            let new = new_tree.get(path);
            if old == new {
                continue;
            }
            render_file_diff(&mut out, path, old, new);
        }
        Ok(out)
    }

    fn write_tree(
        &self,
        base: Option<&CommitId>,
        entries: &[TreeEntry],
    ) -> Result<TreeId, RepoError> {
        let mut inner = self.inner.borrow_mut();
        let mut tree = match base {
            Some(id) => inner.tree_of(id)?.clone(),
            None => Tree::new(),
        };
        for entry in entries {
            match &entry.content {
                Some(content) => {
                    tree.insert(entry.path.clone(), (entry.mode, content.clone()));
                }
                None => {
                    tree.remove(&entry.path);
                }
            }
        }
        let hex = inner.fresh_hex();
        let id = TreeId::new(&hex).expect("counter hex is a valid oid");
        inner.trees.insert(id.clone(), tree);
        Ok(id)
    }

    fn commit_tree_id(&self, commit: &CommitId) -> Result<TreeId, RepoError> {
        let inner = self.inner.borrow();
        inner
            .commits
            .get(commit)
            .map(|c| c.tree.clone())
            .ok_or_else(|| RepoError::InvalidCommitId {
                id: commit.as_str().to_owned(),
            })
    }

    fn create_commit(
        &self,
        parents: &[CommitId],
        tree: &TreeId,
        author: &Signature,
        _committer: &Signature,
        message: &str,
    ) -> Result<CommitId, RepoError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.trees.contains_key(tree) {
            return Err(RepoError::InvalidOid {
                context: "creating commit".to_owned(),
                raw: tree.as_str().to_owned(),
            });
        }
        let files_changed = {
            let new_tree = &inner.trees[tree];
            let parent_tree = parents
                .first()
                .and_then(|p| inner.commits.get(p))
                .and_then(|c| inner.trees.get(&c.tree));
            Self::files_changed(parent_tree, new_tree)
        };
        let hex = inner.fresh_hex();
        let id = CommitId::new(&hex).expect("counter hex is a valid oid");
        let info = CommitInfo {
            id: id.clone(),
            message: message.to_owned(),
            author: author.name.clone(),
            email: author.email.clone(),
            timestamp: author.when,
            parent_ids: parents.to_vec(),
            files_changed,
        };
        inner.commits.insert(
            id.clone(),
            StoredCommit {
                info,
                tree: tree.clone(),
            },
        );
        Ok(id)
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<CommitId>, RepoError> {
        Ok(self.inner.borrow().refs.get(name).cloned())
    }

    fn create_ref(&self, name: &str, commit: &CommitId) -> Result<(), RepoError> {
        let mut inner = self.inner.borrow_mut();
        if inner.refs.contains_key(name) {
            return Err(RepoError::Malformed {
                context: "creating ref".to_owned(),
                detail: format!("ref '{name}' already exists"),
            });
        }
        inner.refs.insert(name.to_owned(), commit.clone());
        Ok(())
    }

    fn update_ref(
        &self,
        name: &str,
        expected_old: &CommitId,
        new: &CommitId,
    ) -> Result<(), RepoError> {
        let mut inner = self.inner.borrow_mut();
        match inner.refs.get(name) {
            Some(current) if current == expected_old => {
                inner.refs.insert(name.to_owned(), new.clone());
                Ok(())
            }
            _ => Err(RepoError::RefMoved {
                ref_name: name.to_owned(),
            }),
        }
    }

    fn delete_ref(&self, name: &str) -> Result<(), RepoError> {
        self.inner.borrow_mut().refs.remove(name);
        Ok(())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, CommitId)>, RepoError> {
        Ok(self
            .inner
            .borrow()
            .refs
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, id)| (name.clone(), id.clone()))
            .collect())
    }

    fn default_signature(&self) -> Result<Signature, RepoError> {
        Ok(Signature::now("Patchdance", "patchdance@example.com"))
    }
}

// ---------------------------------------------------------------------------
// Unified diff rendering
// ---------------------------------------------------------------------------

fn render_file_diff(
    out: &mut String,
    path: &Path,
    old: Option<&(u32, Vec<u8>)>,
    new: Option<&(u32, Vec<u8>)>,
) {
    let p = path.display();
    out.push_str(&format!("diff --git a/{p} b/{p}\n"));

    let old_text = old.map(|(_, c)| String::from_utf8_lossy(c).into_owned());
    let new_text = new.map(|(_, c)| String::from_utf8_lossy(c).into_owned());
    let binary = old.is_some_and(|(_, c)| c.contains(&0)) || new.is_some_and(|(_, c)| c.contains(&0));

    match (old, new) {
        (None, Some((mode, _))) => {
            out.push_str(&format!("new file mode {mode:o}\n"));
        }
        (Some((mode, _)), None) => {
            out.push_str(&format!("deleted file mode {mode:o}\n"));
        }
        (Some((old_mode, _)), Some((new_mode, _))) if old_mode != new_mode => {
            out.push_str(&format!("old mode {old_mode:o}\n"));
            out.push_str(&format!("new mode {new_mode:o}\n"));
        }
        _ => {}
    }

    if binary {
        out.push_str(&format!("Binary files a/{p} and b/{p} differ\n"));
        return;
    }

    let old_text = old_text.unwrap_or_default();
    let new_text = new_text.unwrap_or_default();
    if old_text == new_text {
        // Mode-only change: headers already rendered.
        return;
    }

    out.push_str(&format!(
        "--- {}\n",
        if old.is_some() { format!("a/{p}") } else { "/dev/null".to_owned() }
    ));
    out.push_str(&format!(
        "+++ {}\n",
        if new.is_some() { format!("b/{p}") } else { "/dev/null".to_owned() }
    ));
    render_hunks(out, &old_text, &new_text);
}

/// Split into lines, each keeping its terminator (final line may lack one).
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

/// One changed region in line indices.
struct RawHunk {
    old_start: usize,
    old_end: usize,
    new_start: usize,
    new_end: usize,
}

fn render_hunks(out: &mut String, old_text: &str, new_text: &str) {
    let old_lines = split_keep_terminators(old_text);
    let new_lines = split_keep_terminators(new_text);

    // Tokenize with terminators so a trailing-newline-only change is a
    // real edit, not two equal tokens.
    let input = InternedInput::new(
        lines_with_terminator(old_text),
        lines_with_terminator(new_text),
    );
    let mut diff = Diff::compute(Algorithm::Myers, &input);
    diff.postprocess_lines(&input);

    let raws: Vec<RawHunk> = diff
        .hunks()
        .map(|h| RawHunk {
            old_start: h.before.start as usize,
            old_end: h.before.end as usize,
            new_start: h.after.start as usize,
            new_end: h.after.end as usize,
        })
        .collect();
    if raws.is_empty() {
        return;
    }

    // Group raw hunks whose 3-line context regions touch.
    let mut groups: Vec<Vec<&RawHunk>> = Vec::new();
    for raw in &raws {
        let belongs = groups.last().is_some_and(|g: &Vec<&RawHunk>| {
            raw.old_start.saturating_sub(CONTEXT) <= g.last().unwrap().old_end + CONTEXT
        });
        if belongs {
            groups.last_mut().unwrap().push(raw);
        } else {
            groups.push(vec![raw]);
        }
    }

    for group in &groups {
        let first = group.first().unwrap();
        let last = group.last().unwrap();

        let ctx_before = first.old_start.min(CONTEXT);
        let h_old_start = first.old_start - ctx_before;
        let h_old_end = (last.old_end + CONTEXT).min(old_lines.len());
        let h_new_start = first.new_start - ctx_before;
        let h_new_end = (last.new_end + CONTEXT).min(new_lines.len());

        let old_count = h_old_end - h_old_start;
        let new_count = h_new_end - h_new_start;
        let old_disp = if old_count == 0 { h_old_start } else { h_old_start + 1 };
        let new_disp = if new_count == 0 { h_new_start } else { h_new_start + 1 };
        out.push_str(&format!(
            "@@ -{old_disp},{old_count} +{new_disp},{new_count} @@\n"
        ));

        let mut cursor = h_old_start;
        for raw in group {
            for i in cursor..raw.old_start {
                push_line(out, ' ', old_lines[i], i + 1 == old_lines.len());
            }
            for i in raw.old_start..raw.old_end {
                push_line(out, '-', old_lines[i], i + 1 == old_lines.len());
            }
            for i in raw.new_start..raw.new_end {
                push_line(out, '+', new_lines[i], i + 1 == new_lines.len());
            }
            cursor = raw.old_end;
        }
        for i in cursor..h_old_end {
            push_line(out, ' ', old_lines[i], i + 1 == old_lines.len());
        }
    }
}

fn push_line(out: &mut String, prefix: char, line: &str, is_last: bool) {
    out.push(prefix);
    match line.strip_suffix('\n') {
        Some(body) => {
            out.push_str(body);
            out.push('\n');
        }
        None => {
            out.push_str(line);
            out.push('\n');
            if is_last {
                out.push_str("\\ No newline at end of file\n");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_repo_has_no_head() {
        let repo = InMemoryRepository::new("main");
        assert!(repo.head().is_err());
        assert_eq!(repo.current_branch().unwrap(), "main");
        assert!(repo.is_clean().unwrap());
    }

    #[test]
    fn commit_files_advances_head() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("first", &[("a.txt", "one\n")]);
        assert_eq!(repo.head().unwrap(), c1);

        let c2 = repo.commit_files("second", &[("a.txt", "two\n")]);
        assert_eq!(repo.head().unwrap(), c2);

        let info = repo.commit_info(&c2).unwrap();
        assert_eq!(info.parent_ids, vec![c1]);
        assert_eq!(info.message, "second");
        assert_eq!(info.files_changed, vec![PathBuf::from("a.txt")]);
    }

    #[test]
    fn read_blob_and_mode() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("c", &[("dir/f.txt", "content\n")]);

        let blob = repo.read_blob(&c1, Path::new("dir/f.txt")).unwrap().unwrap();
        assert_eq!(blob, b"content\n");
        assert_eq!(
            repo.read_mode(&c1, Path::new("dir/f.txt")).unwrap(),
            Some(DEFAULT_MODE)
        );
        assert!(repo.read_blob(&c1, Path::new("nope")).unwrap().is_none());
    }

    #[test]
    fn walk_history_newest_first() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("1", &[("f", "1\n")]);
        let c2 = repo.commit_files("2", &[("f", "2\n")]);
        let c3 = repo.commit_files("3", &[("f", "3\n")]);

        let walk = repo.walk_history(&c3, 10).unwrap();
        let ids: Vec<_> = walk.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![c3, c2, c1]);

        let limited = repo.walk_history(&repo.head().unwrap(), 2).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn diff_modification_renders_unified() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("c1", &[("f.txt", "a\nb\nc\n")]);
        let c2 = repo.commit_files("c2", &[("f.txt", "a\nB\nc\n")]);

        let diff = repo.tree_to_tree_diff(Some(&c1), &c2).unwrap();
        assert!(diff.contains("diff --git a/f.txt b/f.txt"));
        assert!(diff.contains("--- a/f.txt"));
        assert!(diff.contains("+++ b/f.txt"));
        assert!(diff.contains("@@ -1,3 +1,3 @@"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+B\n"));
    }

    #[test]
    fn diff_new_file_against_empty_tree() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("root", &[("new.txt", "x\ny\n")]);

        let diff = repo.tree_to_tree_diff(None, &c1).unwrap();
        assert!(diff.contains("new file mode 100644"));
        assert!(diff.contains("--- /dev/null"));
        assert!(diff.contains("@@ -0,0 +1,2 @@"));
        assert!(diff.contains("+x\n+y\n"));
    }

    #[test]
    fn diff_deletion() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("c1", &[("gone.txt", "bye\n")]);
        let c2 = repo.remove_files("c2", &["gone.txt"]);

        let diff = repo.tree_to_tree_diff(Some(&c1), &c2).unwrap();
        assert!(diff.contains("deleted file mode 100644"));
        assert!(diff.contains("+++ /dev/null"));
        assert!(diff.contains("-bye\n"));
    }

    #[test]
    fn diff_missing_trailing_newline_has_sentinel() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("c1", &[("f", "a\nb")]);
        let c2 = repo.commit_files("c2", &[("f", "a\nB")]);

        let diff = repo.tree_to_tree_diff(Some(&c1), &c2).unwrap();
        let sentinels = diff.matches("\\ No newline at end of file").count();
        assert_eq!(sentinels, 2, "one per side:\n{diff}");
    }

    #[test]
    fn diff_distant_changes_make_separate_hunks() {
        let body: String = (1..=20).map(|n| format!("line{n}\n")).collect();
        let changed = body.replace("line2\n", "LINE2\n").replace("line18\n", "LINE18\n");

        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("c1", &[("f", &body)]);
        let c2 = repo.commit_files("c2", &[("f", &changed)]);

        let diff = repo.tree_to_tree_diff(Some(&c1), &c2).unwrap();
        assert_eq!(diff.matches("@@ -").count(), 2, "{diff}");
    }

    #[test]
    fn diff_close_changes_share_a_hunk() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("c1", &[("f", "a\nb\nc\nd\ne\n")]);
        let c2 = repo.commit_files("c2", &[("f", "A\nb\nc\nd\nE\n")]);

        let diff = repo.tree_to_tree_diff(Some(&c1), &c2).unwrap();
        assert_eq!(diff.matches("@@ -").count(), 1, "{diff}");
    }

    #[test]
    fn diff_binary_content() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_entries(
            "c1",
            vec![TreeEntry::write("blob.bin", DEFAULT_MODE, vec![0, 159, 146, 150])],
        );
        let c2 = repo.commit_entries(
            "c2",
            vec![TreeEntry::write("blob.bin", DEFAULT_MODE, vec![0, 1, 2, 3])],
        );

        let diff = repo.tree_to_tree_diff(Some(&c1), &c2).unwrap();
        assert!(diff.contains("Binary files a/blob.bin and b/blob.bin differ"));
        assert!(!diff.contains("@@"));
    }

    #[test]
    fn refs_cas_semantics() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("1", &[("f", "1\n")]);
        let c2 = repo.commit_files("2", &[("f", "2\n")]);

        repo.create_ref("refs/patchdance/backup/op-000000000001", &c1).unwrap();
        assert!(repo.create_ref("refs/patchdance/backup/op-000000000001", &c1).is_err());

        // CAS succeeds with the right old value…
        repo.update_ref(&repo.branch_ref(), &c2, &c1).unwrap();
        // …and fails with a stale one.
        let err = repo.update_ref(&repo.branch_ref(), &c2, &c1).unwrap_err();
        assert!(matches!(err, RepoError::RefMoved { .. }));

        let listed = repo.list_refs("refs/patchdance/").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1, c1);

        repo.delete_ref("refs/patchdance/backup/op-000000000001").unwrap();
        repo.delete_ref("refs/patchdance/backup/op-000000000001").unwrap();
        assert!(repo.list_refs("refs/patchdance/").unwrap().is_empty());
    }

    #[test]
    fn write_tree_and_commit_roundtrip() {
        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("base", &[("keep.txt", "keep\n"), ("edit.txt", "old\n")]);

        let tree = repo
            .write_tree(
                Some(&c1),
                &[
                    TreeEntry::write("edit.txt", DEFAULT_MODE, b"new\n".to_vec()),
                    TreeEntry::remove("keep.txt"),
                    TreeEntry::write("added.txt", DEFAULT_MODE, b"hi\n".to_vec()),
                ],
            )
            .unwrap();
        let sig = repo.default_signature().unwrap();
        let c2 = repo
            .create_commit(&[c1.clone()], &tree, &sig, &sig, "rewritten")
            .unwrap();

        assert_eq!(
            repo.read_blob(&c2, Path::new("edit.txt")).unwrap().unwrap(),
            b"new\n"
        );
        assert!(repo.read_blob(&c2, Path::new("keep.txt")).unwrap().is_none());
        assert_eq!(
            repo.read_blob(&c2, Path::new("added.txt")).unwrap().unwrap(),
            b"hi\n"
        );
        assert_eq!(repo.commit_tree_id(&c2).unwrap(), tree);
        // Builder refs untouched: create_commit moves no ref.
        assert_eq!(repo.head().unwrap(), c1);
    }

    #[test]
    fn extracted_diff_round_trips_through_apply() {
        use crate::diff::{apply_patch, parse_unified_diff};

        let old_body = "fn main() {\n    println!(\"one\");\n}\n";
        let new_body = "fn main() {\n    println!(\"two\");\n    println!(\"three\");\n}\n";

        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("c1", &[("main.rs", old_body)]);
        let c2 = repo.commit_files("c2", &[("main.rs", new_body)]);

        let diff = repo.tree_to_tree_diff(Some(&c1), &c2).unwrap();
        let patches = parse_unified_diff(&diff, &c2).unwrap();
        assert_eq!(patches.len(), 1);

        let applied = apply_patch(old_body, &patches[0]).unwrap();
        assert_eq!(applied, new_body);
    }

    #[test]
    fn round_trip_without_trailing_newline() {
        use crate::diff::{apply_patch, parse_unified_diff};

        let old_body = "a\nb\nc";
        let new_body = "a\nB\nc";

        let mut repo = InMemoryRepository::new("main");
        let c1 = repo.commit_files("c1", &[("f", old_body)]);
        let c2 = repo.commit_files("c2", &[("f", new_body)]);

        let diff = repo.tree_to_tree_diff(Some(&c1), &c2).unwrap();
        let patches = parse_unified_diff(&diff, &c2).unwrap();
        let applied = apply_patch(old_body, &patches[0]).unwrap();
        assert_eq!(applied, new_body);
    }
}
