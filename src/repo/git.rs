//! Subprocess-git implementation of the Repository Port.
//!
//! Every operation shells out to `git` plumbing in the repository root:
//! `rev-parse`, `status --porcelain`, `show`, `rev-list`, `cat-file`,
//! `ls-tree`, `diff-tree`, `hash-object`, and — for tree writes — a
//! temporary index driven by `read-tree` / `update-index` / `write-tree`.
//! Ref updates go through `git update-ref`, whose internal locking makes
//! the compare-and-swap atomic.

use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{TimeZone, Utc};

use crate::model::types::{CommitId, CommitInfo, TreeId};

use super::{RepoError, Repository, Signature, TreeEntry};

/// The well-known id of git's empty tree (SHA-1 repositories).
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// The all-zero oid `git update-ref` interprets as "must not exist".
const ZERO_OID: &str = "0000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// GitCliRepository
// ---------------------------------------------------------------------------

/// A repository driven through the `git` binary.
#[derive(Debug)]
pub struct GitCliRepository {
    root: PathBuf,
    git_dir: PathBuf,
}

impl GitCliRepository {
    /// Open the repository containing `path`.
    ///
    /// # Errors
    /// [`RepoError::NotFound`] when `path` is not inside a git repository.
    pub fn open(path: &Path) -> Result<Self, RepoError> {
        let out = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(path)
            .output()?;
        if !out.status.success() {
            return Err(RepoError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let root = PathBuf::from(String::from_utf8_lossy(&out.stdout).trim_end());

        let out = Command::new("git")
            .args(["rev-parse", "--absolute-git-dir"])
            .current_dir(&root)
            .output()?;
        if !out.status.success() {
            return Err(RepoError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let git_dir = PathBuf::from(String::from_utf8_lossy(&out.stdout).trim_end());

        Ok(Self { root, git_dir })
    }

    // -- subprocess helpers -------------------------------------------------

    fn run(&self, args: &[&str], envs: &[(&str, String)]) -> Result<Vec<u8>, RepoError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.root);
        for (key, value) in envs {
            cmd.env(key, value);
        }
        let out = cmd.output()?;
        if out.status.success() {
            Ok(out.stdout)
        } else {
            Err(RepoError::GitCommand {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
                exit_code: out.status.code(),
            })
        }
    }

    fn git(&self, args: &[&str]) -> Result<String, RepoError> {
        let stdout = self.run(args, &[])?;
        Ok(String::from_utf8_lossy(&stdout).trim_end().to_owned())
    }

    fn git_with_stdin(
        &self,
        args: &[&str],
        envs: &[(&str, String)],
        stdin: &[u8],
    ) -> Result<String, RepoError> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in envs {
            cmd.env(key, value);
        }
        let mut child = cmd.spawn()?;
        child
            .stdin
            .as_mut()
            .expect("stdin was piped")
            .write_all(stdin)?;
        let out = child.wait_with_output()?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_owned())
        } else {
            Err(RepoError::GitCommand {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
                exit_code: out.status.code(),
            })
        }
    }

    fn parse_commit_id(&self, raw: &str, context: &str) -> Result<CommitId, RepoError> {
        CommitId::new(raw.trim()).map_err(|_| RepoError::InvalidOid {
            context: context.to_owned(),
            raw: raw.trim().to_owned(),
        })
    }

    /// Resolve the symbolic branch ref name for HEAD, e.g. `refs/heads/main`.
    pub fn head_ref_name(&self) -> Result<String, RepoError> {
        self.git(&["symbolic-ref", "HEAD"])
    }
}

impl Repository for GitCliRepository {
    fn path(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> Result<CommitId, RepoError> {
        let raw = self.git(&["rev-parse", "HEAD"])?;
        self.parse_commit_id(&raw, "resolving HEAD")
    }

    fn current_branch(&self) -> Result<String, RepoError> {
        // Prints "HEAD" when detached, matching the port contract.
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn is_clean(&self) -> Result<bool, RepoError> {
        let status = self.git(&["status", "--porcelain"])?;
        Ok(status.is_empty())
    }

    fn commit_info(&self, id: &CommitId) -> Result<CommitInfo, RepoError> {
        let format = "%H%x00%an%x00%ae%x00%at%x00%P%x00%B";
        let raw = self
            .git(&["show", "-s", &format!("--format={format}"), id.as_str()])
            .map_err(|e| match e {
                RepoError::GitCommand { stderr, .. }
                    if stderr.contains("unknown revision") || stderr.contains("bad revision") =>
                {
                    RepoError::InvalidCommitId {
                        id: id.as_str().to_owned(),
                    }
                }
                other => other,
            })?;

        let fields: Vec<&str> = raw.splitn(6, '\0').collect();
        let [hash, author, email, at, parents, message] = fields.as_slice() else {
            return Err(RepoError::Malformed {
                context: "parsing commit metadata".to_owned(),
                detail: format!("expected 6 NUL-separated fields, got {}", fields.len()),
            });
        };

        let commit_id = self.parse_commit_id(hash, "parsing commit metadata")?;
        let seconds: i64 = at.trim().parse().map_err(|_| RepoError::Malformed {
            context: "parsing commit metadata".to_owned(),
            detail: format!("bad author timestamp: {at:?}"),
        })?;
        let timestamp = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| RepoError::Malformed {
                context: "parsing commit metadata".to_owned(),
                detail: format!("timestamp out of range: {seconds}"),
            })?;

        let parent_ids = parents
            .split_whitespace()
            .map(|p| self.parse_commit_id(p, "parsing commit parents"))
            .collect::<Result<Vec<_>, _>>()?;

        let files_changed = if let Some(parent) = parent_ids.first() {
            let listing = self.git(&[
                "diff-tree",
                "--no-commit-id",
                "--name-only",
                "-r",
                parent.as_str(),
                commit_id.as_str(),
            ])?;
            listing.lines().map(PathBuf::from).collect()
        } else {
            let listing = self.git(&["ls-tree", "-r", "--name-only", commit_id.as_str()])?;
            listing.lines().map(PathBuf::from).collect()
        };

        Ok(CommitInfo {
            id: commit_id,
            message: message.trim_end_matches('\n').to_owned(),
            author: (*author).to_owned(),
            email: (*email).to_owned(),
            timestamp,
            parent_ids,
            files_changed,
        })
    }

    fn walk_history(&self, start: &CommitId, limit: usize) -> Result<Vec<CommitInfo>, RepoError> {
        let max = limit.to_string();
        let listing = self.git(&[
            "rev-list",
            "--first-parent",
            "--max-count",
            &max,
            start.as_str(),
        ])?;
        listing
            .lines()
            .map(|line| {
                let id = self.parse_commit_id(line, "walking history")?;
                self.commit_info(&id)
            })
            .collect()
    }

    fn read_blob(&self, commit: &CommitId, path: &Path) -> Result<Option<Vec<u8>>, RepoError> {
        let spec = format!("{}:{}", commit.as_str(), path.display());
        match self.run(&["cat-file", "-p", &spec], &[]) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(RepoError::GitCommand { stderr, .. })
                if stderr.contains("does not exist")
                    || stderr.contains("Not a valid object name")
                    || stderr.contains("exists on disk, but not in") =>
            {
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    fn read_mode(&self, commit: &CommitId, path: &Path) -> Result<Option<u32>, RepoError> {
        let spec = path.display().to_string();
        let listing = self.git(&["ls-tree", commit.as_str(), "--", &spec])?;
        let Some(line) = listing.lines().next() else {
            return Ok(None);
        };
        // "<mode> <type> <oid>\t<path>"
        let mode_str = line.split_whitespace().next().unwrap_or("");
        let mode = u32::from_str_radix(mode_str, 8).map_err(|_| RepoError::Malformed {
            context: "parsing ls-tree output".to_owned(),
            detail: format!("bad mode in line: {line:?}"),
        })?;
        Ok(Some(mode))
    }

    fn tree_to_tree_diff(
        &self,
        from: Option<&CommitId>,
        to: &CommitId,
    ) -> Result<String, RepoError> {
        let from_spec = from.map_or(EMPTY_TREE, CommitId::as_str);
        let stdout = self.run(
            &[
                "diff-tree",
                "-p",
                "-r",
                "--no-color",
                "--full-index",
                "--find-renames",
                from_spec,
                to.as_str(),
            ],
            &[],
        )?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn write_tree(
        &self,
        base: Option<&CommitId>,
        entries: &[TreeEntry],
    ) -> Result<TreeId, RepoError> {
        let tmp_dir = self.git_dir.join("patchdance");
        std::fs::create_dir_all(&tmp_dir)?;
        let index_path = tmp_dir.join(format!("tmp-index-{:016x}", rand::random::<u64>()));
        let index_env = [(
            "GIT_INDEX_FILE",
            index_path.display().to_string(),
        )];

        let result = (|| {
            match base {
                Some(commit) => self.run(&["read-tree", commit.as_str()], &index_env)?,
                None => self.run(&["read-tree", "--empty"], &index_env)?,
            };

            for entry in entries {
                let path = entry.path.display().to_string();
                match &entry.content {
                    Some(content) => {
                        let oid =
                            self.git_with_stdin(&["hash-object", "-w", "--stdin"], &[], content)?;
                        let cacheinfo = format!("{:o},{},{}", entry.mode, oid.trim(), path);
                        self.run(
                            &["update-index", "--add", "--cacheinfo", &cacheinfo],
                            &index_env,
                        )?;
                    }
                    None => {
                        self.run(&["update-index", "--force-remove", "--", &path], &index_env)?;
                    }
                }
            }

            let raw = self.run(&["write-tree"], &index_env)?;
            let raw = String::from_utf8_lossy(&raw).trim_end().to_owned();
            TreeId::new(&raw).map_err(|_| RepoError::InvalidOid {
                context: "writing tree".to_owned(),
                raw,
            })
        })();

        let _ = std::fs::remove_file(&index_path);
        result
    }

    fn commit_tree_id(&self, commit: &CommitId) -> Result<TreeId, RepoError> {
        let raw = self.git(&["rev-parse", &format!("{}^{{tree}}", commit.as_str())])?;
        TreeId::new(&raw).map_err(|_| RepoError::InvalidOid {
            context: "resolving commit tree".to_owned(),
            raw,
        })
    }

    fn create_commit(
        &self,
        parents: &[CommitId],
        tree: &TreeId,
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<CommitId, RepoError> {
        let mut args: Vec<String> = vec!["commit-tree".to_owned(), tree.as_str().to_owned()];
        for parent in parents {
            args.push("-p".to_owned());
            args.push(parent.as_str().to_owned());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let envs = [
            ("GIT_AUTHOR_NAME", author.name.clone()),
            ("GIT_AUTHOR_EMAIL", author.email.clone()),
            ("GIT_AUTHOR_DATE", format!("{} +0000", author.when.timestamp())),
            ("GIT_COMMITTER_NAME", committer.name.clone()),
            ("GIT_COMMITTER_EMAIL", committer.email.clone()),
            (
                "GIT_COMMITTER_DATE",
                format!("{} +0000", committer.when.timestamp()),
            ),
        ];

        let raw = self.git_with_stdin(&arg_refs, &envs, message.as_bytes())?;
        self.parse_commit_id(&raw, "creating commit")
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<CommitId>, RepoError> {
        match self.git(&["rev-parse", "--verify", "--quiet", name]) {
            Ok(raw) if !raw.is_empty() => Ok(Some(self.parse_commit_id(&raw, "resolving ref")?)),
            Ok(_) => Ok(None),
            // --quiet exits 1 with no stderr when the ref is absent.
            Err(RepoError::GitCommand { stderr, exit_code: Some(1), .. }) if stderr.is_empty() => {
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    fn create_ref(&self, name: &str, commit: &CommitId) -> Result<(), RepoError> {
        // Old value of all-zeros means "succeed only if the ref is absent".
        self.run(&["update-ref", name, commit.as_str(), ZERO_OID], &[])?;
        Ok(())
    }

    fn update_ref(
        &self,
        name: &str,
        expected_old: &CommitId,
        new: &CommitId,
    ) -> Result<(), RepoError> {
        match self.run(
            &["update-ref", name, new.as_str(), expected_old.as_str()],
            &[],
        ) {
            Ok(_) => Ok(()),
            Err(RepoError::GitCommand { stderr, .. })
                if stderr.contains("cannot lock ref")
                    || stderr.contains("is at")
                    || stderr.contains("but expected") =>
            {
                Err(RepoError::RefMoved {
                    ref_name: name.to_owned(),
                })
            }
            Err(other) => Err(other),
        }
    }

    fn delete_ref(&self, name: &str) -> Result<(), RepoError> {
        match self.run(&["update-ref", "-d", name], &[]) {
            Ok(_) => Ok(()),
            // Deleting an absent ref is a no-op, matching the port contract.
            Err(RepoError::GitCommand { stderr, .. })
                if stderr.contains("not found") || stderr.contains("unable to resolve") =>
            {
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, CommitId)>, RepoError> {
        let listing = self.git(&[
            "for-each-ref",
            "--format=%(refname) %(objectname)",
            prefix,
        ])?;
        listing
            .lines()
            .map(|line| {
                let (name, oid) = line.rsplit_once(' ').ok_or_else(|| RepoError::Malformed {
                    context: "parsing for-each-ref output".to_owned(),
                    detail: line.to_owned(),
                })?;
                Ok((
                    name.to_owned(),
                    self.parse_commit_id(oid, "listing refs")?,
                ))
            })
            .collect()
    }

    fn default_signature(&self) -> Result<Signature, RepoError> {
        // "Name <email> 1234567890 +0000"
        let ident = self.git(&["var", "GIT_COMMITTER_IDENT"])?;
        let (name, rest) = ident.split_once(" <").ok_or_else(|| RepoError::Malformed {
            context: "parsing committer ident".to_owned(),
            detail: ident.clone(),
        })?;
        let (email, _) = rest.split_once('>').ok_or_else(|| RepoError::Malformed {
            context: "parsing committer ident".to_owned(),
            detail: ident.clone(),
        })?;
        Ok(Signature::now(name, email))
    }

    fn journal_dir(&self) -> Option<PathBuf> {
        Some(self.git_dir.join("patchdance").join("journal"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
