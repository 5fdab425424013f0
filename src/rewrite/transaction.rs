//! Transactional execution of a rewrite plan.
//!
//! A [`Transaction`] drives one operation through the state machine
//! `Idle → Planning → Preflighting → BackupTaken → Rewriting → Rebasing →
//! Committing → Done`, with any state falling to `RollingBack → Idle` on
//! error. The branch ref moves exactly once, by compare-and-swap, at the
//! very end — external observers see either the pre-transaction or the
//! post-transaction branch, never an intermediate state. Everything
//! created before that point is unreferenced object-store data, so
//! rollback is: leave the refs alone, keep the backup, report the cause.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::PatchdanceConfig;
use crate::diff::apply::ApplyOptions;
use crate::diff::extract_patches;
use crate::error::PatchdanceError;
use crate::merge::apply::{apply_patch_to_state, ApplyOutcome};
use crate::model::conflict::Conflict;
use crate::model::operation::{Operation, OperationResult};
use crate::model::patch::Patch;
use crate::model::types::{CommitId, OperationId};
use crate::repo::{Repository, Signature, TreeEntry};

use super::backup;
use super::journal::{self, OperationJournal};
use super::plan::{plan_operation, PlannedStep, RewritePlan};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// A cooperative cancellation flag, checked at every repository I/O
/// boundary. Cancelling after the final ref update is a no-op.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, un-signalled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Return `true` once [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Transaction lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    /// Ready; the only state that accepts an operation.
    Idle,
    /// Deriving the rewrite plan.
    Planning,
    /// Verifying the repository is safe to rewrite.
    Preflighting,
    /// Backup ref and journal exist; rollback is now guaranteed possible.
    BackupTaken,
    /// Recreating planned commits.
    Rewriting,
    /// Replaying descendants not explicitly rewritten.
    Rebasing,
    /// Moving the branch ref.
    Committing,
    /// Finished; the new head is published.
    Done,
    /// Unwinding after a failure.
    RollingBack,
}

/// A conflict resolver callback: given the conflicted file, the structured
/// conflicts, and the three merge inputs, return fully-merged content to
/// continue with, or `None` to let the transaction abort.
pub type ConflictResolver<'a> =
    dyn Fn(&std::path::Path, &[Conflict], &str, &str, &str) -> Option<String> + 'a;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// One single-use rewrite transaction.
pub struct Transaction<'a> {
    repo: &'a dyn Repository,
    config: &'a PatchdanceConfig,
    cancel: CancellationToken,
    resolver: Option<&'a ConflictResolver<'a>>,
    state: TxState,
    operation_id: OperationId,
}

impl<'a> Transaction<'a> {
    /// Create a transaction over `repo`.
    #[must_use]
    pub fn new(repo: &'a dyn Repository, config: &'a PatchdanceConfig) -> Self {
        Self {
            repo,
            config,
            cancel: CancellationToken::new(),
            resolver: None,
            state: TxState::Idle,
            operation_id: OperationId::random(),
        }
    }

    /// Attach an externally-owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Attach a conflict resolver consulted before aborting on conflicts.
    #[must_use]
    pub fn with_resolver(mut self, resolver: &'a ConflictResolver<'a>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// This transaction's id (names its backup ref and journal entry).
    #[must_use]
    pub fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    fn transition(&mut self, next: TxState) {
        debug!(operation = %self.operation_id, from = ?self.state, to = ?next, "transaction state");
        self.state = next;
    }

    fn check_interrupted(&self, deadline: Instant) -> Result<(), PatchdanceError> {
        if self.cancel.is_cancelled() {
            return Err(PatchdanceError::Cancelled {
                reason: "cancellation requested".to_owned(),
            });
        }
        if Instant::now() >= deadline {
            return Err(PatchdanceError::Cancelled {
                reason: format!(
                    "deadline exceeded ({} s wall-clock budget)",
                    self.config.rewrite.timeout_secs
                ),
            });
        }
        Ok(())
    }

    /// Execute `op` to completion or rollback.
    ///
    /// # Errors
    /// - planning and preflight failures surface directly;
    /// - any failure after the backup is taken rolls back and re-raises as
    ///   [`PatchdanceError::TransactionAborted`] with the cause attached.
    pub fn execute(mut self, op: &Operation) -> Result<OperationResult, PatchdanceError> {
        assert_eq!(self.state, TxState::Idle, "transactions are single-use");
        let deadline =
            Instant::now() + Duration::from_secs(self.config.rewrite.timeout_secs);

        self.transition(TxState::Planning);
        self.check_interrupted(deadline)?;
        let plan = plan_operation(self.repo, op)?;
        self.check_interrupted(deadline)?;

        self.transition(TxState::Preflighting);
        if !self.repo.is_clean()? {
            return Err(PatchdanceError::Repository {
                detail: "work tree has uncommitted changes; commit or stash them first"
                    .to_owned(),
            });
        }
        if plan.branch == "HEAD" {
            return Err(PatchdanceError::Repository {
                detail: "HEAD is detached; check out a branch before rewriting".to_owned(),
            });
        }
        if self.repo.resolve_ref(&plan.branch_ref())? != Some(plan.old_head.clone()) {
            return Err(PatchdanceError::Repository {
                detail: format!("branch '{}' moved during planning; retry", plan.branch),
            });
        }
        self.check_interrupted(deadline)?;

        backup::create_backup(self.repo, &self.operation_id, &plan.old_head)?;
        self.transition(TxState::BackupTaken);

        let outcome = journal::write(
            self.repo,
            &OperationJournal {
                operation_id: self.operation_id.clone(),
                original_head: plan.old_head.clone(),
                original_branch: plan.branch.clone(),
                timestamp: Utc::now(),
            },
        )
        .and_then(|_| self.run(op, &plan, deadline));

        match outcome {
            Ok(result) => {
                if let Err(e) = journal::remove(self.repo, &self.operation_id) {
                    warn!(operation = %self.operation_id, error = %e, "journal cleanup failed");
                }
                self.transition(TxState::Done);
                info!(operation = %self.operation_id, "transaction committed");
                Ok(result)
            }
            Err(cause) => {
                self.transition(TxState::RollingBack);
                // The branch ref only moves at the single commit point, so
                // nothing on the branch needs restoring; intermediate
                // commits are unreferenced. The backup ref stays for
                // manual inspection.
                warn!(operation = %self.operation_id, cause = %cause, "transaction rolled back");
                self.transition(TxState::Idle);
                Err(PatchdanceError::TransactionAborted {
                    cause: Box::new(cause),
                })
            }
        }
    }

    fn run(
        &mut self,
        op: &Operation,
        plan: &RewritePlan,
        deadline: Instant,
    ) -> Result<OperationResult, PatchdanceError> {
        self.transition(TxState::Rewriting);
        let committer = self.repo.default_signature()?;
        let options = self.config.apply.options();

        let mut current = plan.base.clone();
        let mut new_ids: Vec<CommitId> = Vec::new();
        let mut modified: Vec<CommitId> = Vec::new();

        for step in &plan.steps {
            self.check_interrupted(deadline)?;
            if matches!(step, PlannedStep::Replay { .. }) && self.state == TxState::Rewriting {
                self.transition(TxState::Rebasing);
            }
            match step {
                PlannedStep::Replay { original } => {
                    let info = self.repo.commit_info(original)?;
                    if current.as_ref() == info.first_parent() {
                        // Parent unchanged upstream: the original commit
                        // is already correct.
                        current = Some(original.clone());
                        continue;
                    }
                    let patches = extract_patches(self.repo, original)?;
                    let author = author_of(&info);
                    if let Some(id) = self.build_commit(
                        current.as_ref(),
                        &patches,
                        &author,
                        &committer,
                        &info.message,
                        &options,
                    )? {
                        modified.push(id.clone());
                        current = Some(id);
                    }
                }
                PlannedStep::Amend { original, add, remove } => {
                    let info = self.repo.commit_info(original)?;
                    let mut patches = extract_patches(self.repo, original)?;
                    patches.retain(|p| !remove.contains(&p.id));
                    for id in add {
                        patches.push(lookup_patch(plan, id)?);
                    }
                    let author = author_of(&info);
                    match self.build_commit(
                        current.as_ref(),
                        &patches,
                        &author,
                        &committer,
                        &info.message,
                        &options,
                    )? {
                        Some(id) => {
                            modified.push(id.clone());
                            current = Some(id);
                        }
                        None => {
                            info!(
                                commit = original.short(),
                                "rewritten commit became empty; elided"
                            );
                        }
                    }
                }
                PlannedStep::Synthesize { message, patches, author_of: source } => {
                    let info = self.repo.commit_info(source)?;
                    let owned: Vec<Patch> = patches
                        .iter()
                        .map(|id| lookup_patch(plan, id))
                        .collect::<Result<_, _>>()?;
                    let author = author_of(&info);
                    if let Some(id) = self.build_commit(
                        current.as_ref(),
                        &owned,
                        &author,
                        &committer,
                        message,
                        &options,
                    )? {
                        new_ids.push(id.clone());
                        current = Some(id);
                    }
                }
                PlannedStep::Absorb { originals, message } => {
                    // The base below the range is untouched, so the newest
                    // original's tree is exactly the squashed tree.
                    let last = originals.last().expect("absorb range is non-empty");
                    let first = originals.first().expect("absorb range is non-empty");
                    let tree = self.repo.commit_tree_id(last)?;
                    let info = self.repo.commit_info(first)?;
                    let author = author_of(&info);
                    let parents: Vec<CommitId> = current.iter().cloned().collect();
                    let id = self
                        .repo
                        .create_commit(&parents, &tree, &author, &committer, message)?;
                    new_ids.push(id.clone());
                    current = Some(id);
                }
            }
        }

        self.check_interrupted(deadline)?;
        self.transition(TxState::Committing);
        let new_head = current.ok_or_else(|| PatchdanceError::Repository {
            detail: "rewrite produced an empty history".to_owned(),
        })?;
        if new_head != plan.old_head {
            self.repo
                .update_ref(&plan.branch_ref(), &plan.old_head, &new_head)?;
        }

        let message = format!(
            "{}: {} new commit(s), {} rewritten; head {} → {}",
            op.kind(),
            new_ids.len(),
            modified.len(),
            plan.old_head.short(),
            new_head.short()
        );
        Ok(OperationResult::succeeded(new_ids, modified, message))
    }

    /// Apply `patches` on top of `parent` and commit the result.
    ///
    /// Returns `None` when the resulting tree equals the parent's and
    /// empty commits are elided.
    fn build_commit(
        &self,
        parent: Option<&CommitId>,
        patches: &[Patch],
        author: &Signature,
        committer: &Signature,
        message: &str,
        options: &ApplyOptions,
    ) -> Result<Option<CommitId>, PatchdanceError> {
        let label = parent.map_or_else(|| "empty tree".to_owned(), |p| p.short().to_owned());

        // Later patches for the same file see earlier results through the
        // overlay, not the parent commit.
        let mut overlay: BTreeMap<PathBuf, Option<(u32, Vec<u8>)>> = BTreeMap::new();
        let mut conflicts: Vec<Conflict> = Vec::new();

        for patch in patches {
            let theirs = match overlay.get(&patch.target_file) {
                Some(state) => state.clone(),
                None => self.parent_state(parent, &patch.target_file)?,
            };
            let theirs_mode = theirs.as_ref().map(|(m, _)| *m);
            match apply_patch_to_state(self.repo, patch, theirs, &label, options)? {
                ApplyOutcome::Clean { content, mode } => {
                    overlay.insert(patch.target_file.clone(), content.map(|b| (mode, b)));
                    // A rename vacates its source path.
                    if let Some(old) = &patch.renamed_from {
                        overlay.insert(old.clone(), None);
                    }
                }
                ApplyOutcome::Conflicted {
                    conflicts: found,
                    base,
                    ours,
                    theirs,
                } => {
                    let resolved = self.resolver.and_then(|resolve| {
                        resolve(&patch.target_file, &found, &base, &ours, &theirs)
                    });
                    match resolved {
                        Some(content) => {
                            info!(
                                patch = %patch.id,
                                file = %patch.target_file.display(),
                                "conflict resolved by callback"
                            );
                            let mode = theirs_mode
                                .or_else(|| patch.mode_change.and_then(|mc| mc.resulting_mode()))
                                .unwrap_or(0o100644);
                            overlay.insert(
                                patch.target_file.clone(),
                                Some((mode, content.into_bytes())),
                            );
                        }
                        None => conflicts.extend(found),
                    }
                }
            }
        }

        if !conflicts.is_empty() {
            return Err(PatchdanceError::Conflicts(conflicts));
        }

        // An overlay indistinguishable from the parent tree is an empty
        // commit.
        let mut changed = false;
        for (path, state) in &overlay {
            if *state != self.parent_state(parent, path)? {
                changed = true;
                break;
            }
        }
        if !changed && self.config.rewrite.elide_empty_commits {
            return Ok(None);
        }

        let entries: Vec<TreeEntry> = overlay
            .into_iter()
            .map(|(path, state)| match state {
                Some((mode, content)) => TreeEntry::write(path, mode, content),
                None => TreeEntry::remove(path),
            })
            .collect();
        let tree = self.repo.write_tree(parent, &entries)?;
        let parents: Vec<CommitId> = parent.iter().map(|&p| p.clone()).collect();
        let id = self
            .repo
            .create_commit(&parents, &tree, author, committer, message)?;
        Ok(Some(id))
    }

    fn parent_state(
        &self,
        parent: Option<&CommitId>,
        path: &std::path::Path,
    ) -> Result<Option<(u32, Vec<u8>)>, PatchdanceError> {
        let Some(parent) = parent else {
            return Ok(None);
        };
        match self.repo.read_blob(parent, path)? {
            Some(bytes) => {
                let mode = self.repo.read_mode(parent, path)?.unwrap_or(0o100644);
                Ok(Some((mode, bytes)))
            }
            None => Ok(None),
        }
    }
}

fn author_of(info: &crate::model::types::CommitInfo) -> Signature {
    Signature {
        name: info.author.clone(),
        email: info.email.clone(),
        when: info.timestamp,
    }
}

fn lookup_patch(plan: &RewritePlan, id: &crate::model::patch::PatchId) -> Result<Patch, PatchdanceError> {
    plan.patches
        .get(id)
        .cloned()
        .ok_or_else(|| PatchdanceError::Repository {
            detail: format!("plan references unknown patch {id}"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
