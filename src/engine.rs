//! The engine facade.
//!
//! [`PatchEngine`] ties the components together behind the five public
//! operations: extract, preview, apply, detect, recover. Read operations
//! take any [`Repository`] and never mutate; `apply_operation` runs a
//! full transaction.

use tracing::info;

use crate::config::PatchdanceConfig;
use crate::detect;
use crate::diff;
use crate::error::PatchdanceError;
use crate::model::conflict::Conflict;
use crate::model::operation::{Operation, OperationPreview, OperationResult};
use crate::model::patch::Patch;
use crate::model::types::{CommitId, OperationId};
use crate::repo::Repository;
use crate::rewrite::transaction::{CancellationToken, ConflictResolver, Transaction};
use crate::rewrite::{backup, plan_operation};

// ---------------------------------------------------------------------------
// PatchEngine
// ---------------------------------------------------------------------------

/// The patch engine. Cheap to construct; holds only configuration.
#[derive(Clone, Debug, Default)]
pub struct PatchEngine {
    config: PatchdanceConfig,
}

impl PatchEngine {
    /// An engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with explicit configuration.
    #[must_use]
    pub fn with_config(config: PatchdanceConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &PatchdanceConfig {
        &self.config
    }

    /// Extract every patch `commit_id` introduces relative to its first
    /// parent.
    ///
    /// # Errors
    /// See [`diff::extract_patches`].
    pub fn extract_patches(
        &self,
        repo: &dyn Repository,
        commit_id: &CommitId,
    ) -> Result<Vec<Patch>, PatchdanceError> {
        diff::extract_patches(repo, commit_id)
    }

    /// Detect conflicts for applying `patches` to `target`, without
    /// mutating anything.
    ///
    /// # Errors
    /// Repository access failures.
    pub fn detect_conflicts(
        &self,
        repo: &dyn Repository,
        patches: &[Patch],
        target: &CommitId,
    ) -> Result<Vec<Conflict>, PatchdanceError> {
        detect::detect_conflicts(repo, patches, target)
    }

    /// Dry-run `op`: the plan's change list, anticipated conflicts, and
    /// the commits a transaction would rewrite. Deterministic — equal
    /// inputs produce bytewise-equal previews.
    ///
    /// # Errors
    /// Planning failures (unknown commits, uncovered splits, …).
    pub fn preview_operation(
        &self,
        repo: &dyn Repository,
        op: &Operation,
    ) -> Result<OperationPreview, PatchdanceError> {
        let plan = plan_operation(repo, op)?;

        let candidate_patches: Vec<Patch> = plan.patches.values().cloned().collect();
        let target = match op {
            Operation::MovePatch { to_commit, .. } => Some(to_commit.clone()),
            Operation::CreateCommit { .. } => plan.base.clone(),
            Operation::SplitCommit { .. } | Operation::MergeCommits { .. } => None,
        };
        let potential_conflicts = match target {
            Some(target) => detect::detect_conflicts(repo, &candidate_patches, &target)?,
            None => detect::detect_patch_conflicts(&candidate_patches),
        };

        Ok(OperationPreview {
            changes: plan.describe_steps(),
            potential_conflicts,
            affected_commits: plan.affected_commits(),
        })
    }

    /// Execute `op` as an atomic transaction.
    ///
    /// # Errors
    /// - planning/preflight failures surface directly;
    /// - anything after the backup rolls back and returns
    ///   [`PatchdanceError::TransactionAborted`].
    pub fn apply_operation(
        &self,
        repo: &dyn Repository,
        op: &Operation,
    ) -> Result<OperationResult, PatchdanceError> {
        info!(operation = %op, "applying operation");
        Transaction::new(repo, &self.config).execute(op)
    }

    /// [`Self::apply_operation`] with a caller-owned cancellation token
    /// and an optional conflict resolver.
    ///
    /// # Errors
    /// As [`Self::apply_operation`]; cancellation surfaces as
    /// [`PatchdanceError::Cancelled`] (wrapped in `TransactionAborted`
    /// once a backup exists).
    pub fn apply_operation_with(
        &self,
        repo: &dyn Repository,
        op: &Operation,
        cancel: CancellationToken,
        resolver: Option<&ConflictResolver<'_>>,
    ) -> Result<OperationResult, PatchdanceError> {
        let mut tx = Transaction::new(repo, &self.config).with_cancellation(cancel);
        if let Some(resolver) = resolver {
            tx = tx.with_resolver(resolver);
        }
        tx.execute(op)
    }

    /// Restore the current branch from an operation's backup ref.
    ///
    /// # Errors
    /// Unknown operation id, or the branch moved while restoring.
    pub fn recover(
        &self,
        repo: &dyn Repository,
        operation_id: &OperationId,
    ) -> Result<CommitId, PatchdanceError> {
        backup::recover(repo, operation_id)
    }

    /// Enumerate backup refs for manual recovery.
    ///
    /// # Errors
    /// Repository access failures.
    pub fn list_backups(
        &self,
        repo: &dyn Repository,
    ) -> Result<Vec<(OperationId, CommitId)>, PatchdanceError> {
        backup::list_backups(repo)
    }

    /// Delete backups older than the configured retention window
    /// (`rewrite.backup_retention_days`). Returns the pruned ids.
    ///
    /// # Errors
    /// Repository access failures.
    pub fn prune_backups(
        &self,
        repo: &dyn Repository,
    ) -> Result<Vec<OperationId>, PatchdanceError> {
        backup::prune_expired(
            repo,
            self.config.rewrite.backup_retention_days,
            chrono::Utc::now(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
