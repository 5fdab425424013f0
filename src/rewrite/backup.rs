//! Backup refs: `refs/patchdance/backup/<operation_id>`.
//!
//! A backup ref is created before any rewriting and points at the
//! pre-transaction branch head. Backups are enumerable for manual
//! recovery and pruned after a retention window using the operation
//! journal's timestamps.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::PatchdanceError;
use crate::model::types::{CommitId, OperationId};
use crate::repo::Repository;

use super::journal;

/// Namespace for backup refs.
pub const BACKUP_PREFIX: &str = "refs/patchdance/backup/";

/// The backup ref name for one operation.
#[must_use]
pub fn backup_ref_name(id: &OperationId) -> String {
    format!("{BACKUP_PREFIX}{id}")
}

/// Record the pre-transaction head under the operation's backup ref.
///
/// # Errors
/// Fails if the ref already exists (operation ids are unique) or the
/// backend rejects the write.
pub fn create_backup(
    repo: &dyn Repository,
    id: &OperationId,
    head: &CommitId,
) -> Result<(), PatchdanceError> {
    repo.create_ref(&backup_ref_name(id), head)?;
    info!(operation = %id, head = head.short(), "backup ref created");
    Ok(())
}

/// All backups, sorted by operation id.
///
/// # Errors
/// Repository access failures.
pub fn list_backups(
    repo: &dyn Repository,
) -> Result<Vec<(OperationId, CommitId)>, PatchdanceError> {
    let mut out = Vec::new();
    for (name, commit) in repo.list_refs(BACKUP_PREFIX)? {
        let raw = name.trim_start_matches(BACKUP_PREFIX);
        match OperationId::new(raw) {
            Ok(id) => out.push((id, commit)),
            Err(_) => warn!(ref_name = %name, "ignoring foreign ref in backup namespace"),
        }
    }
    Ok(out)
}

/// Restore the current branch to the operation's backed-up head.
///
/// Returns the commit the branch now points at.
///
/// # Errors
/// - unknown operation id;
/// - the branch ref moved while restoring (retry after re-reading).
pub fn recover(repo: &dyn Repository, id: &OperationId) -> Result<CommitId, PatchdanceError> {
    let ref_name = backup_ref_name(id);
    let target = repo
        .resolve_ref(&ref_name)?
        .ok_or_else(|| PatchdanceError::Repository {
            detail: format!("no backup ref for operation {id}"),
        })?;

    let branch = repo.current_branch()?;
    let branch_ref = format!("refs/heads/{branch}");
    let current = repo.head()?;
    if current == target {
        return Ok(target);
    }
    repo.update_ref(&branch_ref, &current, &target)?;
    info!(operation = %id, head = target.short(), "branch restored from backup");
    Ok(target)
}

/// Delete backups whose journal timestamp is older than the retention
/// window. Backups without a journal record are kept.
///
/// Returns the pruned operation ids.
///
/// # Errors
/// Repository access failures.
pub fn prune_expired(
    repo: &dyn Repository,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<OperationId>, PatchdanceError> {
    let cutoff = now - chrono::Duration::days(i64::from(retention_days));
    let mut pruned = Vec::new();
    for (id, _) in list_backups(repo)? {
        let Some(record) = journal::read(repo, &id)? else {
            continue;
        };
        if record.timestamp < cutoff {
            repo.delete_ref(&backup_ref_name(&id))?;
            journal::remove(repo, &id)?;
            pruned.push(id);
        }
    }
    if !pruned.is_empty() {
        info!(count = pruned.len(), "pruned expired backup refs");
    }
    Ok(pruned)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
