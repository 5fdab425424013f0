//! Operation journal: `.git/patchdance/journal/<operation_id>.json`.
//!
//! Written when a backup is taken, before any rewriting, so a crashed
//! process leaves enough on disk to find the pre-transaction head. The
//! record is canonical JSON; backends without a journal directory (the
//! in-memory port) simply skip journaling.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PatchdanceError;
use crate::model::types::{CommitId, OperationId};
use crate::repo::Repository;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The persisted transaction record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationJournal {
    /// The transaction's id.
    pub operation_id: OperationId,
    /// Branch head before the transaction.
    pub original_head: CommitId,
    /// Branch the transaction rewrites.
    pub original_branch: String,
    /// When the backup was taken, UTC.
    pub timestamp: DateTime<Utc>,
}

fn journal_path(repo: &dyn Repository, id: &OperationId) -> Option<PathBuf> {
    repo.journal_dir().map(|dir| dir.join(format!("{id}.json")))
}

// ---------------------------------------------------------------------------
// I/O
// ---------------------------------------------------------------------------

/// Persist the record. Returns the path written, or `None` when the
/// backend has no journal directory.
///
/// # Errors
/// Filesystem or serialization failures.
pub fn write(
    repo: &dyn Repository,
    record: &OperationJournal,
) -> Result<Option<PathBuf>, PatchdanceError> {
    let Some(path) = journal_path(repo, &record.operation_id) else {
        return Ok(None);
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(record).map_err(|e| PatchdanceError::Repository {
        detail: format!("failed to serialize operation journal: {e}"),
    })?;
    std::fs::write(&path, json)?;
    debug!(operation = %record.operation_id, path = %path.display(), "journal written");
    Ok(Some(path))
}

/// Read one operation's record, or `None` if absent (or journaling is
/// unavailable).
///
/// # Errors
/// Filesystem failures or a corrupt record.
pub fn read(
    repo: &dyn Repository,
    id: &OperationId,
) -> Result<Option<OperationJournal>, PatchdanceError> {
    let Some(path) = journal_path(repo, id) else {
        return Ok(None);
    };
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let record = serde_json::from_str(&text).map_err(|e| PatchdanceError::Repository {
        detail: format!("corrupt journal {}: {e}", path.display()),
    })?;
    Ok(Some(record))
}

/// Remove one operation's record. Idempotent.
///
/// # Errors
/// Filesystem failures other than absence.
pub fn remove(repo: &dyn Repository, id: &OperationId) -> Result<(), PatchdanceError> {
    let Some(path) = journal_path(repo, id) else {
        return Ok(());
    };
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
