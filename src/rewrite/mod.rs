//! History rewriter: atomic multi-commit rewrites.
//!
//! - [`plan`] — operation → ordered rewrite steps
//! - [`transaction`] — state-machine execution with backup and rollback
//! - [`backup`] — `refs/patchdance/backup/*` management
//! - [`journal`] — on-disk transaction records for crash recovery

pub mod backup;
pub mod journal;
pub mod plan;
pub mod transaction;

pub use backup::{backup_ref_name, list_backups, prune_expired, recover, BACKUP_PREFIX};
pub use plan::{plan_operation, PlannedStep, RewritePlan};
pub use transaction::{CancellationToken, ConflictResolver, Transaction, TxState};
