//! Data model for the patch engine.
//!
//! Pure data: identifiers, commit metadata, patches, conflicts, operations,
//! and the commit graph. Nothing here touches a repository.

pub mod conflict;
pub mod graph;
pub mod operation;
pub mod patch;
pub mod types;

pub use conflict::{Conflict, ConflictKind};
pub use graph::CommitGraph;
pub use operation::{InsertPosition, NewCommit, Operation, OperationPreview, OperationResult};
pub use patch::{DiffLine, Hunk, ModeChange, Patch, PatchId};
pub use types::{CommitId, CommitInfo, OperationId, TreeId};
