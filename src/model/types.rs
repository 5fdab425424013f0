//! Core identifier types for the patch engine.
//!
//! Foundation types used throughout Patchdance: commit identifiers, tree
//! identifiers, operation identifiers, and commit metadata.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CommitId
// ---------------------------------------------------------------------------

/// A validated 40-character lowercase hex git commit ID (SHA-1).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Create a new `CommitId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_hex40(s, ErrorKind::CommitId)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the full hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the short form (first 8 characters) used for display and
    /// patch identifiers.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommitId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CommitId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_hex40(&s, ErrorKind::CommitId)?;
        Ok(Self(s))
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// TreeId
// ---------------------------------------------------------------------------

/// A validated 40-character lowercase hex git tree object ID.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TreeId(String);

impl TreeId {
    /// Create a new `TreeId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_hex40(s, ErrorKind::TreeId)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TreeId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_hex40(&s, ErrorKind::TreeId)?;
        Ok(Self(s))
    }
}

impl From<TreeId> for String {
    fn from(id: TreeId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// OperationId
// ---------------------------------------------------------------------------

/// Identifier of a single history-rewrite transaction.
///
/// Format: `op-` followed by 12 lowercase hex characters. The id names the
/// backup ref (`refs/patchdance/backup/<id>`) and the journal file for the
/// transaction, so it must be filesystem- and refname-safe.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationId(String);

impl OperationId {
    /// Create an `OperationId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error unless the string is `op-` plus 12 lowercase hex digits.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let Some(hex) = s.strip_prefix("op-") else {
            return Err(ValidationError {
                kind: ErrorKind::OperationId,
                value: s.to_owned(),
                reason: "missing 'op-' prefix".to_owned(),
            });
        };
        if hex.len() != 12 || !hex.chars().all(is_lower_hex) {
            return Err(ValidationError {
                kind: ErrorKind::OperationId,
                value: s.to_owned(),
                reason: "expected 12 lowercase hex characters after 'op-'".to_owned(),
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Generate a random `OperationId`.
    ///
    /// Uses the thread-local PRNG. Two transactions started in the same
    /// repository get distinct ids with overwhelming probability.
    #[must_use]
    pub fn random() -> Self {
        let n: u64 = rand::random();
        Self(format!("op-{:012x}", n & 0xffff_ffff_ffff))
    }

    /// Return the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OperationId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OperationId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<OperationId> for String {
    fn from(id: OperationId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// CommitInfo
// ---------------------------------------------------------------------------

/// Metadata about a single commit.
///
/// Produced by the Repository Port and owned by the caller; carries no
/// references to live repository handles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// The commit's object id.
    pub id: CommitId,
    /// Full commit message.
    pub message: String,
    /// Author name.
    pub author: String,
    /// Author email.
    pub email: String,
    /// Author timestamp, UTC.
    pub timestamp: DateTime<Utc>,
    /// Parent ids in order; empty for a root commit.
    pub parent_ids: Vec<CommitId>,
    /// Paths touched relative to the first parent (all paths for a root).
    pub files_changed: Vec<PathBuf>,
}

impl CommitInfo {
    /// Return the first line of the commit message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Return `true` if this commit has more than one parent.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// Return the first parent, or `None` for a root commit.
    #[must_use]
    pub fn first_parent(&self) -> Option<&CommitId> {
        self.parent_ids.first()
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

fn is_lower_hex(c: char) -> bool {
    c.is_ascii_hexdigit() && !c.is_ascii_uppercase()
}

fn validate_hex40(s: &str, kind: ErrorKind) -> Result<(), ValidationError> {
    if s.len() != 40 {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: format!("expected 40 hex characters, got {}", s.len()),
        });
    }
    if !s.chars().all(is_lower_hex) {
        return Err(ValidationError {
            kind,
            value: s.to_owned(),
            reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
        });
    }
    Ok(())
}

/// The kind of value that failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`CommitId`] validation error.
    CommitId,
    /// A [`TreeId`] validation error.
    TreeId,
    /// An [`OperationId`] validation error.
    OperationId,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommitId => write!(f, "CommitId"),
            Self::TreeId => write!(f, "TreeId"),
            Self::OperationId => write!(f, "OperationId"),
        }
    }
}

/// A validation error for Patchdance identifier types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?} — {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
