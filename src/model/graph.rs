//! Commit graph — owned commit metadata plus id-keyed adjacency.
//!
//! The graph holds owned [`CommitInfo`] values; edges are just id
//! references. No back-pointers, no cycles — the DAG is acyclic by
//! construction. Built from a history walk, consumed by the rewrite
//! planner to find descendants and check chain linearity.

use std::collections::BTreeMap;

use super::types::{CommitId, CommitInfo};

// ---------------------------------------------------------------------------
// CommitGraph
// ---------------------------------------------------------------------------

/// An in-memory index over a slice of history.
#[derive(Clone, Debug, Default)]
pub struct CommitGraph {
    commits: BTreeMap<CommitId, CommitInfo>,
    /// child → parents (subset of `CommitInfo::parent_ids` that are in-graph).
    parents: BTreeMap<CommitId, Vec<CommitId>>,
    /// parent → children, in insertion order of the walk.
    children: BTreeMap<CommitId, Vec<CommitId>>,
    /// The branch head the graph was built from.
    head: Option<CommitId>,
}

impl CommitGraph {
    /// Build a graph from commits as returned by a history walk
    /// (newest first). The first commit is recorded as the head.
    #[must_use]
    pub fn from_walk(commits: Vec<CommitInfo>) -> Self {
        let head = commits.first().map(|c| c.id.clone());
        let mut graph = Self {
            head,
            ..Self::default()
        };
        for info in commits {
            graph.insert(info);
        }
        graph
    }

    /// Insert one commit, wiring up edges to already-known commits.
    pub fn insert(&mut self, info: CommitInfo) {
        let id = info.id.clone();
        for parent in &info.parent_ids {
            self.children
                .entry(parent.clone())
                .or_default()
                .push(id.clone());
        }
        self.parents.insert(id.clone(), info.parent_ids.clone());
        self.commits.insert(id, info);
    }

    /// Number of commits in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// Return `true` if the graph holds no commits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// The branch head the graph was built from.
    #[must_use]
    pub fn head(&self) -> Option<&CommitId> {
        self.head.as_ref()
    }

    /// Look up a commit's metadata.
    #[must_use]
    pub fn find_commit(&self, id: &CommitId) -> Option<&CommitInfo> {
        self.commits.get(id)
    }

    /// Return `true` if the commit is in the graph.
    #[must_use]
    pub fn contains(&self, id: &CommitId) -> bool {
        self.commits.contains_key(id)
    }

    /// In-graph children of a commit.
    #[must_use]
    pub fn children(&self, id: &CommitId) -> &[CommitId] {
        self.children.get(id).map_or(&[], Vec::as_slice)
    }

    /// In-graph parents of a commit.
    #[must_use]
    pub fn parents(&self, id: &CommitId) -> &[CommitId] {
        self.parents.get(id).map_or(&[], Vec::as_slice)
    }

    /// The first-parent chain from `from` (exclusive) up to the head
    /// (inclusive), oldest first.
    ///
    /// Returns `None` if `from` is not an ancestor of the head along
    /// first-parent edges.
    #[must_use]
    pub fn chain_to_head(&self, from: &CommitId) -> Option<Vec<CommitId>> {
        let head = self.head.as_ref()?;
        let mut chain = Vec::new();
        let mut cursor = head.clone();
        loop {
            if cursor == *from {
                chain.reverse();
                return Some(chain);
            }
            chain.push(cursor.clone());
            let parent = self.parents(&cursor).first()?.clone();
            cursor = parent;
        }
    }

    /// Return `true` if `ancestor` precedes `descendant` on the
    /// first-parent chain (or they are equal).
    #[must_use]
    pub fn is_first_parent_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> bool {
        let mut cursor = descendant.clone();
        loop {
            if cursor == *ancestor {
                return true;
            }
            match self.parents(&cursor).first() {
                Some(p) => cursor = p.clone(),
                None => return false,
            }
        }
    }

    /// Of two commits on the head chain, the one further from the head.
    ///
    /// Returns `None` when the commits are not ordered along first-parent
    /// edges (e.g. siblings on diverged branches).
    #[must_use]
    pub fn older_of<'a>(&self, a: &'a CommitId, b: &'a CommitId) -> Option<&'a CommitId> {
        if self.is_first_parent_ancestor(a, b) {
            Some(a)
        } else if self.is_first_parent_ancestor(b, a) {
            Some(b)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
