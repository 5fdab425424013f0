//! Execution planning: operation → ordered rewrite steps.
//!
//! A [`RewritePlan`] is the full prescription for a transaction: the
//! branch being rewritten, the commit the first step builds on, the steps
//! oldest-first, and every patch the steps reference, extracted up front.
//! Planning never mutates the repository.
//!
//! Only linear first-parent chains are rewritten; a merge commit anywhere
//! in the affected range rejects the plan.

use std::collections::BTreeMap;

use crate::diff::extract_patches;
use crate::error::PatchdanceError;
use crate::model::graph::CommitGraph;
use crate::model::operation::{InsertPosition, Operation};
use crate::model::patch::{Patch, PatchId};
use crate::model::types::CommitId;
use crate::repo::Repository;

/// How far back history is indexed for planning.
const HISTORY_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// One step of a rewrite, applied on top of the previous step's result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlannedStep {
    /// Re-create an existing commit on its (possibly rewritten) parent,
    /// patches unchanged.
    Replay {
        /// The original commit.
        original: CommitId,
    },
    /// Re-create an existing commit with a patch-set delta.
    Amend {
        /// The original commit.
        original: CommitId,
        /// Patch ids added to the commit (looked up in the plan's patch map).
        add: Vec<PatchId>,
        /// Patch ids removed from the commit.
        remove: Vec<PatchId>,
    },
    /// Create a brand-new commit from patches.
    Synthesize {
        /// Message for the new commit.
        message: String,
        /// Patches making up the commit.
        patches: Vec<PatchId>,
        /// Commit whose author identity and author time the new commit
        /// borrows.
        author_of: CommitId,
    },
    /// Squash a contiguous run of commits into one.
    Absorb {
        /// The originals, oldest first.
        originals: Vec<CommitId>,
        /// Message for the squashed commit.
        message: String,
    },
}

/// The derived execution plan for one operation.
#[derive(Clone, Debug)]
pub struct RewritePlan {
    /// Branch name the transaction rewrites.
    pub branch: String,
    /// Head of that branch at planning time.
    pub old_head: CommitId,
    /// Commit the first step applies on top of; `None` rebuilds from a
    /// root.
    pub base: Option<CommitId>,
    /// Steps, oldest first.
    pub steps: Vec<PlannedStep>,
    /// Every patch referenced by id in the steps.
    pub patches: BTreeMap<PatchId, Patch>,
}

impl RewritePlan {
    /// The branch ref the transaction will move.
    #[must_use]
    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    /// Original commits the plan touches, oldest first.
    #[must_use]
    pub fn affected_commits(&self) -> Vec<CommitId> {
        let mut out = Vec::new();
        for step in &self.steps {
            match step {
                PlannedStep::Replay { original } | PlannedStep::Amend { original, .. } => {
                    out.push(original.clone());
                }
                PlannedStep::Absorb { originals, .. } => out.extend(originals.iter().cloned()),
                PlannedStep::Synthesize { .. } => {}
            }
        }
        out
    }

    /// Human-readable step descriptions, in plan order.
    #[must_use]
    pub fn describe_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| match step {
                PlannedStep::Replay { original } => format!("replay {}", original.short()),
                PlannedStep::Amend { original, add, remove } => {
                    let mut parts = Vec::new();
                    for id in add {
                        parts.push(format!("+{id}"));
                    }
                    for id in remove {
                        parts.push(format!("-{id}"));
                    }
                    format!("amend {}: {}", original.short(), parts.join(", "))
                }
                PlannedStep::Synthesize { message, patches, .. } => {
                    let summary = message.lines().next().unwrap_or("");
                    format!("create \"{summary}\" from {} patch(es)", patches.len())
                }
                PlannedStep::Absorb { originals, message } => {
                    let summary = message.lines().next().unwrap_or("");
                    format!(
                        "squash {}..{} into \"{summary}\"",
                        originals.first().map_or("?", |c| c.short()),
                        originals.last().map_or("?", |c| c.short())
                    )
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

fn plan_err(detail: impl Into<String>) -> PatchdanceError {
    PatchdanceError::Repository {
        detail: detail.into(),
    }
}

/// Derive the execution plan for `op` against the repository's current
/// branch.
///
/// # Errors
/// - referenced commits outside the indexed history;
/// - merge commits in the affected range;
/// - patch ids that do not resolve;
/// - split requests that do not cover the source commit's patches.
pub fn plan_operation(
    repo: &dyn Repository,
    op: &Operation,
) -> Result<RewritePlan, PatchdanceError> {
    let head = repo.head()?;
    let branch = repo.current_branch()?;
    let walk = repo.walk_history(&head, HISTORY_LIMIT)?;
    let graph = CommitGraph::from_walk(walk);

    let plan = match op {
        Operation::MovePatch {
            patch_id,
            from_commit,
            to_commit,
            ..
        } => plan_move(repo, &graph, &branch, &head, patch_id, from_commit, to_commit)?,
        Operation::SplitCommit {
            source_commit,
            new_commits,
        } => plan_split(repo, &graph, &branch, &head, source_commit, new_commits)?,
        Operation::CreateCommit {
            patches,
            message,
            position,
        } => plan_create(repo, &graph, &branch, &head, patches, message, position)?,
        Operation::MergeCommits { commit_ids, message } => {
            plan_merge(&graph, &branch, &head, commit_ids, message)?
        }
    };

    for id in plan.affected_commits() {
        let info = graph
            .find_commit(&id)
            .ok_or_else(|| plan_err(format!("commit {} is outside the planned range", id.short())))?;
        if info.is_merge() {
            return Err(plan_err(format!(
                "commit {} is a merge commit; only linear history can be rewritten",
                id.short()
            )));
        }
    }

    Ok(plan)
}

fn require_in_range(graph: &CommitGraph, id: &CommitId) -> Result<(), PatchdanceError> {
    if graph.contains(id) {
        Ok(())
    } else {
        Err(PatchdanceError::InvalidCommitId {
            id: id.as_str().to_owned(),
        })
    }
}

fn plan_move(
    repo: &dyn Repository,
    graph: &CommitGraph,
    branch: &str,
    head: &CommitId,
    patch_id: &PatchId,
    from: &CommitId,
    to: &CommitId,
) -> Result<RewritePlan, PatchdanceError> {
    require_in_range(graph, from)?;
    require_in_range(graph, to)?;
    if from == to {
        return Err(plan_err(format!(
            "patch {patch_id} is already in commit {}",
            to.short()
        )));
    }

    let moved = extract_patches(repo, from)?
        .into_iter()
        .find(|p| p.id == *patch_id)
        .ok_or_else(|| {
            plan_err(format!(
                "patch {patch_id} not found in commit {}",
                from.short()
            ))
        })?;

    let older = graph
        .older_of(from, to)
        .ok_or_else(|| {
            plan_err(format!(
                "commits {} and {} are not on the same first-parent chain",
                from.short(),
                to.short()
            ))
        })?
        .clone();

    let base = graph
        .find_commit(&older)
        .and_then(|c| c.first_parent().cloned());

    let mut chain = vec![older.clone()];
    chain.extend(graph.chain_to_head(&older).unwrap_or_default());

    let steps = chain
        .into_iter()
        .map(|commit| {
            if commit == *from {
                PlannedStep::Amend {
                    original: commit,
                    add: vec![],
                    remove: vec![patch_id.clone()],
                }
            } else if commit == *to {
                PlannedStep::Amend {
                    original: commit,
                    add: vec![patch_id.clone()],
                    remove: vec![],
                }
            } else {
                PlannedStep::Replay { original: commit }
            }
        })
        .collect();

    let mut patches = BTreeMap::new();
    patches.insert(moved.id.clone(), moved);

    Ok(RewritePlan {
        branch: branch.to_owned(),
        old_head: head.clone(),
        base,
        steps,
        patches,
    })
}

fn plan_split(
    repo: &dyn Repository,
    graph: &CommitGraph,
    branch: &str,
    head: &CommitId,
    source: &CommitId,
    new_commits: &[crate::model::operation::NewCommit],
) -> Result<RewritePlan, PatchdanceError> {
    require_in_range(graph, source)?;
    if new_commits.is_empty() {
        return Err(plan_err("split requires at least one replacement commit"));
    }

    let extracted = extract_patches(repo, source)?;
    let mut patches: BTreeMap<PatchId, Patch> = extracted
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    let mut covered = 0usize;
    for nc in new_commits {
        for id in &nc.patches {
            if !patches.contains_key(id) {
                return Err(plan_err(format!(
                    "patch {id} not found in commit {}",
                    source.short()
                )));
            }
            covered += 1;
        }
    }
    if covered != patches.len() {
        return Err(plan_err(format!(
            "split covers {covered} patch(es) but commit {} has {}; every patch must land in exactly one new commit",
            source.short(),
            patches.len()
        )));
    }

    let base = graph
        .find_commit(source)
        .and_then(|c| c.first_parent().cloned());

    let mut steps: Vec<PlannedStep> = new_commits
        .iter()
        .map(|nc| PlannedStep::Synthesize {
            message: nc.message.clone(),
            patches: nc.patches.clone(),
            author_of: source.clone(),
        })
        .collect();
    for commit in graph.chain_to_head(source).unwrap_or_default() {
        steps.push(PlannedStep::Replay { original: commit });
    }

    // Keep only the patches the steps reference (all of them, by cover).
    patches.retain(|id, _| new_commits.iter().any(|nc| nc.patches.contains(id)));

    Ok(RewritePlan {
        branch: branch.to_owned(),
        old_head: head.clone(),
        base,
        steps,
        patches,
    })
}

fn plan_create(
    repo: &dyn Repository,
    graph: &CommitGraph,
    branch: &str,
    head: &CommitId,
    patch_ids: &[PatchId],
    message: &str,
    position: &InsertPosition,
) -> Result<RewritePlan, PatchdanceError> {
    if patch_ids.is_empty() {
        return Err(plan_err("create requires at least one patch"));
    }

    // Resolve each patch id: the short source prefix identifies a commit
    // in the indexed history.
    let mut patches: BTreeMap<PatchId, Patch> = BTreeMap::new();
    let mut author_of: Option<CommitId> = None;
    for id in patch_ids {
        let source = find_by_short(graph, id.source_short()).ok_or_else(|| {
            plan_err(format!(
                "patch {id}: no commit matching '{}' in the last {HISTORY_LIMIT} commits",
                id.source_short()
            ))
        })?;
        let patch = extract_patches(repo, &source)?
            .into_iter()
            .find(|p| p.id == *id)
            .ok_or_else(|| {
                plan_err(format!("patch {id} not found in commit {}", source.short()))
            })?;
        author_of.get_or_insert(source);
        patches.insert(patch.id.clone(), patch);
    }
    let author_of = author_of.expect("at least one patch id");

    let synthesize = PlannedStep::Synthesize {
        message: message.to_owned(),
        patches: patch_ids.to_vec(),
        author_of,
    };

    let (base, steps) = match position {
        InsertPosition::AtBranchHead => (Some(head.clone()), vec![synthesize]),
        InsertPosition::After(anchor) => {
            require_in_range(graph, anchor)?;
            let mut steps = vec![synthesize];
            for commit in graph.chain_to_head(anchor).unwrap_or_default() {
                steps.push(PlannedStep::Replay { original: commit });
            }
            (Some(anchor.clone()), steps)
        }
        InsertPosition::Before(anchor) => {
            require_in_range(graph, anchor)?;
            let base = graph
                .find_commit(anchor)
                .and_then(|c| c.first_parent().cloned());
            let mut steps = vec![synthesize, PlannedStep::Replay { original: anchor.clone() }];
            for commit in graph.chain_to_head(anchor).unwrap_or_default() {
                steps.push(PlannedStep::Replay { original: commit });
            }
            (base, steps)
        }
    };

    Ok(RewritePlan {
        branch: branch.to_owned(),
        old_head: head.clone(),
        base,
        steps,
        patches,
    })
}

fn plan_merge(
    graph: &CommitGraph,
    branch: &str,
    head: &CommitId,
    commit_ids: &[CommitId],
    message: &str,
) -> Result<RewritePlan, PatchdanceError> {
    if commit_ids.len() < 2 {
        return Err(plan_err("merging requires at least two commits"));
    }
    for id in commit_ids {
        require_in_range(graph, id)?;
    }

    // Order oldest-first along the chain, then require contiguity.
    let mut ordered = commit_ids.to_vec();
    ordered.sort_by(|a, b| {
        if a == b {
            std::cmp::Ordering::Equal
        } else if graph.is_first_parent_ancestor(a, b) {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Greater
        }
    });
    for pair in ordered.windows(2) {
        if graph.parents(&pair[1]).first() != Some(&pair[0]) {
            return Err(plan_err(format!(
                "commits {} and {} are not adjacent; only a contiguous range can be merged",
                pair[0].short(),
                pair[1].short()
            )));
        }
    }

    let earliest = ordered.first().expect("len >= 2").clone();
    let latest = ordered.last().expect("len >= 2").clone();
    let base = graph
        .find_commit(&earliest)
        .and_then(|c| c.first_parent().cloned());

    let mut steps = vec![PlannedStep::Absorb {
        originals: ordered,
        message: message.to_owned(),
    }];
    for commit in graph.chain_to_head(&latest).unwrap_or_default() {
        steps.push(PlannedStep::Replay { original: commit });
    }

    Ok(RewritePlan {
        branch: branch.to_owned(),
        old_head: head.clone(),
        base,
        steps,
        patches: BTreeMap::new(),
    })
}

fn find_by_short(graph: &CommitGraph, short: &str) -> Option<CommitId> {
    if short.is_empty() {
        return None;
    }
    let mut cursor = graph.head().cloned();
    while let Some(id) = cursor {
        if id.as_str().starts_with(short) {
            return Some(id);
        }
        cursor = graph.parents(&id).first().cloned();
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
