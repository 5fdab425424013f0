//! Conflict detection scenarios and determinism properties.

mod common;

use anyhow::Result;
use proptest::prelude::*;

use patchdance::detect::detect_patch_conflicts;
use patchdance::diff::{apply_patch, parse_unified_diff};
use patchdance::model::{CommitId, ConflictKind};
use patchdance::repo::{InMemoryRepository, Repository};
use patchdance::PatchEngine;

use common::{commit_file, scenario_repo};

// ---------------------------------------------------------------------------
// Scenario: two patches on the same line
// ---------------------------------------------------------------------------

#[test]
fn two_patches_modifying_line_two_yield_one_content_conflict() -> Result<()> {
    // Two branches of history both rewrite line 2 of file.txt; their
    // patches conflict on exactly that line.
    let (dir, repo) = common::setup_repo();
    let c1 = commit_file(dir.path(), "file.txt", "a\nb\nc\n", "base");
    let c2 = commit_file(dir.path(), "file.txt", "a\nB\nc\n", "uppercase");
    let c3 = commit_file(dir.path(), "file.txt", "a\nbee\nc\n", "spelled out");

    let engine = PatchEngine::new();
    let p2 = engine.extract_patches(&repo, &c2)?;
    let mut p3 = engine.extract_patches(&repo, &c3)?;

    let mut patches = p2;
    patches.append(&mut p3);
    let conflicts = detect_patch_conflicts(&patches);

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].id, "file.txt:2");
    assert_eq!(conflicts[0].kind, ConflictKind::Content);

    // The repo-aware variant agrees.
    let full = engine.detect_conflicts(&repo, &patches, &c1)?;
    assert!(full.iter().any(|c| c.id == "file.txt:2"));

    Ok(())
}

#[test]
fn detection_against_target_flags_divergence() -> Result<()> {
    let (_dir, repo, _c1, c2, c3) = scenario_repo();
    let engine = PatchEngine::new();

    // c2's patch against c3 (which contains c2's change): no divergence.
    let patches = engine.extract_patches(&repo, &c2)?;
    let conflicts = engine.detect_conflicts(&repo, &patches, &c3)?;
    assert!(conflicts.is_empty(), "unexpected: {conflicts:?}");

    Ok(())
}

#[test]
fn detection_is_order_independent_on_real_patches() -> Result<()> {
    let (dir, repo) = common::setup_repo();
    let _c1 = commit_file(dir.path(), "f", "1\n2\n3\n4\n5\n6\n", "base");
    let c2 = commit_file(dir.path(), "f", "1\nX\n3\n4\n5\n6\n", "x");
    let c3 = commit_file(dir.path(), "f", "1\nY\n3\n4\n5\n6\n", "y");
    let c4 = commit_file(dir.path(), "f", "1\nY\n3\n4\nZ\n6\n", "z");

    let engine = PatchEngine::new();
    let mut all = Vec::new();
    for c in [&c2, &c3, &c4] {
        all.extend(engine.extract_patches(&repo, c)?);
    }

    let forward: Vec<String> = detect_patch_conflicts(&all)
        .into_iter()
        .map(|c| c.id)
        .collect();
    all.reverse();
    let reversed: Vec<String> = detect_patch_conflicts(&all)
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(forward, reversed);
    assert!(!forward.is_empty());

    Ok(())
}

// ---------------------------------------------------------------------------
// Property: diff → parse → apply round-trips arbitrary text
// ---------------------------------------------------------------------------

/// Lines without newlines or diff-prefix ambiguity.
fn line_strategy() -> impl Strategy<Value = String> {
    "[ -~]{0,12}".prop_map(|s| s.replace('\\', "/"))
}

fn file_strategy() -> impl Strategy<Value = String> {
    (
        proptest::collection::vec(line_strategy(), 0..24),
        proptest::bool::ANY,
    )
        .prop_map(|(lines, trailing)| {
            if lines.is_empty() {
                String::new()
            } else if trailing {
                format!("{}\n", lines.join("\n"))
            } else {
                lines.join("\n")
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_edits_round_trip(old in file_strategy(), new in file_strategy()) {
        let mut repo = InMemoryRepository::new("main");
        let _c1 = repo.commit_files("old", &[("f.txt", &old)]);
        let c2 = repo.commit_files("new", &[("f.txt", &new)]);

        let parent = repo.commit_info(&c2).unwrap().first_parent().cloned();
        let diff = repo.tree_to_tree_diff(parent.as_ref(), &c2).unwrap();
        let patches = parse_unified_diff(&diff, &c2).unwrap();

        if old == new {
            prop_assert!(patches.is_empty() || patches[0].hunks.is_empty());
        } else {
            prop_assert_eq!(patches.len(), 1);
            let applied = apply_patch(&old, &patches[0]).unwrap();
            prop_assert_eq!(applied, new);
        }
    }

    #[test]
    fn conflict_ids_stable_under_permutation(seed in 0u64..1000) {
        // Three synthetic patches over one file, shuffled by seed.
        let mut repo = InMemoryRepository::new("main");
        let base: String = (1..=12).map(|n| format!("l{n}\n")).collect();
        let _c1 = repo.commit_files("base", &[("f", &base)]);

        let mut ids: Vec<CommitId> = Vec::new();
        for (i, line) in [2usize, 2, 9].iter().enumerate() {
            let mut edited: Vec<String> = (1..=12).map(|n| format!("l{n}")).collect();
            edited[line - 1] = format!("edit{i}");
            let content = format!("{}\n", edited.join("\n"));
            // Each patch is taken from its own commit off the same base.
            let c = repo.commit_files(&format!("edit {i}"), &[("f", &content)]);
            ids.push(c.clone());
            // Rewind the branch so the next commit also bases on c1.
            let head_ref = "refs/heads/main".to_owned();
            let c1 = repo.commit_info(&c).unwrap().first_parent().unwrap().clone();
            repo.update_ref(&head_ref, &c, &c1).unwrap();
        }

        let engine = PatchEngine::new();
        let mut patches = Vec::new();
        for id in &ids {
            patches.extend(engine.extract_patches(&repo, id).unwrap());
        }
        // Deterministic pseudo-shuffle.
        patches.rotate_left((seed % 3) as usize);
        if seed % 2 == 0 {
            patches.reverse();
        }

        let conflict_ids: Vec<String> = detect_patch_conflicts(&patches)
            .into_iter()
            .map(|c| c.id)
            .collect();
        prop_assert_eq!(conflict_ids, vec!["f:2".to_owned()]);
    }
}
