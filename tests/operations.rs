//! End-to-end operation tests against real git repositories.

mod common;

use anyhow::Result;

use patchdance::model::{InsertPosition, NewCommit, Operation, PatchId};
use patchdance::repo::Repository;
use patchdance::rewrite::BACKUP_PREFIX;
use patchdance::PatchEngine;

use common::{commit_file, file_at, history, run_git, scenario_repo, setup_repo, write_file};

// ---------------------------------------------------------------------------
// MovePatch
// ---------------------------------------------------------------------------

#[test]
fn move_patch_between_two_commits() -> Result<()> {
    let (_dir, repo, c1, c2, c3) = scenario_repo();
    let engine = PatchEngine::new();

    let op = Operation::MovePatch {
        patch_id: PatchId::from_raw(format!("{}:file.txt", c2.short())),
        from_commit: c2.clone(),
        to_commit: c1.clone(),
        position: InsertPosition::AtBranchHead,
    };
    let result = engine.apply_operation(&repo, &op)?;
    assert!(result.success);

    // Branch head updated; leaf content unchanged.
    let new_head = repo.head()?;
    assert_ne!(new_head, c3);
    assert_eq!(file_at(&repo, &new_head, "file.txt").unwrap(), "a\nB\nc\nd\n");

    // The rewritten chain is c1' ← c3': c2 became empty and was elided.
    let chain = history(&repo);
    assert_eq!(chain.len(), 2);
    let new_c1 = chain[1].clone();
    assert_eq!(file_at(&repo, &new_c1, "file.txt").unwrap(), "a\nB\nc\n");
    let info = repo.commit_info(&new_c1)?;
    assert_eq!(info.message, "c1");

    // A backup ref preserves the pre-operation head.
    let backups = repo.list_refs(BACKUP_PREFIX)?;
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].1, c3);

    Ok(())
}

#[test]
fn move_patch_preserves_commit_metadata() -> Result<()> {
    let (_dir, repo, c1, c2, _c3) = scenario_repo();
    let engine = PatchEngine::new();
    let original = repo.commit_info(&c1)?;

    let op = Operation::MovePatch {
        patch_id: PatchId::from_raw(format!("{}:file.txt", c2.short())),
        from_commit: c2,
        to_commit: c1,
        position: InsertPosition::AtBranchHead,
    };
    engine.apply_operation(&repo, &op)?;

    let chain = history(&repo);
    let rewritten = repo.commit_info(chain.last().unwrap())?;
    assert_eq!(rewritten.message, original.message);
    assert_eq!(rewritten.author, original.author);
    assert_eq!(rewritten.email, original.email);
    assert_eq!(rewritten.timestamp, original.timestamp);

    Ok(())
}

#[test]
fn move_patch_to_later_commit() -> Result<()> {
    // Move c2's change forward into c3.
    let (_dir, repo, _c1, c2, c3) = scenario_repo();
    let engine = PatchEngine::new();

    let op = Operation::MovePatch {
        patch_id: PatchId::from_raw(format!("{}:file.txt", c2.short())),
        from_commit: c2,
        to_commit: c3,
        position: InsertPosition::AtBranchHead,
    };
    let result = engine.apply_operation(&repo, &op)?;
    assert!(result.success);

    let new_head = repo.head()?;
    assert_eq!(file_at(&repo, &new_head, "file.txt").unwrap(), "a\nB\nc\nd\n");

    // c2' is elided; the head's parent is the original c1.
    let chain = history(&repo);
    assert_eq!(chain.len(), 2);
    assert_eq!(file_at(&repo, &chain[1], "file.txt").unwrap(), "a\nb\nc\n");

    Ok(())
}

// ---------------------------------------------------------------------------
// SplitCommit
// ---------------------------------------------------------------------------

#[test]
fn split_commit_into_two() -> Result<()> {
    let (dir, repo) = setup_repo();
    let _c1 = commit_file(dir.path(), "seed.txt", "seed\n", "seed");
    write_file(dir.path(), "foo.py", "def foo(): pass\n");
    write_file(dir.path(), "bar.py", "def bar(): pass\n");
    let c2 = common::commit_all(dir.path(), "foo and bar");
    let original_tree = repo.commit_tree_id(&c2)?;

    let engine = PatchEngine::new();
    let op = Operation::SplitCommit {
        source_commit: c2.clone(),
        new_commits: vec![
            NewCommit {
                message: "foo".to_owned(),
                patches: vec![PatchId::from_raw(format!("{}:foo.py", c2.short()))],
            },
            NewCommit {
                message: "bar".to_owned(),
                patches: vec![PatchId::from_raw(format!("{}:bar.py", c2.short()))],
            },
        ],
    };
    let result = engine.apply_operation(&repo, &op)?;
    assert_eq!(result.new_commit_ids.len(), 2);

    // Two commits in order; the final tree equals the original.
    let chain = history(&repo);
    assert_eq!(chain.len(), 3);
    let head_info = repo.commit_info(&chain[0])?;
    assert_eq!(head_info.message, "bar");
    assert_eq!(repo.commit_info(&chain[1])?.message, "foo");
    assert_eq!(repo.commit_tree_id(&chain[0])?, original_tree);

    // The intermediate commit carries only foo.
    assert!(file_at(&repo, &chain[1], "bar.py").is_none());
    assert_eq!(
        file_at(&repo, &chain[1], "foo.py").unwrap(),
        "def foo(): pass\n"
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// MergeCommits
// ---------------------------------------------------------------------------

#[test]
fn merge_commits_squashes_contiguous_range() -> Result<()> {
    let (_dir, repo, c1, c2, c3) = scenario_repo();
    let engine = PatchEngine::new();
    let original_tree = repo.commit_tree_id(&c3)?;

    let op = Operation::MergeCommits {
        commit_ids: vec![c2, c3],
        message: "squashed".to_owned(),
    };
    let result = engine.apply_operation(&repo, &op)?;
    assert_eq!(result.new_commit_ids.len(), 1);

    let chain = history(&repo);
    assert_eq!(chain.len(), 2);
    let head_info = repo.commit_info(&chain[0])?;
    assert_eq!(head_info.message, "squashed");
    assert_eq!(head_info.parent_ids, vec![c1]);
    assert_eq!(repo.commit_tree_id(&chain[0])?, original_tree);

    Ok(())
}

// ---------------------------------------------------------------------------
// CreateCommit
// ---------------------------------------------------------------------------

#[test]
fn create_commit_from_patch_before_anchor() -> Result<()> {
    // A helper file added in c3 is lifted into its own commit before c2.
    let (dir, repo) = setup_repo();
    let _c1 = commit_file(dir.path(), "main.txt", "main\n", "c1");
    let c2 = commit_file(dir.path(), "main.txt", "main v2\n", "c2");
    write_file(dir.path(), "helper.txt", "helper\n");
    let c3 = common::commit_all(dir.path(), "c3 with helper");
    let original_tree = repo.commit_tree_id(&c3)?;

    let engine = PatchEngine::new();
    let op = Operation::CreateCommit {
        patches: vec![PatchId::from_raw(format!("{}:helper.txt", c3.short()))],
        message: "extract helper".to_owned(),
        position: InsertPosition::Before(c2.clone()),
    };
    let result = engine.apply_operation(&repo, &op)?;
    assert!(result.success);
    assert_eq!(result.new_commit_ids.len(), 1);

    let chain = history(&repo);
    // c1 ← extract helper ← c2'. Replaying c3 reproduces content the
    // synthesized commit already added, so c3' is empty and elided.
    assert_eq!(chain.len(), 3);
    let messages: Vec<String> = chain
        .iter()
        .map(|id| repo.commit_info(id).unwrap().message)
        .collect();
    assert!(messages.contains(&"extract helper".to_owned()));

    // Helper exists immediately after the synthesized commit.
    let created = chain
        .iter()
        .find(|id| repo.commit_info(id).unwrap().message == "extract helper")
        .unwrap();
    assert_eq!(file_at(&repo, created, "helper.txt").unwrap(), "helper\n");

    // Final tree unchanged.
    assert_eq!(repo.commit_tree_id(&chain[0])?, original_tree);

    Ok(())
}

#[test]
fn rename_commit_replays_correctly() -> Result<()> {
    // c2 renames a file; moving c3's unrelated patch back into c1 forces
    // c2 to be replayed onto a rewritten parent. The rename must carry
    // over: new path present, old path gone.
    let (dir, repo) = setup_repo();
    let rename_content = "fn example() { println!(\"hello world\"); }\n".repeat(5);
    write_file(dir.path(), "a.rs", &rename_content);
    write_file(dir.path(), "notes.txt", "one\ntwo\nthree\n");
    let c1 = common::commit_all(dir.path(), "c1");
    run_git(dir.path(), &["mv", "a.rs", "b.rs"]);
    run_git(dir.path(), &["commit", "-m", "rename a to b"]);
    write_file(dir.path(), "notes.txt", "one\ntwo\nthree\nfour\n");
    let c3 = common::commit_all(dir.path(), "c3");

    let engine = PatchEngine::new();
    let op = Operation::MovePatch {
        patch_id: PatchId::from_raw(format!("{}:notes.txt", c3.short())),
        from_commit: c3,
        to_commit: c1,
        position: InsertPosition::AtBranchHead,
    };
    let result = engine.apply_operation(&repo, &op)?;
    assert!(result.success);

    let head = repo.head()?;
    assert_eq!(file_at(&repo, &head, "b.rs").unwrap(), rename_content);
    assert!(file_at(&repo, &head, "a.rs").is_none());
    assert_eq!(
        file_at(&repo, &head, "notes.txt").unwrap(),
        "one\ntwo\nthree\nfour\n"
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// Preview (Scenario F)
// ---------------------------------------------------------------------------

#[test]
fn preview_is_idempotent_and_non_mutating() -> Result<()> {
    let (_dir, repo, c1, c2, c3) = scenario_repo();
    let engine = PatchEngine::new();

    let op = Operation::MovePatch {
        patch_id: PatchId::from_raw(format!("{}:file.txt", c2.short())),
        from_commit: c2,
        to_commit: c1,
        position: InsertPosition::AtBranchHead,
    };

    let first = engine.preview_operation(&repo, &op)?;
    let second = engine.preview_operation(&repo, &op)?;
    assert_eq!(serde_json::to_vec(&first)?, serde_json::to_vec(&second)?);

    assert_eq!(first.affected_commits.len(), 3);
    assert!(first.potential_conflicts.is_empty());
    assert_eq!(repo.head()?, c3);
    assert!(repo.list_refs(BACKUP_PREFIX)?.is_empty());

    Ok(())
}
