//! Extraction / application round-trip properties on real history.

mod common;

use anyhow::Result;
use std::path::Path;

use patchdance::diff::apply_patch;
use patchdance::model::Patch;
use patchdance::repo::{Repository, TreeEntry};
use patchdance::PatchEngine;

use common::{commit_all, commit_file, run_git, setup_repo, write_file};

/// Apply every patch of `commit` onto its parent's tree through the port
/// and return the resulting tree id.
fn rebuild_tree(
    repo: &patchdance::repo::GitCliRepository,
    parent: Option<&patchdance::model::CommitId>,
    patches: &[Patch],
) -> Result<patchdance::model::TreeId> {
    let mut entries = Vec::new();
    for patch in patches {
        let path = patch.target_file.as_path();
        if patch.is_deletion() {
            entries.push(TreeEntry::remove(path));
            continue;
        }
        if let Some(old) = &patch.renamed_from {
            entries.push(TreeEntry::remove(old));
        }
        let pre_image = patch.renamed_from.as_deref().unwrap_or(path);
        let base = match parent {
            Some(p) => repo
                .read_blob(p, pre_image)?
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default(),
            None => String::new(),
        };
        let content = apply_patch(&base, patch)?;
        let mode = patch
            .mode_change
            .and_then(|mc| mc.resulting_mode())
            .or(match parent {
                Some(p) => repo.read_mode(p, pre_image)?,
                None => None,
            })
            .unwrap_or(0o100644);
        entries.push(TreeEntry::write(path, mode, content.into_bytes()));
    }
    Ok(repo.write_tree(parent, &entries)?)
}

#[test]
fn every_commit_in_a_linear_history_round_trips() -> Result<()> {
    // Fifty commits of mixed edits, adds, and deletes across three files;
    // each commit's patches, applied onto its parent, must reproduce its
    // exact tree.
    let (dir, repo) = setup_repo();
    let engine = PatchEngine::new();

    let mut lines: Vec<String> = (1..=10).map(|n| format!("line {n}")).collect();
    commit_file(
        dir.path(),
        "main.txt",
        &format!("{}\n", lines.join("\n")),
        "initial",
    );

    for i in 0..49 {
        match i % 5 {
            0 => {
                // Rewrite a line.
                let idx = (i * 3) % lines.len();
                lines[idx] = format!("line {idx} (edit {i})");
                write_file(dir.path(), "main.txt", &format!("{}\n", lines.join("\n")));
            }
            1 => {
                // Append a line.
                lines.push(format!("appended {i}"));
                write_file(dir.path(), "main.txt", &format!("{}\n", lines.join("\n")));
            }
            2 => {
                // Touch a second file.
                write_file(dir.path(), "side.txt", &format!("side content {i}\n"));
            }
            3 => {
                // Add a throwaway file.
                write_file(dir.path(), &format!("tmp-{i}.txt"), "temporary\n");
            }
            _ => {
                // Delete the previous throwaway file.
                let victim = dir.path().join(format!("tmp-{}.txt", i - 1));
                std::fs::remove_file(victim)?;
            }
        }
        commit_all(dir.path(), &format!("step {i}"));
    }

    let head = repo.head()?;
    let history = repo.walk_history(&head, 100)?;
    assert_eq!(history.len(), 50);

    for info in &history {
        let patches = engine.extract_patches(&repo, &info.id)?;
        if !info.files_changed.is_empty() {
            assert!(
                !patches.is_empty(),
                "commit {} has a non-empty diff but no patches",
                info.id.short()
            );
        }
        for patch in &patches {
            assert_eq!(patch.source_commit, info.id);
        }
        let rebuilt = rebuild_tree(&repo, info.first_parent(), &patches)?;
        assert_eq!(
            rebuilt,
            repo.commit_tree_id(&info.id)?,
            "tree mismatch for commit {} ({})",
            info.id.short(),
            info.summary()
        );
    }

    Ok(())
}

#[test]
fn root_commit_extracts_against_empty_tree() -> Result<()> {
    let (dir, repo) = setup_repo();
    write_file(dir.path(), "a.txt", "alpha\n");
    write_file(dir.path(), "b/b.txt", "beta\n");
    let root = commit_all(dir.path(), "root");

    let engine = PatchEngine::new();
    let patches = engine.extract_patches(&repo, &root)?;
    assert_eq!(patches.len(), 2);
    assert!(patches.iter().all(Patch::is_new_file));

    let rebuilt = rebuild_tree(&repo, None, &patches)?;
    assert_eq!(rebuilt, repo.commit_tree_id(&root)?);

    Ok(())
}

#[test]
fn patch_content_round_trips_textually() -> Result<()> {
    // Invariant: apply(content_at(parent), patch) == content_at(commit).
    let (dir, repo) = setup_repo();
    let c1 = commit_file(
        dir.path(),
        "code.rs",
        "fn a() {}\nfn b() {}\nfn c() {}\n",
        "c1",
    );
    let c2 = commit_file(
        dir.path(),
        "code.rs",
        "fn a() {}\nfn b(x: u32) -> u32 { x }\nfn c() {}\nfn d() {}\n",
        "c2",
    );

    let engine = PatchEngine::new();
    let patches = engine.extract_patches(&repo, &c2)?;
    assert_eq!(patches.len(), 1);

    let base = common::file_at(&repo, &c1, "code.rs").unwrap();
    let expected = common::file_at(&repo, &c2, "code.rs").unwrap();
    assert_eq!(apply_patch(&base, &patches[0])?, expected);

    Ok(())
}

#[test]
fn missing_trailing_newline_round_trips() -> Result<()> {
    let (dir, repo) = setup_repo();
    let c1 = commit_file(dir.path(), "f", "a\nb\nc", "no trailing newline");
    let c2 = commit_file(dir.path(), "f", "a\nB\nc", "still none");
    let c3 = commit_file(dir.path(), "f", "a\nB\nc\n", "gains newline");

    let engine = PatchEngine::new();

    let base1 = common::file_at(&repo, &c1, "f").unwrap();
    let p2 = engine.extract_patches(&repo, &c2)?;
    assert_eq!(apply_patch(&base1, &p2[0])?, "a\nB\nc");

    let base2 = common::file_at(&repo, &c2, "f").unwrap();
    let p3 = engine.extract_patches(&repo, &c3)?;
    assert_eq!(apply_patch(&base2, &p3[0])?, "a\nB\nc\n");

    Ok(())
}

#[test]
fn file_mode_changes_survive_extraction() -> Result<()> {
    let (dir, repo) = setup_repo();
    commit_file(dir.path(), "run.sh", "#!/bin/sh\necho hi\n", "add script");
    run_git(dir.path(), &["update-index", "--chmod=+x", "run.sh"]);
    run_git(dir.path(), &["commit", "-m", "make executable"]);
    let head = repo.head()?;

    let engine = PatchEngine::new();
    let patches = engine.extract_patches(&repo, &head)?;
    assert_eq!(patches.len(), 1);
    assert_eq!(
        patches[0].mode_change,
        Some(patchdance::model::ModeChange::Changed {
            old_mode: 0o100644,
            new_mode: 0o100755,
        })
    );

    let rebuilt = rebuild_tree(
        &repo,
        repo.commit_info(&head)?.first_parent(),
        &patches,
    )?;
    assert_eq!(rebuilt, repo.commit_tree_id(&head)?);

    Ok(())
}

#[test]
fn binary_blob_extraction_is_flagged() -> Result<()> {
    let (dir, repo) = setup_repo();
    std::fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150])?;
    let root = commit_all(dir.path(), "binary");

    let engine = PatchEngine::new();
    let patches = engine.extract_patches(&repo, &root)?;
    assert_eq!(patches.len(), 1);
    assert!(patches[0].is_binary);
    assert!(patches[0].hunks.is_empty());

    // Textual application refuses binary patches.
    assert!(apply_patch("", &patches[0]).is_err());

    Ok(())
}

#[test]
fn empty_patch_is_noop() -> Result<()> {
    let (dir, repo) = setup_repo();
    let c1 = commit_file(dir.path(), "f", "x\n", "c1");
    let engine = PatchEngine::new();
    let patches = engine.extract_patches(&repo, &c1)?;

    // A patch stripped of hunks applies as the identity.
    let mut stripped = patches[0].clone();
    stripped.hunks.clear();
    stripped.mode_change = None;
    assert_eq!(apply_patch("anything\n", &stripped)?, "anything\n");

    Ok(())
}

#[test]
fn rename_extraction_records_source() -> Result<()> {
    let (dir, repo) = setup_repo();
    let content = "fn example() { println!(\"hello world\"); }\n".repeat(5);
    commit_file(dir.path(), "old_name.rs", &content, "add file");
    run_git(dir.path(), &["mv", "old_name.rs", "new_name.rs"]);
    run_git(dir.path(), &["commit", "-m", "rename"]);
    let head = repo.head()?;

    let engine = PatchEngine::new();
    let patches = engine.extract_patches(&repo, &head)?;
    assert_eq!(patches.len(), 1);
    assert_eq!(
        patches[0].target_file,
        Path::new("new_name.rs")
    );
    assert_eq!(
        patches[0].renamed_from.as_deref(),
        Some(Path::new("old_name.rs"))
    );

    Ok(())
}

#[test]
fn rename_commit_rebuilds_its_tree() -> Result<()> {
    let (dir, repo) = setup_repo();
    let content = "fn example() { println!(\"hello world\"); }\n".repeat(5);
    commit_file(dir.path(), "old_name.rs", &content, "add file");
    run_git(dir.path(), &["mv", "old_name.rs", "new_name.rs"]);
    run_git(dir.path(), &["commit", "-m", "rename"]);
    let head = repo.head()?;

    let engine = PatchEngine::new();
    let patches = engine.extract_patches(&repo, &head)?;
    let rebuilt = rebuild_tree(
        &repo,
        repo.commit_info(&head)?.first_parent(),
        &patches,
    )?;
    assert_eq!(rebuilt, repo.commit_tree_id(&head)?);

    Ok(())
}
