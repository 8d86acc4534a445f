mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::{create_test_tree, list_files, root_of, write_plan};
use predicates::prelude::*;

#[test]
fn test_apply_flushes_plan() {
    let temp = create_test_tree();
    let root = root_of(&temp);
    let (_plan_dir, plan) = write_plan(
        "# reorganize\n\
         mkdir out\n\
         mv a out/a\n\
         rm notes.txt\n\
         write README.md hello world\n",
    );

    let mut cmd = cargo_bin_cmd!("stagefs");
    cmd.arg("apply")
        .arg(&plan)
        .arg("--root")
        .arg(&root)
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Changes applied"))
        .stdout(predicate::str::contains("a → out/a"))
        .stdout(predicate::str::contains("3 operations applied"));

    assert_eq!(
        list_files(&root),
        vec!["README.md", "b/three.txt", "out/a/one.txt", "out/a/sub/two.txt"]
    );
    assert_eq!(
        std::fs::read_to_string(root.join("README.md")).unwrap(),
        "hello world"
    );
}

#[test]
fn test_apply_dry_run_changes_nothing_but_writes() {
    let temp = create_test_tree();
    let root = root_of(&temp);
    let (_plan_dir, plan) = write_plan("rmdir a\nrm b/three.txt\n");

    let mut cmd = cargo_bin_cmd!("stagefs");
    cmd.arg("apply")
        .arg(&plan)
        .arg("--root")
        .arg(&root)
        .arg("--dry-run")
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"))
        .stdout(predicate::str::contains("Deleted directories (1 item)"))
        .stdout(predicate::str::contains("b/three.txt"));

    assert!(root.join("a/one.txt").exists());
    assert!(root.join("b/three.txt").exists());
}

#[test]
fn test_apply_save_only_touches_subtree() {
    let temp = create_test_tree();
    let root = root_of(&temp);
    let (_plan_dir, plan) = write_plan("mkdir x/y\nrm notes.txt\nrm x/y/none.txt\n");

    let mut cmd = cargo_bin_cmd!("stagefs");
    cmd.arg("apply")
        .arg(&plan)
        .arg("--root")
        .arg(&root)
        .arg("--save")
        .arg("x")
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 operation(s) outside x still queued"))
        .stdout(predicate::str::contains("deleteFile"));

    assert!(root.join("x/y").is_dir());
    assert!(root.join("notes.txt").exists());
}

#[test]
fn test_ls_shows_overlay_listing() {
    let temp = create_test_tree();
    let root = root_of(&temp);
    let (_plan_dir, plan) = write_plan("rm a/one.txt\nmkdir a/fresh\ncp b a/b-copy\n");

    let mut cmd = cargo_bin_cmd!("stagefs");
    cmd.arg("ls")
        .arg(&plan)
        .arg("a")
        .arg("--root")
        .arg(&root)
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::eq("b-copy/\nfresh/\nsub/\n"));

    assert!(root.join("a/one.txt").exists());
    assert!(!root.join("a/fresh").exists());
}

#[test]
fn test_invalid_plan_reports_line() {
    let temp = create_test_tree();
    let root = root_of(&temp);
    let (_plan_dir, plan) = write_plan("mkdir ok\nmv just-one\n");

    let mut cmd = cargo_bin_cmd!("stagefs");
    cmd.arg("apply")
        .arg(&plan)
        .arg("--root")
        .arg(&root)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid plan (line 2)"));

    assert!(!root.join("ok").exists());
}

#[test]
fn test_write_under_queued_move_is_refused() {
    let temp = create_test_tree();
    let root = root_of(&temp);
    let (_plan_dir, plan) = write_plan("mv a elsewhere\nwrite a/new.txt text\n");

    let mut cmd = cargo_bin_cmd!("stagefs");
    cmd.arg("apply")
        .arg(&plan)
        .arg("--root")
        .arg(&root)
        .env("NO_COLOR", "1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("external operations"))
        .stderr(predicate::str::contains("move: "));

    assert!(root.join("a/one.txt").exists());
    assert!(!root.join("elsewhere").exists());
}

#[test]
fn test_missing_root_fails() {
    let (_plan_dir, plan) = write_plan("mkdir x\n");

    let mut cmd = cargo_bin_cmd!("stagefs");
    cmd.arg("apply")
        .arg(&plan)
        .arg("--root")
        .arg("/definitely/not/here")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Directory not found"));
}

#[test]
fn test_failed_flush_reports_unapplied() {
    let temp = create_test_tree();
    let root = root_of(&temp);
    let (_plan_dir, plan) = write_plan("rm notes.txt\nmv ghost haunted\nmkdir later\n");

    let mut cmd = cargo_bin_cmd!("stagefs");
    cmd.arg("apply")
        .arg(&plan)
        .arg("--root")
        .arg(&root)
        .env("NO_COLOR", "1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 operation(s) left unapplied"));

    assert!(!root.join("notes.txt").exists());
    assert!(!root.join("later").exists());
}
