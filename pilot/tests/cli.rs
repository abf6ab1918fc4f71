//! CLI tests spawning the pilot binary against scratch repositories.

use std::process::Command;

use pilot::test_support::TestRepo;

fn pilot_cmd(repo: &TestRepo) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pilot"));
    cmd.current_dir(repo.path());
    cmd
}

#[test]
fn plan_prints_change_plan_markdown() {
    let repo = TestRepo::init();
    repo.write_file("parser.rs", "fn parse() {}\n");
    repo.commit_all("initial");

    let output = pilot_cmd(&repo)
        .args(["plan", "Fix bug in parser"])
        .output()
        .expect("pilot plan");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("# Change Plan"));
    assert!(stdout.contains("fix_implementation"));
    assert!(stdout.contains("## Test Plan"));
}

#[test]
fn status_reports_branch_and_cleanliness() {
    let repo = TestRepo::init();
    repo.write_file("a.txt", "hello\n");
    repo.commit_all("initial");

    let output = pilot_cmd(&repo).arg("status").output().expect("pilot status");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let state: serde_json::Value = serde_json::from_str(&stdout).expect("parse status json");
    assert_eq!(state["branch"], "main");
    assert_eq!(state["clean"], true);
}

#[test]
fn apply_dry_run_reports_success_without_writing() {
    let repo = TestRepo::init();
    repo.write_file("a.txt", "line1\nline2\n");
    repo.commit_all("initial");
    repo.write_file(
        "changes.diff",
        "--- a.txt\n+++ a.txt\n@@ -1,2 +1,3 @@\n line1\n+added\n line2\n",
    );

    let output = pilot_cmd(&repo)
        .args(["apply", "changes.diff", "--dry-run"])
        .output()
        .expect("pilot apply");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let result: serde_json::Value = serde_json::from_str(&stdout).expect("parse result json");
    assert_eq!(result["status"], "success");
    assert_eq!(repo.read_file("a.txt"), "line1\nline2\n");
}

#[test]
fn apply_blocked_patch_exits_nonzero() {
    let repo = TestRepo::init();
    repo.write_file("a.txt", "hello\n");
    repo.commit_all("initial");
    repo.write_file(
        "changes.diff",
        "--- .git/config\n+++ .git/config\n@@ -1,1 +1,2 @@\n core\n+x\n",
    );

    let output = pilot_cmd(&repo)
        .args(["apply", "changes.diff"])
        .output()
        .expect("pilot apply");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("patch not applied"));
}

#[test]
fn preview_counts_literal_additions_and_deletions() {
    let repo = TestRepo::init();
    repo.write_file("a.txt", "one\ntwo\n");
    repo.commit_all("initial");
    repo.write_file(
        "changes.diff",
        "--- a.txt\n+++ a.txt\n@@ -1,2 +1,2 @@\n-one\n+uno\n two\n",
    );

    let output = pilot_cmd(&repo)
        .args(["preview", "changes.diff"])
        .output()
        .expect("pilot preview");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let preview: serde_json::Value = serde_json::from_str(&stdout).expect("parse preview json");
    assert_eq!(preview["total_additions"], 1);
    assert_eq!(preview["total_deletions"], 1);
    assert_eq!(repo.read_file("a.txt"), "one\ntwo\n");
}
