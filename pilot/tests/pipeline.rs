//! End-to-end pipeline tests driving `execute_goal` against scratch git
//! repositories.

use pilot::autopilot::Autopilot;
use pilot::io::config::PilotConfig;
use pilot::io::intel::StaticIntel;
use pilot::test_support::TestRepo;

fn config() -> PilotConfig {
    PilotConfig {
        auto_push: false,
        auto_create_pr: false,
        ..PilotConfig::default()
    }
}

fn intel_for(files: &[&str]) -> StaticIntel {
    StaticIntel::new(files.iter().map(|f| (*f).to_string()).collect(), Vec::new())
}

#[test]
fn dirty_tree_fails_safety_check_before_any_mutation() {
    let repo = TestRepo::init();
    repo.write_file("parser.rs", "fn parse() {}\n");
    repo.commit_all("initial");
    repo.write_file("parser.rs", "fn parse() { changed }\n");

    let pilot = Autopilot::new(repo.path(), config(), intel_for(&["parser.rs"]));
    let result = pilot.execute_goal("Fix bug in parser", None);

    assert!(!result.success);
    assert!(result.message.contains("Safety checks failed"));
    assert_eq!(result.tasks_completed, 0);
    assert_eq!(result.tasks_failed, 0);
    // Nothing mutated: still on the original branch, edits untouched.
    assert_eq!(repo.current_branch(), "main");
    assert_eq!(repo.read_file("parser.rs"), "fn parse() { changed }\n");
}

#[test]
fn dry_run_plans_and_branches_without_writing_files() {
    let repo = TestRepo::init();
    repo.write_file("parser.rs", "fn parse() {}\n");
    repo.commit_all("initial");

    let cfg = PilotConfig {
        dry_run: true,
        ..config()
    };
    let pilot = Autopilot::new(repo.path(), cfg, intel_for(&["parser.rs"]));
    let result = pilot.execute_goal("Fix bug in parser", None);

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.tasks_completed, 3);
    assert_eq!(result.tasks_failed, 0);
    // Edits were simulated, so there is nothing to commit.
    assert_eq!(result.message, "No changes to commit");
    assert!(result.commit_sha.is_none());
    assert_eq!(repo.read_file("parser.rs"), "fn parse() {}\n");
    assert_eq!(repo.current_branch(), "pilot/fix-bug-in-parser");
}

#[test]
fn real_run_edits_commits_and_reports_branch() {
    let repo = TestRepo::init();
    repo.write_file("parser.rs", "fn parse() {}\n");
    repo.commit_all("initial");

    let pilot = Autopilot::new(repo.path(), config(), intel_for(&["parser.rs"]));
    let result = pilot.execute_goal("Fix bug in parser", None);

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.tasks_completed, 3);
    assert_eq!(
        result.branch_created.as_deref(),
        Some("pilot/fix-bug-in-parser")
    );
    assert!(result.commit_sha.is_some());
    assert!(
        repo.read_file("parser.rs")
            .starts_with("// pilot: fix_implementation\n")
    );
    // The commit left the tree clean.
    assert!(repo.git_output(&["status", "--porcelain"]).trim().is_empty());
}

#[test]
fn task_cap_below_plan_size_fails_safety_check() {
    let repo = TestRepo::init();
    repo.write_file("parser.rs", "fn parse() {}\n");
    repo.commit_all("initial");

    let cfg = PilotConfig {
        max_tasks_per_run: 2,
        ..config()
    };
    let pilot = Autopilot::new(repo.path(), cfg, intel_for(&["parser.rs"]));
    let result = pilot.execute_goal("Fix bug in parser", None);

    assert!(!result.success);
    assert!(result.message.contains("exceeding limit"));
    assert_eq!(repo.current_branch(), "main");
}

#[test]
fn goal_without_edit_tasks_reports_no_changes() {
    let repo = TestRepo::init();
    repo.write_file("README.md", "# readme\n");
    repo.commit_all("initial");

    // No fix/implement keywords: only analyze + validate run, neither writes.
    let pilot = Autopilot::new(repo.path(), config(), intel_for(&["README.md"]));
    let result = pilot.execute_goal("Tidy up the docs wording", None);

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.tasks_completed, 2);
    assert_eq!(result.message, "No changes to commit");
    assert_eq!(repo.read_file("README.md"), "# readme\n");
}

#[test]
fn extra_context_feeds_the_plan_hash() {
    let repo = TestRepo::init();
    repo.write_file("a.rs", "fn a() {}\n");
    repo.commit_all("initial");

    let cfg = PilotConfig {
        dry_run: true,
        ..config()
    };
    let pilot = Autopilot::new(repo.path(), cfg, intel_for(&["a.rs"]));
    let extra = pilot::core::task::RepoIntel {
        files: vec!["extra.rs".to_string()],
        symbols: Vec::new(),
    };
    let result = pilot.execute_goal("Fix bug", Some(&extra));
    assert!(result.success, "errors: {:?}", result.errors);
}
