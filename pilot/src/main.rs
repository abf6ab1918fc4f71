//! CLI entry point for the pilot.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use pilot::autopilot::Autopilot;
use pilot::core::planner::WorkPlanner;
use pilot::edit::engine::{EditEngine, EditStatus};
use pilot::io::config::load_config;
use pilot::io::intel::{GitIntelSource, IntelSource};
use pilot::io::repo::RepoOperations;

#[derive(Parser)]
#[command(name = "pilot", version, about = "Autonomous code-change pipeline")]
struct Cli {
    /// Repository to operate on.
    #[arg(long, default_value = ".", global = true)]
    repo: PathBuf,

    /// Path to the pilot config file (missing file means defaults).
    #[arg(long, default_value = "pilot.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan a goal and print the change plan as Markdown.
    Plan {
        /// Goal to decompose.
        goal: String,
    },
    /// Preview a unified diff without writing: guardrails, counts, content.
    Preview {
        /// Path to a file containing the unified diff.
        diff: PathBuf,
    },
    /// Apply a unified diff to the working tree under guardrails.
    Apply {
        /// Path to a file containing the unified diff.
        diff: PathBuf,
        /// Simulate the application without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Execute a goal end to end: plan, branch, edit, validate, commit.
    Run {
        /// Goal to execute.
        goal: String,
    },
    /// Print the current repository state as JSON.
    Status,
}

fn main() {
    pilot::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let timeout = Duration::from_secs(config.command_timeout_secs);

    match cli.command {
        Command::Plan { goal } => {
            let intel = GitIntelSource::new(&cli.repo, timeout, config.command_output_limit_bytes)
                .gather()?;
            let planner = WorkPlanner::default();
            let graph = planner.plan(&goal, &intel);
            let tests = planner.test_plan(&graph);
            print!("{}", planner.changeplan_md(&graph, &tests));
            Ok(())
        }
        Command::Preview { diff } => {
            let diff = fs::read_to_string(&diff)
                .with_context(|| format!("read diff {}", diff.display()))?;
            let engine = EditEngine::new(
                &cli.repo,
                config.guardrails.clone(),
                config.conflict_resolution.clone(),
            );
            let preview = engine.get_patch_preview(&diff);
            println!("{}", serde_json::to_string_pretty(&preview)?);
            Ok(())
        }
        Command::Apply { diff, dry_run } => {
            let diff = fs::read_to_string(&diff)
                .with_context(|| format!("read diff {}", diff.display()))?;
            let engine = EditEngine::new(
                &cli.repo,
                config.guardrails.clone(),
                config.conflict_resolution.clone(),
            );
            let result = engine.apply_patch(&diff, dry_run || config.dry_run);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.status != EditStatus::Success {
                bail!("patch not applied: {}", result.message);
            }
            Ok(())
        }
        Command::Run { goal } => {
            let intel = GitIntelSource::new(&cli.repo, timeout, config.command_output_limit_bytes);
            let pilot = Autopilot::new(&cli.repo, config, intel);
            let result = pilot.execute_goal(&goal, None);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                bail!("execution failed: {}", result.message);
            }
            Ok(())
        }
        Command::Status => {
            let repo = RepoOperations::new(&cli.repo, timeout, config.command_output_limit_bytes);
            let state = repo.repository_state()?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_command() {
        let cli = Cli::parse_from(["pilot", "run", "Fix bug in parser"]);
        assert!(matches!(cli.command, Command::Run { ref goal } if goal == "Fix bug in parser"));
    }

    #[test]
    fn parse_apply_dry_run_flag() {
        let cli = Cli::parse_from(["pilot", "apply", "changes.diff", "--dry-run"]);
        assert!(matches!(cli.command, Command::Apply { dry_run: true, .. }));
    }

    #[test]
    fn repo_flag_defaults_to_current_dir() {
        let cli = Cli::parse_from(["pilot", "status"]);
        assert_eq!(cli.repo, PathBuf::from("."));
    }
}
