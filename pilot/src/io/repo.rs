//! Git and GitHub adapter for the pilot.
//!
//! All version-control side effects go through this wrapper so they stay
//! uniform: every call runs under a wall-clock timeout and reports through
//! [`GitResult`] instead of panicking or leaking raw process errors.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Outcome of one git/gh invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitResult {
    pub success: bool,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
}

impl GitResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            stdout: String::new(),
            stderr: String::new(),
            return_code: -1,
        }
    }
}

/// Snapshot of where the repository currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    pub branch: String,
    pub sha: String,
    pub clean: bool,
    pub changed_files: Vec<String>,
    /// RFC 3339 time the state was read.
    pub timestamp: String,
}

/// Wrapper for executing git (and gh) commands in a working directory.
#[derive(Debug, Clone)]
pub struct RepoOperations {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl RepoOperations {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True when `git status --porcelain` reports nothing (untracked files
    /// included).
    pub fn is_clean(&self) -> Result<bool> {
        let result = self.run_git(&["status", "--porcelain", "-uall"]);
        if !result.success {
            return Err(anyhow::anyhow!("git status failed: {}", result.message));
        }
        Ok(result.stdout.trim().is_empty())
    }

    /// Porcelain status lines, one per changed or untracked file.
    pub fn status_porcelain(&self) -> Result<Vec<String>> {
        let result = self.run_git(&["status", "--porcelain", "-uall"]);
        if !result.success {
            return Err(anyhow::anyhow!("git status failed: {}", result.message));
        }
        Ok(result
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn current_branch(&self) -> Result<String> {
        let result = self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"]);
        if !result.success {
            return Err(anyhow::anyhow!(
                "git rev-parse failed: {}",
                result.message
            ));
        }
        Ok(result.stdout.trim().to_string())
    }

    pub fn current_sha(&self) -> Result<String> {
        let result = self.run_git(&["rev-parse", "HEAD"]);
        if !result.success {
            return Err(anyhow::anyhow!(
                "git rev-parse failed: {}",
                result.message
            ));
        }
        Ok(result.stdout.trim().to_string())
    }

    /// Branch, SHA, cleanliness and changed paths in one call.
    pub fn repository_state(&self) -> Result<RepositoryState> {
        // Rename entries come through as `R  old -> new`; report both sides.
        let changed_files: Vec<String> = self
            .status_porcelain()?
            .iter()
            .filter_map(|line| line.get(3..))
            .flat_map(|entry| entry.split(" -> "))
            .map(str::to_string)
            .collect();
        Ok(RepositoryState {
            branch: self.current_branch()?,
            sha: self.current_sha()?,
            clean: changed_files.is_empty(),
            changed_files,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Create and check out a feature branch named from the goal, cut from
    /// the given base branch.
    ///
    /// The goal is sanitized into a branch slug (lowercased, spaces and
    /// underscores become dashes, everything but alphanumerics and dashes
    /// dropped, capped at 30 characters) and prefixed.
    #[instrument(skip_all, fields(prefix, base))]
    pub fn create_feature_branch(&self, goal: &str, prefix: &str, base: &str) -> GitResult {
        let branch = format!("{prefix}/{}", sanitize_branch_name(goal));
        debug!(branch = %branch, base, "creating feature branch");
        let mut result = self.run_git(&["checkout", "-b", &branch, base]);
        if result.success {
            result.message = branch;
        }
        result
    }

    /// Stage changes and commit with a `summary\n\ndetails` message. Stages
    /// only the given paths when provided, everything otherwise.
    ///
    /// Succeeds with a "nothing to commit" message when the tree is clean.
    #[instrument(skip_all)]
    pub fn commit_changes(&self, summary: &str, details: &str, files: Option<&[String]>) -> GitResult {
        let add = match files {
            Some(paths) if !paths.is_empty() => {
                let mut args = vec!["add", "--"];
                args.extend(paths.iter().map(String::as_str));
                self.run_git(&args)
            }
            _ => self.run_git(&["add", "-A"]),
        };
        if !add.success {
            return add;
        }

        let staged = self.run_git(&["diff", "--cached", "--name-only"]);
        if staged.success && staged.stdout.trim().is_empty() {
            debug!("no staged changes, skipping commit");
            return GitResult {
                success: true,
                message: "No changes to commit".to_string(),
                stdout: String::new(),
                stderr: String::new(),
                return_code: 0,
            };
        }

        let message = if details.trim().is_empty() {
            summary.to_string()
        } else {
            format!("{summary}\n\n{details}")
        };
        self.run_git(&["commit", "-m", &message])
    }

    pub fn push(&self, branch: &str) -> GitResult {
        self.run_git(&["push", "-u", "origin", branch])
    }

    /// Push the branch, then open a pull request against the base branch via
    /// `gh`. A failed push skips PR creation.
    #[instrument(skip_all, fields(branch, base))]
    pub fn create_pr_for_branch(&self, branch: &str, base: &str, title: &str, body: &str) -> GitResult {
        let pushed = self.push(branch);
        if !pushed.success {
            warn!(branch, "push failed, skipping pull request");
            return pushed;
        }
        self.run_tool(
            "gh",
            &[
                "pr", "create", "--base", base, "--head", branch, "--title", title, "--body", body,
            ],
        )
    }

    pub fn checkout(&self, branch: &str) -> GitResult {
        self.run_git(&["checkout", branch])
    }

    pub fn reset_hard(&self, target: &str) -> GitResult {
        self.run_git(&["reset", "--hard", target])
    }

    fn run_git(&self, args: &[&str]) -> GitResult {
        self.run_tool("git", args)
    }

    fn run_tool(&self, program: &str, args: &[&str]) -> GitResult {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);

        let output = match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) => output,
            Err(err) => {
                warn!(program, err = %err, "command failed to run");
                return GitResult::failure(format!("{program} {}: {err:#}", args.join(" ")));
            }
        };

        if output.timed_out {
            return GitResult::failure(format!(
                "{program} {} timed out after {}s",
                args.join(" "),
                self.timeout.as_secs()
            ));
        }

        let stdout = output.stdout_text();
        let stderr = output.stderr_text();
        let return_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();
        let message = if success {
            format!("{program} {} succeeded", args.join(" "))
        } else {
            format!(
                "{program} {} failed: {}",
                args.join(" "),
                stderr.trim()
            )
        };
        GitResult {
            success,
            message,
            stdout,
            stderr,
            return_code,
        }
    }
}

/// Turn a free-form goal into a branch slug.
pub fn sanitize_branch_name(goal: &str) -> String {
    let mut slug = String::new();
    for ch in goal.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if ch == ' ' || ch == '_' || ch == '-' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        }
    }
    let slug = slug.trim_matches('-');
    let capped: String = slug.chars().take(30).collect();
    let capped = capped.trim_end_matches('-').to_string();
    if capped.is_empty() {
        "change".to_string()
    } else {
        capped
    }
}
