//! Repository intelligence gathering.
//!
//! Planning only needs a frozen view of the repository: tracked file paths
//! and any known symbols. The trait seam lets tests substitute a fixed view
//! for the git-backed one.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::core::task::RepoIntel;
use crate::io::process::run_command_with_timeout;

/// Source of repository intelligence for the planner.
pub trait IntelSource {
    fn gather(&self) -> Result<RepoIntel>;
}

/// Gathers intelligence from a real git repository via `git ls-files`.
#[derive(Debug, Clone)]
pub struct GitIntelSource {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl GitIntelSource {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
            output_limit_bytes,
        }
    }
}

impl IntelSource for GitIntelSource {
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    fn gather(&self) -> Result<RepoIntel> {
        let mut cmd = std::process::Command::new("git");
        cmd.arg("ls-files").current_dir(&self.workdir);

        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)?;
        if output.timed_out {
            return Err(anyhow!("git ls-files timed out"));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "git ls-files failed: {}",
                output.stderr_text().trim()
            ));
        }

        let files: Vec<String> = output
            .stdout_text()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        debug!(file_count = files.len(), "gathered repository intel");

        Ok(RepoIntel {
            files,
            symbols: Vec::new(),
        })
    }
}

/// Fixed intelligence, for planning against a known view of a repository.
#[derive(Debug, Clone, Default)]
pub struct StaticIntel {
    pub intel: RepoIntel,
}

impl StaticIntel {
    pub fn new(files: Vec<String>, symbols: Vec<String>) -> Self {
        Self {
            intel: RepoIntel { files, symbols },
        }
    }
}

impl IntelSource for StaticIntel {
    fn gather(&self) -> Result<RepoIntel> {
        Ok(self.intel.clone())
    }
}
