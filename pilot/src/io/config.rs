//! Pilot configuration stored as a TOML file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::edit::engine::ConflictConfig;
use crate::edit::guardrails::GuardrailConfig;

/// Pilot configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PilotConfig {
    /// Hard cap on tasks executed per run; tasks beyond it are skipped.
    pub max_tasks_per_run: usize,

    /// Push the feature branch after a successful run.
    pub auto_push: bool,

    /// Open a pull request after a successful push. Implies a push.
    pub auto_create_pr: bool,

    /// Refuse to start on a dirty working tree.
    pub safety_checks: bool,

    /// Snapshot the working tree before executing tasks.
    pub backup_enabled: bool,

    /// Simulate every mutating step without writing.
    pub dry_run: bool,

    /// Branch feature branches are cut from and pull requests target.
    pub base_branch: String,

    /// Prefix for generated feature branch names.
    pub branch_prefix: String,

    /// Per-subprocess wall-clock budget in seconds.
    pub command_timeout_secs: u64,

    /// Truncate subprocess stdout/stderr beyond this many bytes.
    pub command_output_limit_bytes: usize,

    pub guardrails: GuardrailConfig,
    pub conflict_resolution: ConflictConfig,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_run: 5,
            auto_push: false,
            auto_create_pr: false,
            safety_checks: true,
            backup_enabled: true,
            dry_run: false,
            base_branch: "main".to_string(),
            branch_prefix: "pilot".to_string(),
            command_timeout_secs: 30,
            command_output_limit_bytes: 100_000,
            guardrails: GuardrailConfig::default(),
            conflict_resolution: ConflictConfig::default(),
        }
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tasks_per_run == 0 {
            return Err(anyhow!("max_tasks_per_run must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        if self.base_branch.trim().is_empty() {
            return Err(anyhow!("base_branch must be non-empty"));
        }
        if self.branch_prefix.trim().is_empty() {
            return Err(anyhow!("branch_prefix must be non-empty"));
        }
        if self.guardrails.max_files_per_patch == 0 {
            return Err(anyhow!("guardrails.max_files_per_patch must be > 0"));
        }
        if self.guardrails.max_total_patch_bytes == 0 {
            return Err(anyhow!("guardrails.max_total_patch_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        let cfg = PilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
