//! Safe application of unified-diff patches to the working tree.
//!
//! The engine never writes before guardrails pass and a backup of every
//! touched file exists. Conflicts restore the backup, so a non-success result
//! always leaves the tree byte-identical to its pre-call state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::core::diff::{Hunk, PatchLine, PatchSet, parse_unified_diff};
use crate::edit::guardrails::{GuardrailConfig, GuardrailViolation, check_guardrails};

/// Outcome category of an edit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditStatus {
    Success,
    Conflict,
    Error,
    Blocked,
}

/// Result of one `apply_patch` call. Ephemeral; the engine persists nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditResult {
    pub status: EditStatus,
    pub files_touched: Vec<String>,
    pub idempotent: bool,
    pub message: String,
    pub conflicts: Vec<String>,
    pub diff_applied: String,
}

impl EditResult {
    fn error(message: String) -> Self {
        Self {
            status: EditStatus::Error,
            files_touched: Vec::new(),
            idempotent: false,
            message,
            conflicts: Vec::new(),
            diff_applied: String::new(),
        }
    }
}

/// Conflict-handling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Retry each conflicting hunk once, independently. This is a blind
    /// re-attempt of the same hunk against the re-read file, not a
    /// structural split.
    pub split_hunks: bool,
    /// Copy touched files aside before writing.
    pub backup_on_write: bool,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            split_hunks: true,
            backup_on_write: true,
        }
    }
}

/// Read-only preview of what a patch would do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPreview {
    pub status: EditStatus,
    pub files_affected: Vec<String>,
    pub total_additions: usize,
    pub total_deletions: usize,
    pub violations: Vec<GuardrailViolation>,
    pub idempotent: bool,
    pub patch_size_bytes: usize,
    /// Post-apply content per file, or a note when the hunks do not apply.
    pub previews: BTreeMap<String, String>,
    pub error: Option<String>,
}

/// Applies unified-diff patches under guardrails with idempotency and
/// conflict detection.
#[derive(Debug, Clone)]
pub struct EditEngine {
    repo_path: PathBuf,
    guardrails: GuardrailConfig,
    conflicts: ConflictConfig,
}

impl EditEngine {
    pub fn new(
        repo_path: impl Into<PathBuf>,
        guardrails: GuardrailConfig,
        conflicts: ConflictConfig,
    ) -> Self {
        Self {
            repo_path: repo_path.into(),
            guardrails,
            conflicts,
        }
    }

    /// Apply a unified diff to the repository.
    ///
    /// Never returns an error: every failure mode is reported through the
    /// result's status field. Only a real (non-dry) run with a clean
    /// guardrail pass and a non-idempotent patch touches disk, and only
    /// after a backup exists.
    pub fn apply_patch(&self, diff: &str, dry_run: bool) -> EditResult {
        let patch = match parse_unified_diff(diff) {
            Ok(patch) => patch,
            Err(err) => return EditResult::error(format!("failed to parse diff: {err:#}")),
        };
        let files_touched: Vec<String> =
            patch.paths().iter().map(|p| (*p).to_string()).collect();

        let violations = check_guardrails(&self.guardrails, &patch);
        if !violations.is_empty() {
            let listed: Vec<String> = violations
                .iter()
                .map(|v| format!("{}: {}", v.rule, v.reason))
                .collect();
            return EditResult {
                status: EditStatus::Blocked,
                files_touched: Vec::new(),
                idempotent: false,
                message: format!("guardrail violations: {}", listed.join("; ")),
                conflicts: Vec::new(),
                diff_applied: String::new(),
            };
        }

        if self.patch_already_applied(&patch) {
            return EditResult {
                status: EditStatus::Success,
                files_touched,
                idempotent: true,
                message: "no changes needed; patch already applied (idempotent)".to_string(),
                conflicts: Vec::new(),
                diff_applied: diff.to_string(),
            };
        }

        if dry_run {
            return self.dry_run(&patch, files_touched, diff);
        }

        self.apply_for_real(&patch, files_touched, diff)
    }

    /// Preview a patch without touching disk: guardrail verdict, literal
    /// add/remove counts, and in-memory post-apply content per file.
    pub fn get_patch_preview(&self, diff: &str) -> PatchPreview {
        let patch = match parse_unified_diff(diff) {
            Ok(patch) => patch,
            Err(err) => {
                return PatchPreview {
                    status: EditStatus::Error,
                    files_affected: Vec::new(),
                    total_additions: 0,
                    total_deletions: 0,
                    violations: Vec::new(),
                    idempotent: false,
                    patch_size_bytes: diff.len(),
                    previews: BTreeMap::new(),
                    error: Some(format!("{err:#}")),
                };
            }
        };

        let violations = check_guardrails(&self.guardrails, &patch);
        let (total_additions, total_deletions) = patch.change_counts();

        let mut previews = BTreeMap::new();
        for file in &patch.files {
            let mut lines = self.read_lines(&file.path);
            let content = if apply_hunks(&mut lines, &file.hunks).is_empty() {
                render_lines(&lines)
            } else {
                format!("preview unavailable for {}", file.path)
            };
            previews.insert(file.path.clone(), content);
        }

        PatchPreview {
            status: if violations.is_empty() {
                EditStatus::Success
            } else {
                EditStatus::Blocked
            },
            files_affected: patch.paths().iter().map(|p| (*p).to_string()).collect(),
            total_additions,
            total_deletions,
            violations,
            idempotent: self.patch_already_applied(&patch),
            patch_size_bytes: diff.len(),
            previews,
            error: None,
        }
    }

    fn dry_run(&self, patch: &PatchSet, files_touched: Vec<String>, diff: &str) -> EditResult {
        let mut conflicts = Vec::new();
        for file in &patch.files {
            let mut lines = self.read_lines(&file.path);
            for conflict in apply_hunks(&mut lines, &file.hunks) {
                conflicts.push(format!("{}:{}", file.path, conflict));
            }
        }

        if conflicts.is_empty() {
            EditResult {
                status: EditStatus::Success,
                files_touched,
                idempotent: false,
                message: "dry run: patch would apply cleanly (no writes performed)".to_string(),
                conflicts,
                diff_applied: diff.to_string(),
            }
        } else {
            EditResult {
                status: EditStatus::Conflict,
                files_touched,
                idempotent: false,
                message: "conflicts detected in dry run".to_string(),
                conflicts,
                diff_applied: String::new(),
            }
        }
    }

    fn apply_for_real(
        &self,
        patch: &PatchSet,
        files_touched: Vec<String>,
        diff: &str,
    ) -> EditResult {
        let backup = match PatchBackup::create(&self.repo_path, patch, &self.conflicts) {
            Ok(backup) => backup,
            Err(err) => return EditResult::error(format!("failed to create backup: {err:#}")),
        };

        let attempt = self.apply_all_files(patch);
        match attempt {
            Ok(mut conflicts) => {
                if !conflicts.is_empty() && self.conflicts.split_hunks {
                    conflicts = self.retry_conflicting_hunks(patch, conflicts);
                }
                if conflicts.is_empty() {
                    EditResult {
                        status: EditStatus::Success,
                        files_touched,
                        idempotent: false,
                        message: "patch applied successfully".to_string(),
                        conflicts,
                        diff_applied: diff.to_string(),
                    }
                } else {
                    if let Err(err) = backup.restore(&self.repo_path) {
                        warn!(err = %err, "backup restore failed after conflicts");
                    }
                    EditResult {
                        status: EditStatus::Conflict,
                        files_touched,
                        idempotent: false,
                        message: "failed to resolve conflicts after retries".to_string(),
                        conflicts,
                        diff_applied: String::new(),
                    }
                }
            }
            Err(err) => {
                if let Err(restore_err) = backup.restore(&self.repo_path) {
                    warn!(err = %restore_err, "backup restore failed after error");
                }
                EditResult::error(format!("error applying patch: {err:#}"))
            }
        }
    }

    /// Apply every file's hunks, writing each file once. Returns conflict
    /// keys (`path:hunkN`); I/O problems are errors, not conflicts.
    fn apply_all_files(&self, patch: &PatchSet) -> Result<Vec<String>> {
        let mut conflicts = Vec::new();
        for file in &patch.files {
            let mut lines = self.read_lines(&file.path);
            for conflict in apply_hunks(&mut lines, &file.hunks) {
                conflicts.push(format!("{}:{}", file.path, conflict));
            }
            self.write_lines(&file.path, &lines)?;
        }
        Ok(conflicts)
    }

    /// Re-attempt each conflicting hunk independently against the re-read
    /// file. Returns the conflicts that remain.
    fn retry_conflicting_hunks(&self, patch: &PatchSet, conflicts: Vec<String>) -> Vec<String> {
        let mut remaining = Vec::new();
        for conflict in conflicts {
            match self.retry_single_conflict(patch, &conflict) {
                Ok(true) => debug!(conflict = %conflict, "hunk applied on retry"),
                Ok(false) | Err(_) => remaining.push(conflict),
            }
        }
        remaining
    }

    fn retry_single_conflict(&self, patch: &PatchSet, conflict: &str) -> Result<bool> {
        let Some((path, hunk_ref)) = conflict.split_once(":hunk") else {
            return Ok(false);
        };
        let index: usize = match hunk_ref.parse::<usize>() {
            Ok(n) if n >= 1 => n - 1,
            _ => return Ok(false),
        };
        let Some(file) = patch.files.iter().find(|file| file.path == path) else {
            return Ok(false);
        };
        let Some(hunk) = file.hunks.get(index) else {
            return Ok(false);
        };

        let mut lines = self.read_lines(path);
        if apply_hunk(&mut lines, hunk).is_err() {
            return Ok(false);
        }
        self.write_lines(path, &lines)?;
        Ok(true)
    }

    /// True when every hunk's expected post-state is already present.
    fn patch_already_applied(&self, patch: &PatchSet) -> bool {
        for file in &patch.files {
            let full_path = self.repo_path.join(&file.path);
            if !full_path.exists() {
                return false;
            }
            let Ok(content) = fs::read_to_string(&full_path) else {
                return false;
            };
            let lines: Vec<&str> = content.lines().collect();
            for hunk in &file.hunks {
                if !hunk_already_applied(&lines, hunk) {
                    return false;
                }
            }
        }
        true
    }

    fn read_lines(&self, path: &str) -> Vec<String> {
        let full_path = self.repo_path.join(path);
        match fs::read_to_string(&full_path) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn write_lines(&self, path: &str, lines: &[String]) -> Result<()> {
        let full_path = self.repo_path.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&full_path, render_lines(lines))
            .with_context(|| format!("write {}", full_path.display()))
    }
}

/// Backup of every file a patch will touch, held in a temp directory under
/// each file's relative path. Files that did not exist pre-patch are
/// recorded so a restore can delete them again.
struct PatchBackup {
    dir: Option<TempDir>,
    existing: Vec<String>,
    missing: Vec<String>,
}

impl PatchBackup {
    fn create(repo_path: &Path, patch: &PatchSet, config: &ConflictConfig) -> Result<Self> {
        if !config.backup_on_write {
            return Ok(Self {
                dir: None,
                existing: Vec::new(),
                missing: Vec::new(),
            });
        }

        let dir = TempDir::with_prefix("pilot-edit-backup-").context("create backup dir")?;
        let mut existing = Vec::new();
        let mut missing = Vec::new();

        for path in patch.paths() {
            let source = repo_path.join(path);
            if source.exists() {
                let dest = dir.path().join(path);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create backup parent {}", parent.display()))?;
                }
                fs::copy(&source, &dest)
                    .with_context(|| format!("back up {}", source.display()))?;
                existing.push(path.to_string());
            } else {
                missing.push(path.to_string());
            }
        }

        Ok(Self {
            dir: Some(dir),
            existing,
            missing,
        })
    }

    /// Put every touched file back to its pre-patch state.
    fn restore(&self, repo_path: &Path) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        for path in &self.existing {
            let backup = dir.path().join(path);
            let dest = repo_path.join(path);
            fs::copy(&backup, &dest)
                .with_context(|| format!("restore {}", dest.display()))?;
        }
        for path in &self.missing {
            let dest = repo_path.join(path);
            if dest.exists() {
                fs::remove_file(&dest)
                    .with_context(|| format!("remove created file {}", dest.display()))?;
            }
        }
        Ok(())
    }
}

/// Apply a file's hunks bottom-up (sorted by `old_start` descending) so
/// earlier hunks' line numbers stay valid within the pass. Returns conflict
/// keys (`hunkN`, 1-based in original diff order) for hunks that did not
/// apply; applied hunks stay applied.
fn apply_hunks(lines: &mut Vec<String>, hunks: &[Hunk]) -> Vec<String> {
    let mut indexed: Vec<(usize, &Hunk)> = hunks.iter().enumerate().collect();
    indexed.sort_by(|a, b| b.1.old_start.cmp(&a.1.old_start));

    let mut conflicts = Vec::new();
    for (index, hunk) in indexed {
        if let Err(err) = apply_hunk(lines, hunk) {
            debug!(hunk = index + 1, err = %err, "hunk failed to apply");
            conflicts.push(format!("hunk{}", index + 1));
        }
    }
    conflicts
}

/// Cursor-based application of one hunk.
///
/// The cursor starts at `old_start - 1`. A context line must match the line
/// under the cursor and advances it; a removal must match and deletes without
/// advancing (later lines shift up); an addition inserts and advances. Any
/// index overrun or content mismatch aborts the hunk.
fn apply_hunk(lines: &mut Vec<String>, hunk: &Hunk) -> Result<(), String> {
    let mut pos = hunk.old_start.saturating_sub(1);
    let snapshot = lines.clone();

    for line in &hunk.lines {
        match line {
            PatchLine::Context(expected) => {
                if pos >= lines.len() || lines[pos] != *expected {
                    *lines = snapshot;
                    return Err(format!("context mismatch at line {}", pos + 1));
                }
                pos += 1;
            }
            PatchLine::Remove(expected) => {
                if pos >= lines.len() || lines[pos] != *expected {
                    *lines = snapshot;
                    return Err(format!("removal mismatch at line {}", pos + 1));
                }
                lines.remove(pos);
            }
            PatchLine::Add(text) => {
                if pos > lines.len() {
                    *lines = snapshot;
                    return Err(format!("insert position {} out of range", pos + 1));
                }
                lines.insert(pos, text.clone());
                pos += 1;
            }
        }
    }
    Ok(())
}

/// True when the hunk's expected post-state (context + added lines) is
/// already present at the hunk's target offset.
fn hunk_already_applied(lines: &[&str], hunk: &Hunk) -> bool {
    let expected: Vec<&str> = hunk
        .lines
        .iter()
        .filter_map(|line| match line {
            PatchLine::Context(text) | PatchLine::Add(text) => Some(text.as_str()),
            PatchLine::Remove(_) => None,
        })
        .collect();
    if expected.is_empty() {
        return true;
    }

    let start = hunk.new_start.saturating_sub(1);
    let end = start + expected.len();
    if end > lines.len() {
        return false;
    }
    lines[start..end] == expected[..]
}

fn render_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
