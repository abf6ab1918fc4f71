//! Pre-execution working tree snapshots used for rollback.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

const GIT_STATE_FILE: &str = "git_state.json";
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules"];

/// Where the repository stood when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitState {
    pub branch: String,
    pub sha: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

/// A copy of the working tree (minus VCS and build artifacts) held in a
/// temporary directory until explicitly discarded or dropped.
#[derive(Debug)]
pub struct Snapshot {
    dir: TempDir,
    git_state: GitState,
}

impl Snapshot {
    /// Copy the repository's tree into a fresh snapshot directory and record
    /// the given git state alongside it.
    #[instrument(skip_all, fields(repo = %repo_path.display()))]
    pub fn create(repo_path: &Path, git_state: GitState) -> Result<Self> {
        let dir = TempDir::with_prefix("pilot-snapshot-").context("create snapshot dir")?;
        copy_tree(repo_path, dir.path())?;

        let state_json =
            serde_json::to_string_pretty(&git_state).context("serialize git state")?;
        fs::write(dir.path().join(GIT_STATE_FILE), state_json).context("write git state")?;

        debug!(snapshot = %dir.path().display(), "snapshot created");
        Ok(Self { dir, git_state })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git_state(&self) -> &GitState {
        &self.git_state
    }

    /// Copy every snapshotted file back over the working tree and return the
    /// recorded git state so the caller can restore branch and SHA.
    #[instrument(skip_all, fields(repo = %repo_path.display()))]
    pub fn restore(&self, repo_path: &Path) -> Result<GitState> {
        restore_tree(self.dir.path(), repo_path)?;
        debug!("snapshot restored");
        Ok(self.git_state.clone())
    }

    /// Delete the snapshot directory. Dropping the snapshot has the same
    /// effect; this just makes the intent explicit and surfaces errors.
    pub fn discard(self) -> Result<()> {
        self.dir.close().context("remove snapshot dir")
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from).with_context(|| format!("read dir {}", from.display()))? {
        let entry = entry.context("read dir entry")?;
        let name = entry.file_name();
        let file_type = entry.file_type().context("stat dir entry")?;
        let source = entry.path();
        let dest = to.join(&name);

        if file_type.is_dir() {
            if SKIP_DIRS.iter().any(|skip| name == *skip) {
                continue;
            }
            fs::create_dir_all(&dest)
                .with_context(|| format!("create directory {}", dest.display()))?;
            copy_tree(&source, &dest)?;
        } else if file_type.is_file() {
            fs::copy(&source, &dest)
                .with_context(|| format!("copy {}", source.display()))?;
        } else {
            // Symlinks and other special files are not snapshotted.
            warn!(path = %source.display(), "skipping non-regular file");
        }
    }
    Ok(())
}

fn restore_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from).with_context(|| format!("read dir {}", from.display()))? {
        let entry = entry.context("read dir entry")?;
        let name = entry.file_name();
        if name == GIT_STATE_FILE {
            continue;
        }
        let file_type = entry.file_type().context("stat dir entry")?;
        let source = entry.path();
        let dest = to.join(&name);

        if file_type.is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("create directory {}", dest.display()))?;
            restore_tree(&source, &dest)?;
        } else if file_type.is_file() {
            fs::copy(&source, &dest)
                .with_context(|| format!("restore {}", dest.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GitState {
        GitState {
            branch: "main".to_string(),
            sha: "abc123".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn snapshot_copies_tree_and_records_state() {
        let repo = tempfile::tempdir().expect("tempdir");
        fs::write(repo.path().join("a.txt"), "hello\n").expect("write");
        fs::create_dir_all(repo.path().join("src")).expect("mkdir");
        fs::write(repo.path().join("src/lib.rs"), "pub fn f() {}\n").expect("write");

        let snapshot = Snapshot::create(repo.path(), state()).expect("create");
        assert!(snapshot.path().join("a.txt").exists());
        assert!(snapshot.path().join("src/lib.rs").exists());
        assert!(snapshot.path().join(GIT_STATE_FILE).exists());
        assert_eq!(snapshot.git_state().branch, "main");
    }

    #[test]
    fn snapshot_skips_vcs_and_build_dirs() {
        let repo = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(repo.path().join(".git")).expect("mkdir");
        fs::write(repo.path().join(".git/config"), "core\n").expect("write");
        fs::create_dir_all(repo.path().join("target")).expect("mkdir");
        fs::write(repo.path().join("target/out"), "bin\n").expect("write");
        fs::write(repo.path().join("keep.txt"), "keep\n").expect("write");

        let snapshot = Snapshot::create(repo.path(), state()).expect("create");
        assert!(!snapshot.path().join(".git").exists());
        assert!(!snapshot.path().join("target").exists());
        assert!(snapshot.path().join("keep.txt").exists());
    }

    #[test]
    fn restore_overwrites_modified_files() {
        let repo = tempfile::tempdir().expect("tempdir");
        fs::write(repo.path().join("a.txt"), "original\n").expect("write");

        let snapshot = Snapshot::create(repo.path(), state()).expect("create");
        fs::write(repo.path().join("a.txt"), "mutated\n").expect("write");

        let restored = snapshot.restore(repo.path()).expect("restore");
        assert_eq!(restored.sha, "abc123");
        assert_eq!(
            fs::read_to_string(repo.path().join("a.txt")).expect("read"),
            "original\n"
        );
        assert!(!repo.path().join(GIT_STATE_FILE).exists());
    }

    #[test]
    fn discard_removes_snapshot_dir() {
        let repo = tempfile::tempdir().expect("tempdir");
        fs::write(repo.path().join("a.txt"), "x\n").expect("write");

        let snapshot = Snapshot::create(repo.path(), state()).expect("create");
        let path = snapshot.path().to_path_buf();
        snapshot.discard().expect("discard");
        assert!(!path.exists());
    }
}
