//! Shared helpers for unit and integration tests.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use crate::core::task::{Risk, TaskKind, TaskNode};

/// A scratch git repository with a configured identity, deleted on drop.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn init() -> Self {
        let dir = TempDir::with_prefix("pilot-test-repo-").expect("create tempdir");
        let repo = Self { dir };
        repo.git(&["init", "-b", "main"]);
        repo.git(&["config", "user.name", "Test User"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel: &str, content: &str) {
        let full = self.dir.path().join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(full, content).expect("write file");
    }

    pub fn read_file(&self, rel: &str) -> String {
        fs::read_to_string(self.dir.path().join(rel)).expect("read file")
    }

    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-m", message]);
    }

    pub fn current_branch(&self) -> String {
        let out = self.git_output(&["rev-parse", "--abbrev-ref", "HEAD"]);
        out.trim().to_string()
    }

    pub fn git(&self, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .status()
            .expect("run git");
        assert!(status.success(), "git {args:?} failed");
    }

    pub fn git_output(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .expect("run git");
        assert!(output.status.success(), "git {args:?} failed");
        String::from_utf8_lossy(&output.stdout).to_string()
    }
}

pub fn task_node(id: &str, kind: TaskKind, risk: Risk, files: &[&str]) -> TaskNode {
    TaskNode {
        id: id.to_string(),
        kind,
        description: format!("{id} description"),
        dependencies: Vec::new(),
        risk,
        done_criteria: Vec::new(),
        estimated_files: files.iter().map(|f| (*f).to_string()).collect(),
    }
}
