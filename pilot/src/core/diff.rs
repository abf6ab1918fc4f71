//! Unified diff model and parser.
//!
//! The wire format is the standard unified diff: `--- old` / `+++ new` file
//! headers, `@@ -start[,count] +start[,count] @@` hunk headers, then lines
//! prefixed with ` `, `-`, or `+`. Omitted counts default to 1. A blank line
//! inside a hunk is an empty context line.

use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One line of a hunk, tagged with its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchLine {
    Context(String),
    Remove(String),
    Add(String),
}

/// A contiguous block of context/removed/added lines anchored to old/new
/// line ranges (both 1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<PatchLine>,
}

impl Hunk {
    /// Total bytes of changed (added/removed) lines, used for the patch size
    /// guardrail. Context lines do not count against the ceiling.
    pub fn changed_bytes(&self) -> usize {
        self.lines
            .iter()
            .map(|line| match line {
                PatchLine::Remove(text) | PatchLine::Add(text) => text.len() + 1,
                PatchLine::Context(_) => 0,
            })
            .sum()
    }
}

/// All hunks targeting a single file, in diff order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    pub path: String,
    pub hunks: Vec<Hunk>,
}

/// A parsed patch: file patches in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    pub files: Vec<FilePatch>,
}

impl PatchSet {
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|file| file.path.as_str()).collect()
    }

    /// Literal counts of `+` and `-` prefixed lines across all hunks.
    pub fn change_counts(&self) -> (usize, usize) {
        let mut additions = 0;
        let mut deletions = 0;
        for file in &self.files {
            for hunk in &file.hunks {
                for line in &hunk.lines {
                    match line {
                        PatchLine::Add(_) => additions += 1,
                        PatchLine::Remove(_) => deletions += 1,
                        PatchLine::Context(_) => {}
                    }
                }
            }
        }
        (additions, deletions)
    }

    pub fn total_changed_bytes(&self) -> usize {
        self.files
            .iter()
            .flat_map(|file| file.hunks.iter())
            .map(Hunk::changed_bytes)
            .sum()
    }
}

fn hunk_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk header regex")
    })
}

/// Parse a unified diff into per-file hunks.
///
/// Errors on a malformed hunk header or a hunk appearing before any file
/// header. `+++ /dev/null` (file deletion) closes the current file, so hunks
/// that follow it without a new header are errors too.
pub fn parse_unified_diff(diff: &str) -> Result<PatchSet> {
    let mut patch = PatchSet::default();
    let mut current_file: Option<usize> = None;

    for line in diff.lines() {
        if line.starts_with("--- ") {
            // Old-side header; the new-side header carries the target path.
            continue;
        }
        if let Some(path) = line.strip_prefix("+++ ") {
            let path = path.trim();
            if path == "/dev/null" {
                current_file = None;
            } else {
                patch.files.push(FilePatch {
                    path: path.to_string(),
                    hunks: Vec::new(),
                });
                current_file = Some(patch.files.len() - 1);
            }
            continue;
        }
        if line.starts_with("@@") {
            let index = current_file.ok_or_else(|| anyhow!("hunk without file context"))?;
            let captures = hunk_header_re()
                .captures(line)
                .ok_or_else(|| anyhow!("invalid hunk header: {line}"))?;
            patch.files[index].hunks.push(Hunk {
                old_start: capture_usize(&captures, 1)?,
                old_count: optional_capture_usize(&captures, 2)?.unwrap_or(1),
                new_start: capture_usize(&captures, 3)?,
                new_count: optional_capture_usize(&captures, 4)?.unwrap_or(1),
                lines: Vec::new(),
            });
            continue;
        }

        let Some(index) = current_file else {
            continue;
        };
        let Some(hunk) = patch.files[index].hunks.last_mut() else {
            continue;
        };
        if let Some(text) = line.strip_prefix(' ') {
            hunk.lines.push(PatchLine::Context(text.to_string()));
        } else if let Some(text) = line.strip_prefix('-') {
            hunk.lines.push(PatchLine::Remove(text.to_string()));
        } else if let Some(text) = line.strip_prefix('+') {
            hunk.lines.push(PatchLine::Add(text.to_string()));
        } else if line.is_empty() {
            // Blank lines inside a hunk are context lines whose space prefix
            // was stripped by transport.
            hunk.lines.push(PatchLine::Context(String::new()));
        }
    }

    Ok(patch)
}

fn capture_usize(captures: &regex::Captures<'_>, index: usize) -> Result<usize> {
    captures
        .get(index)
        .ok_or_else(|| anyhow!("missing hunk header field {index}"))?
        .as_str()
        .parse()
        .map_err(|err| anyhow!("hunk header field {index}: {err}"))
}

fn optional_capture_usize(captures: &regex::Captures<'_>, index: usize) -> Result<Option<usize>> {
    match captures.get(index) {
        Some(m) => Ok(Some(
            m.as_str()
                .parse()
                .map_err(|err| anyhow!("hunk header field {index}: {err}"))?,
        )),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "--- a.txt\n+++ a.txt\n@@ -1,2 +1,3 @@\n line1\n+added\n line2\n";

    #[test]
    fn parses_single_file_single_hunk() {
        let patch = parse_unified_diff(SIMPLE).expect("parse");
        assert_eq!(patch.paths(), vec!["a.txt"]);

        let hunk = &patch.files[0].hunks[0];
        assert_eq!(
            (hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count),
            (1, 2, 1, 3)
        );
        assert_eq!(
            hunk.lines,
            vec![
                PatchLine::Context("line1".to_string()),
                PatchLine::Add("added".to_string()),
                PatchLine::Context("line2".to_string()),
            ]
        );
    }

    #[test]
    fn omitted_counts_default_to_one() {
        let diff = "--- a.txt\n+++ a.txt\n@@ -3 +3 @@\n-old\n+new\n";
        let patch = parse_unified_diff(diff).expect("parse");
        let hunk = &patch.files[0].hunks[0];
        assert_eq!((hunk.old_count, hunk.new_count), (1, 1));
    }

    #[test]
    fn hunk_before_file_header_is_an_error() {
        let err = parse_unified_diff("@@ -1,1 +1,1 @@\n line\n").expect_err("must fail");
        assert!(err.to_string().contains("hunk without file context"));
    }

    #[test]
    fn malformed_hunk_header_is_an_error() {
        let diff = "--- a.txt\n+++ a.txt\n@@ bogus @@\n";
        let err = parse_unified_diff(diff).expect_err("must fail");
        assert!(err.to_string().contains("invalid hunk header"));
    }

    #[test]
    fn dev_null_target_closes_current_file() {
        let diff = "--- gone.txt\n+++ /dev/null\n@@ -1,1 +0,0 @@\n-bye\n";
        let err = parse_unified_diff(diff).expect_err("must fail");
        assert!(err.to_string().contains("hunk without file context"));
    }

    #[test]
    fn counts_additions_and_deletions_literally() {
        let diff = "--- a.txt\n+++ a.txt\n@@ -1,3 +1,3 @@\n ctx\n-removed\n+added\n\
                    --- b.txt\n+++ b.txt\n@@ -1,1 +1,2 @@\n keep\n+more\n";
        let patch = parse_unified_diff(diff).expect("parse");
        assert_eq!(patch.change_counts(), (2, 1));
        assert_eq!(patch.paths(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn blank_line_in_hunk_is_empty_context() {
        let diff = "--- a.txt\n+++ a.txt\n@@ -1,3 +1,3 @@\n one\n\n three\n";
        let patch = parse_unified_diff(diff).expect("parse");
        assert_eq!(
            patch.files[0].hunks[0].lines[1],
            PatchLine::Context(String::new())
        );
    }
}
