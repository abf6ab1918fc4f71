//! Pre-mutation write guardrails for patch application.
//!
//! Guardrails are checked against the parsed patch before any disk write.
//! Blocking is all-or-nothing: one violation anywhere rejects the whole
//! patch.

use serde::{Deserialize, Serialize};

use crate::core::diff::PatchSet;

/// Allow/block policy for patch application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Globs a touched path must match to be writable.
    pub allowed_paths: Vec<String>,
    /// Globs that reject a touched path outright.
    pub blocked_paths: Vec<String>,
    /// Ceiling on the total byte size of changed lines across the patch.
    pub max_total_patch_bytes: usize,
    /// Ceiling on the number of files one patch may touch.
    pub max_files_per_patch: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec!["**".to_string()],
            blocked_paths: vec![
                ".git/**".to_string(),
                "target/**".to_string(),
                "node_modules/**".to_string(),
            ],
            max_total_patch_bytes: 50_000,
            max_files_per_patch: 20,
        }
    }
}

/// A single violated guardrail rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailViolation {
    pub rule: String,
    pub file_path: String,
    pub reason: String,
    pub severity: String,
}

impl GuardrailViolation {
    fn new(rule: &str, file_path: &str, reason: String) -> Self {
        Self {
            rule: rule.to_string(),
            file_path: file_path.to_string(),
            reason,
            severity: "error".to_string(),
        }
    }
}

/// Check a parsed patch against the configured guardrails.
///
/// All violations are collected so the caller can report every violated rule
/// at once.
pub fn check_guardrails(config: &GuardrailConfig, patch: &PatchSet) -> Vec<GuardrailViolation> {
    let mut violations = Vec::new();

    if patch.files.len() > config.max_files_per_patch {
        violations.push(GuardrailViolation::new(
            "max_files_per_patch",
            "",
            format!(
                "patch affects {} files, limit is {}",
                patch.files.len(),
                config.max_files_per_patch
            ),
        ));
    }

    let total_bytes = patch.total_changed_bytes();
    if total_bytes > config.max_total_patch_bytes {
        violations.push(GuardrailViolation::new(
            "max_total_patch_bytes",
            "",
            format!(
                "patch size {total_bytes} bytes exceeds limit {}",
                config.max_total_patch_bytes
            ),
        ));
    }

    for path in patch.paths() {
        if matches_any(path, &config.blocked_paths) {
            violations.push(GuardrailViolation::new(
                "blocked_paths",
                path,
                format!("file {path} matches blocked path pattern"),
            ));
        }
        if !matches_any(path, &config.allowed_paths) {
            violations.push(GuardrailViolation::new(
                "allowed_paths",
                path,
                format!("file {path} not in allowed paths"),
            ));
        }
    }

    violations
}

fn matches_any(path: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|pattern| glob_matches(pattern, path))
}

/// Glob matcher supporting `?`, `*` (any chars except `/`) and `**` (any
/// chars including `/`).
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    glob_matches_inner(pattern.as_bytes(), path.as_bytes())
}

fn glob_matches_inner(pat: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut star_p: Option<usize> = None;
    let mut star_t: usize = 0;

    while t < text.len() {
        if p < pat.len() && (pat[p] == b'?' || pat[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p + 1 < pat.len() && pat[p] == b'*' && pat[p + 1] == b'*' {
            star_p = Some(p);
            star_t = t;
            p += 2;
            if p < pat.len() && pat[p] == b'/' {
                p += 1;
            }
        } else if p < pat.len() && pat[p] == b'*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            // Backtrack to the last star. A single `*` may not cross `/`,
            // so hitting a separator exhausts it and the match fails.
            let last_star_double = sp + 1 < pat.len() && pat[sp + 1] == b'*';
            if !last_star_double && text[star_t] == b'/' {
                return false;
            }
            star_t += 1;
            t = star_t;
            p = sp + if last_star_double { 2 } else { 1 };
        } else {
            return false;
        }
    }

    while p + 1 < pat.len() && pat[p] == b'*' && pat[p + 1] == b'*' {
        p += 2;
    }
    while p < pat.len() && pat[p] == b'*' {
        p += 1;
    }

    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::parse_unified_diff;

    fn patch_for(paths: &[&str]) -> PatchSet {
        let mut diff = String::new();
        for path in paths {
            diff.push_str(&format!(
                "--- {path}\n+++ {path}\n@@ -1,1 +1,1 @@\n-old\n+new\n"
            ));
        }
        parse_unified_diff(&diff).expect("parse")
    }

    #[test]
    fn double_star_crosses_directories() {
        assert!(glob_matches("src/**", "src/core/task.rs"));
        assert!(glob_matches("**", "anything/at/all.txt"));
        assert!(!glob_matches("src/**", "tests/it.rs"));
    }

    #[test]
    fn single_star_stops_at_slash() {
        assert!(glob_matches("src/*.rs", "src/lib.rs"));
        assert!(!glob_matches("src/*.rs", "src/core/task.rs"));
        assert!(!glob_matches("src/*.rs", "src/deep/nested/evil.rs"));
        assert!(glob_matches("*.lock", "Cargo.lock"));
    }

    #[test]
    fn single_star_allow_list_rejects_nested_paths() {
        let config = GuardrailConfig {
            allowed_paths: vec!["src/*.rs".to_string()],
            ..GuardrailConfig::default()
        };
        let violations = check_guardrails(&config, &patch_for(&["src/deep/evil.rs"]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "allowed_paths");
        assert!(check_guardrails(&config, &patch_for(&["src/lib.rs"])).is_empty());
    }

    #[test]
    fn clean_patch_has_no_violations() {
        let config = GuardrailConfig::default();
        assert!(check_guardrails(&config, &patch_for(&["src/lib.rs"])).is_empty());
    }

    #[test]
    fn blocked_path_is_rejected() {
        let config = GuardrailConfig::default();
        let violations = check_guardrails(&config, &patch_for(&[".git/config"]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "blocked_paths");
        assert_eq!(violations[0].file_path, ".git/config");
    }

    #[test]
    fn path_outside_allow_list_is_rejected() {
        let config = GuardrailConfig {
            allowed_paths: vec!["src/**".to_string()],
            ..GuardrailConfig::default()
        };
        let violations = check_guardrails(&config, &patch_for(&["README.md"]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "allowed_paths");
    }

    #[test]
    fn file_count_ceiling_is_enforced() {
        let config = GuardrailConfig {
            max_files_per_patch: 1,
            ..GuardrailConfig::default()
        };
        let violations = check_guardrails(&config, &patch_for(&["a.rs", "b.rs"]));
        assert!(violations.iter().any(|v| v.rule == "max_files_per_patch"));
    }

    #[test]
    fn byte_ceiling_is_enforced() {
        let config = GuardrailConfig {
            max_total_patch_bytes: 4,
            ..GuardrailConfig::default()
        };
        let violations = check_guardrails(&config, &patch_for(&["a.rs"]));
        assert!(violations.iter().any(|v| v.rule == "max_total_patch_bytes"));
    }

    #[test]
    fn all_violations_are_collected() {
        let config = GuardrailConfig {
            allowed_paths: vec!["src/**".to_string()],
            max_files_per_patch: 1,
            ..GuardrailConfig::default()
        };
        let violations = check_guardrails(&config, &patch_for(&[".git/hooks", "README.md"]));
        let rules: Vec<&str> = violations.iter().map(|v| v.rule.as_str()).collect();
        assert!(rules.contains(&"max_files_per_patch"));
        assert!(rules.contains(&"blocked_paths"));
        assert!(rules.contains(&"allowed_paths"));
    }
}
