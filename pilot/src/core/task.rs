//! Shared deterministic types for the planning core.
//!
//! These types define stable contracts between the planner, the edit engine,
//! and the orchestrator. They carry no I/O and must serialize losslessly.

use serde::{Deserialize, Serialize};

/// Qualitative risk annotation used for complexity scoring and the
/// halt-on-failure policy during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl Risk {
    /// Score used by the planner's complexity estimate.
    pub fn score(self) -> u32 {
        match self {
            Risk::Low => 1,
            Risk::Medium => 3,
            Risk::High => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        }
    }
}

/// Explicit task category, assigned once at planning time.
///
/// Execution dispatches on this tag; task ids are identifiers only and never
/// inspected for substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Analyze,
    Implement,
    Fix,
    Test,
    Validate,
    Generic,
}

/// A single task in the execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub kind: TaskKind,
    pub description: String,
    /// Ids of tasks that must complete before this one. Every id must
    /// reference a node in the same graph and the relation must be acyclic.
    pub dependencies: Vec<String>,
    pub risk: Risk,
    pub done_criteria: Vec<String>,
    pub estimated_files: Vec<String>,
}

/// Directed "must complete before" edge between two task ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Overall complexity estimate for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Immutable task DAG produced by one `plan()` call.
///
/// Nodes are stored as an ordered vector with unique ids. The vector order is
/// the planner's first-seen order and is the explicit tie-break used when
/// seeding the topological sort; it must survive serialization round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub nodes: Vec<TaskNode>,
    pub edges: Vec<Edge>,
    pub goal: String,
    pub plan_hash: String,
    pub total_tasks: usize,
    pub estimated_complexity: Complexity,
    /// RFC 3339 creation timestamp. The only nondeterministic field.
    pub created_at: String,
}

impl TaskGraph {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Ids of tasks whose risk is [`Risk::High`].
    pub fn high_risk_ids(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| node.risk == Risk::High)
            .map(|node| node.id.as_str())
            .collect()
    }

    /// Union of `estimated_files` across all tasks, deduplicated, in
    /// first-seen order.
    pub fn estimated_file_union(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for node in &self.nodes {
            for file in &node.estimated_files {
                if !seen.contains(&file.as_str()) {
                    seen.push(file.as_str());
                }
            }
        }
        seen
    }
}

/// Specification for a generated validation test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseSpec {
    pub name: String,
    pub description: String,
    pub command: String,
    pub expected_outcome: String,
    pub risk_level: Risk,
}

/// Snapshot of repository intelligence consumed by the planner.
///
/// This is an immutable value passed by the caller; the planner never holds a
/// reference to indexer internals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIntel {
    pub files: Vec<String>,
    pub symbols: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(nodes: Vec<TaskNode>, edges: Vec<Edge>) -> TaskGraph {
        let total = nodes.len();
        TaskGraph {
            nodes,
            edges,
            goal: "goal".to_string(),
            plan_hash: "abc123".to_string(),
            total_tasks: total,
            estimated_complexity: Complexity::Low,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn node(id: &str, risk: Risk, files: &[&str]) -> TaskNode {
        TaskNode {
            id: id.to_string(),
            kind: TaskKind::Generic,
            description: format!("{id} description"),
            dependencies: Vec::new(),
            risk,
            done_criteria: Vec::new(),
            estimated_files: files.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    #[test]
    fn node_lookup_by_id() {
        let graph = graph_with(
            vec![node("a", Risk::Low, &[]), node("b", Risk::High, &[])],
            Vec::new(),
        );
        assert_eq!(graph.node("b").expect("node b").risk, Risk::High);
        assert!(graph.node("missing").is_none());
    }

    #[test]
    fn estimated_file_union_dedupes_in_order() {
        let graph = graph_with(
            vec![
                node("a", Risk::Low, &["src/lib.rs", "src/main.rs"]),
                node("b", Risk::Low, &["src/main.rs", "tests/it.rs"]),
            ],
            Vec::new(),
        );
        assert_eq!(
            graph.estimated_file_union(),
            vec!["src/lib.rs", "src/main.rs", "tests/it.rs"]
        );
    }

    #[test]
    fn graph_round_trips_through_json() {
        let graph = graph_with(
            vec![node("a", Risk::Medium, &["src/lib.rs"])],
            vec![Edge {
                from: "a".to_string(),
                to: "b".to_string(),
            }],
        );
        let raw = serde_json::to_string(&graph).expect("serialize");
        let loaded: TaskGraph = serde_json::from_str(&raw).expect("parse");
        assert_eq!(loaded, graph);
    }

    #[test]
    fn risk_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Risk::High).expect("serialize"),
            "\"high\""
        );
    }
}
