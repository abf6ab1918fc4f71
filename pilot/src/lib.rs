//! Autonomous code-change pipeline.
//!
//! Given a natural-language goal and a snapshot of repository intelligence,
//! the pilot deterministically decomposes the goal into a dependency-ordered
//! task graph, applies unified-diff patches under configurable guardrails
//! with idempotency and conflict detection, and orchestrates end-to-end
//! execution with safety gating, backup, and rollback.
//!
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (planning, diff parsing).
//!   No I/O, fully testable in isolation.
//! - **[`edit`]**: Patch application under guardrails. Touches only the
//!   files a patch names, and only after a backup exists.
//! - **[`io`]**: Side-effecting adapters (filesystem, git, process
//!   execution). Isolated to enable substitution in tests.
//!
//! The [`autopilot`] module coordinates core logic with I/O to implement one
//! `execute_goal` run.

pub mod autopilot;
pub mod core;
pub mod edit;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
