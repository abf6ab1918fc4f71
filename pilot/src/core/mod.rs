//! Pure, deterministic logic: task model, planning, diff parsing.
//!
//! No I/O lives here; everything is testable in isolation.

pub mod diff;
pub mod planner;
pub mod task;
