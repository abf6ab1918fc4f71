//! Patch application: guardrail checks and the edit engine itself.

pub mod engine;
pub mod guardrails;
