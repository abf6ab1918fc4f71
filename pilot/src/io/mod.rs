//! Side-effecting adapters: subprocesses, git, config files, snapshots.

pub mod config;
pub mod intel;
pub mod process;
pub mod repo;
pub mod snapshot;
