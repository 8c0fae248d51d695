//! Operator tooling for a ringkv topology.
//!
//! Provides commands for:
//! - Inspecting the replica triplets a topology file resolves to
//! - Showing which shard and failover chain a key routes to
//! - Running an in-process three-way replicated demo cluster

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult, HashFunction};
pub use config::CliConfig;
