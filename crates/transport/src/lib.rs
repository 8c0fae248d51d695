//! Transports for the replicated ring.
//!
//! This crate provides:
//! - The wire codec used for both sync calls and replication messages
//! - An in-process network that implements both transport traits, used by
//!   tests, the demo cluster, and anyone embedding several nodes in one process

pub mod codec;
pub mod memory;

pub use codec::{decode, encode, WIRE_VERSION};
pub use memory::InMemoryNetwork;
