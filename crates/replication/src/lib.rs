//! Replication-aware node handler.
//!
//! This crate provides the server side of the ring:
//! - The storage engine contract each node writes through
//! - The forwarding rules that decide which holders receive a copy
//! - `ReplicationServer`, the handler that ties both to a transport

pub mod forwarding;
pub mod server;
pub mod storage;

pub use forwarding::{plan_forwarding, ForwardPlan, WriteRole};
pub use server::ReplicationServer;
pub use storage::{MemoryStorage, StorageBatch, StorageEngine};
