//! Core library for the replicated ring.
//!
//! This crate provides the fundamental abstractions shared by clients and
//! servers:
//! - Node triplets and their endpoints
//! - Topology construction from named descriptors
//! - Partitioners (fixed, portable key hashes)
//! - The version/conflict contract carried by every request
//! - Wire protocol enums and transport traits

pub mod error;
pub mod network;
pub mod node;
pub mod partitioner;
pub mod protocol;
pub mod topology;
pub mod version;

pub use error::{Error, Fault, FaultKind, Result, TransportError};
pub use network::{AsyncTransport, NodeService, SyncTransport};
pub use node::{Endpoint, Node, NodeUri};
pub use partitioner::{Partitioner, Sip13Partitioner, Xxh3Partitioner};
pub use protocol::{ReplicationMessage, Request, Response, WriteOrigin};
pub use topology::{build_topology, MetadataProvider, NodeDescriptor, TopologyConfig};
pub use version::{
    GetRequest, InstanceId, PutRequest, PutResult, RemoveRequest, Value, Version,
    RESERVED_KEY_PREFIX,
};
