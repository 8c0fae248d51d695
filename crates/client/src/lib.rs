//! Client side of the ring: shard routing and holder failover.
//!
//! [`RoutingClient`] splits a batch by owning shard, sends each group to
//! that shard's holders through [`execute_with_failover`], and reassembles
//! the answers in input order.

pub mod failover;
pub mod router;

pub use failover::execute_with_failover;
pub use router::{group_by_shard, RoutingClient, ShardGroup};
