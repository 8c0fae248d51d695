//! Replication forwarding decisions.
//!
//! After a node commits a write locally it has to decide who else needs a
//! copy. The answer depends only on why the write arrived here and on which
//! shard the client believed it was talking to.
//!
//! # Algorithm
//!
//! 1. Write forwarded by a peer: stop. Forwarded copies never forward again,
//!    which is what keeps the ring free of loops.
//! 2. Client write and this node is the shard's primary: forward to the
//!    secondary and tertiary async endpoints.
//! 3. Client write that landed here because the client failed over past the
//!    primary: forward to the primary (so it learns of the write it missed)
//!    and to whichever replica is not this node.
//!
//! Targets are deduplicated and never include this node's own async
//! endpoint, which matters in one- and two-node rings where a shard can name
//! the same machine twice.

use corelib::{Endpoint, NodeUri, WriteOrigin};

/// The part this node played in a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRole {
    /// The write is a copy forwarded by another holder.
    Replica,
    /// This node owns the shard.
    Primary,
    /// The client failed over to this node.
    Failover,
}

/// Where the copies of a committed write go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardPlan {
    pub role: WriteRole,
    /// Async endpoints, in the order they should be enqueued.
    pub targets: Vec<Endpoint>,
}

impl ForwardPlan {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Decides forwarding for a write committed on the node at `local`.
pub fn plan_forwarding(origin: &WriteOrigin, local: &NodeUri) -> ForwardPlan {
    let destination = match origin {
        WriteOrigin::ReplicatedFromPeer => {
            return ForwardPlan {
                role: WriteRole::Replica,
                targets: Vec::new(),
            }
        }
        WriteOrigin::ExternalClient { destination } => destination,
    };

    let (role, candidates): (WriteRole, Vec<&NodeUri>) =
        if destination.is_primary(&local.sync_uri) {
            let replicas = destination
                .secondary
                .iter()
                .chain(destination.tertiary.iter())
                .collect();
            (WriteRole::Primary, replicas)
        } else {
            let others = std::iter::once(&destination.primary)
                .chain(destination.other_replication_node(&local.sync_uri))
                .collect();
            (WriteRole::Failover, others)
        };

    let mut targets: Vec<Endpoint> = Vec::with_capacity(candidates.len());
    for uri in candidates {
        if uri.async_uri != local.async_uri && !targets.contains(&uri.async_uri) {
            targets.push(uri.async_uri.clone());
        }
    }

    ForwardPlan { role, targets }
}
