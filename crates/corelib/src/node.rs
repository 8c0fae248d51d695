//! Node abstractions for the replica ring.
//!
//! A [`Node`] is one shard's replica triplet. The same struct is read from two
//! sides:
//!
//! - the routing client treats it as a failover chain (primary, then secondary,
//!   then tertiary) when sending a request for a key it owns;
//! - the replication server treats it as "who else holds this shard" when it
//!   decides where a write has to be forwarded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one endpoint of a physical node.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Endpoint {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// The two endpoints of one physical node.
///
/// `sync_uri` answers request/response calls, `async_uri` receives
/// fire-and-forget replication messages. Both name the same machine.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct NodeUri {
    pub sync_uri: Endpoint,
    pub async_uri: Endpoint,
}

impl NodeUri {
    pub fn new(sync_uri: impl Into<Endpoint>, async_uri: impl Into<Endpoint>) -> Self {
        Self {
            sync_uri: sync_uri.into(),
            async_uri: async_uri.into(),
        }
    }
}

impl fmt::Display for NodeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.sync_uri, self.async_uri)
    }
}

/// One shard's replica triplet.
///
/// Built once from configuration and never mutated afterwards. `secondary`
/// and `tertiary` are only absent in one- or two-node topologies.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Node {
    /// Logical name, unique within the topology.
    pub name: String,
    pub primary: NodeUri,
    pub secondary: Option<NodeUri>,
    pub tertiary: Option<NodeUri>,
}

impl Node {
    pub fn new(name: impl Into<String>, primary: NodeUri) -> Self {
        Self {
            name: name.into(),
            primary,
            secondary: None,
            tertiary: None,
        }
    }

    pub fn with_replicas(
        name: impl Into<String>,
        primary: NodeUri,
        secondary: impl Into<Option<NodeUri>>,
        tertiary: impl Into<Option<NodeUri>>,
    ) -> Self {
        Self {
            name: name.into(),
            primary,
            secondary: secondary.into(),
            tertiary: tertiary.into(),
        }
    }

    /// Holders of this shard in failover priority order.
    pub fn holders(&self) -> impl Iterator<Item = &NodeUri> {
        std::iter::once(&self.primary)
            .chain(self.secondary.as_ref())
            .chain(self.tertiary.as_ref())
    }

    /// Sync endpoints to try, primary first.
    pub fn failover_chain(&self) -> impl Iterator<Item = &Endpoint> {
        self.holders().map(|uri| &uri.sync_uri)
    }

    /// True if `sync_uri` is this shard's primary.
    pub fn is_primary(&self, sync_uri: &Endpoint) -> bool {
        &self.primary.sync_uri == sync_uri
    }

    /// True if `sync_uri` is any of the three holders.
    pub fn holds(&self, sync_uri: &Endpoint) -> bool {
        self.failover_chain().any(|endpoint| endpoint == sync_uri)
    }

    /// Given the sync address of one replica, returns the other replica.
    ///
    /// Secondary maps to tertiary and tertiary to secondary. Anything else,
    /// the primary included, has no "other" replica.
    pub fn other_replication_node(&self, self_sync: &Endpoint) -> Option<&NodeUri> {
        let is = |uri: &Option<NodeUri>| {
            uri.as_ref()
                .map_or(false, |uri| &uri.sync_uri == self_sync)
        };
        if is(&self.secondary) {
            self.tertiary.as_ref()
        } else if is(&self.tertiary) {
            self.secondary.as_ref()
        } else {
            None
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.primary.sync_uri)
    }
}
