//! Ring topology construction.
//!
//! Operators describe each physical node by name, with its two endpoints and
//! the *names* of the nodes that hold its secondary and tertiary copies. The
//! builder resolves those names into [`Node`] triplets, one per descriptor,
//! in input order.
//!
//! The builder does not derive adjacency. A ring where node `i` names
//! `i + 1` and `i + 2` as its replicas is a convention the configuration
//! follows, not something enforced here.

use crate::error::{Error, Result};
use crate::node::{Endpoint, Node, NodeUri};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration of one physical node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub sync_uri: Endpoint,
    pub async_uri: Endpoint,
    #[serde(default)]
    pub secondary: Option<String>,
    #[serde(default)]
    pub tertiary: Option<String>,
}

impl NodeDescriptor {
    pub fn new(
        name: impl Into<String>,
        sync_uri: impl Into<Endpoint>,
        async_uri: impl Into<Endpoint>,
    ) -> Self {
        Self {
            name: name.into(),
            sync_uri: sync_uri.into(),
            async_uri: async_uri.into(),
            secondary: None,
            tertiary: None,
        }
    }

    pub fn replicated_to(
        mut self,
        secondary: impl Into<String>,
        tertiary: impl Into<String>,
    ) -> Self {
        self.secondary = Some(secondary.into());
        self.tertiary = Some(tertiary.into());
        self
    }

    fn uri(&self) -> NodeUri {
        NodeUri::new(self.sync_uri.clone(), self.async_uri.clone())
    }
}

/// The on-disk topology file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub nodes: Vec<NodeDescriptor>,
}

impl TopologyConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid topology json: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Convenience for the conventional ring: descriptor `i` replicates to
    /// `i + 1` and `i + 2`, wrapping around.
    pub fn ring(nodes: impl IntoIterator<Item = (String, Endpoint, Endpoint)>) -> Self {
        let named: Vec<_> = nodes.into_iter().collect();
        let k = named.len();
        let nodes = named
            .iter()
            .enumerate()
            .map(|(i, (name, sync_uri, async_uri))| {
                let mut descriptor =
                    NodeDescriptor::new(name.clone(), sync_uri.clone(), async_uri.clone());
                if k >= 2 {
                    descriptor.secondary = Some(named[(i + 1) % k].0.clone());
                }
                if k >= 3 {
                    descriptor.tertiary = Some(named[(i + 2) % k].0.clone());
                }
                descriptor
            })
            .collect();
        Self { nodes }
    }
}

/// Resolves descriptors into replica triplets, index-aligned with the input.
pub fn build_topology(descriptors: &[NodeDescriptor]) -> Result<Vec<Node>> {
    if descriptors.is_empty() {
        return Err(Error::Configuration("topology has no nodes".into()));
    }

    let mut by_name: HashMap<&str, &NodeDescriptor> = HashMap::with_capacity(descriptors.len());
    for (index, descriptor) in descriptors.iter().enumerate() {
        if descriptor.name.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "node at position {index} has an empty name"
            )));
        }
        if by_name.insert(descriptor.name.as_str(), descriptor).is_some() {
            return Err(Error::Configuration(format!(
                "node name '{}' appears more than once",
                descriptor.name
            )));
        }
    }

    let resolve = |owner: &str, role: &str, reference: &Option<String>| -> Result<Option<NodeUri>> {
        match reference {
            None => Ok(None),
            Some(name) => by_name.get(name.as_str()).map(|d| Some(d.uri())).ok_or_else(|| {
                Error::Configuration(format!(
                    "node '{owner}' names unknown {role} node '{name}'"
                ))
            }),
        }
    };

    descriptors
        .iter()
        .map(|descriptor| {
            let secondary = resolve(&descriptor.name, "secondary", &descriptor.secondary)?;
            let tertiary = resolve(&descriptor.name, "tertiary", &descriptor.tertiary)?;
            Ok(Node::with_replicas(
                descriptor.name.clone(),
                descriptor.uri(),
                secondary,
                tertiary,
            ))
        })
        .collect()
}

/// Read side of the topology, shared by clients and servers.
#[derive(Debug, Clone)]
pub struct MetadataProvider {
    nodes: Vec<Node>,
}

impl MetadataProvider {
    pub fn new(config: &TopologyConfig) -> Result<Self> {
        let nodes = build_topology(&config.nodes)?;
        tracing::info!(nodes = nodes.len(), "topology built");
        Ok(Self { nodes })
    }

    /// The full topology, in configuration order.
    pub fn network_nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The shard whose primary lives at `uri` (sync or async endpoint).
    pub fn node_by_uri(&self, uri: &Endpoint) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|node| &node.primary.sync_uri == uri || &node.primary.async_uri == uri)
    }
}
