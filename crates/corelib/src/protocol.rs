//! Wire protocol shared by clients, servers and transports.

use crate::error::Fault;
use crate::node::{Endpoint, Node};
use crate::version::{GetRequest, PutRequest, PutResult, RemoveRequest, Value};
use serde::{Deserialize, Serialize};

/// Why a write reached this node.
///
/// Only writes from an external client can trigger forwarding. A write that
/// arrived through replication forwarding is applied locally and stops.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum WriteOrigin {
    /// A client sent the batch to the shard it believed owns the keys.
    /// `destination` is that shard, not necessarily the node executing the
    /// call: the client may have failed over.
    ExternalClient { destination: Node },
    /// Another holder forwarded a write it had already committed.
    ReplicatedFromPeer,
}

impl WriteOrigin {
    pub fn client(destination: Node) -> Self {
        WriteOrigin::ExternalClient { destination }
    }
}

/// A request/response call sent to a node's sync endpoint.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Request {
    Put {
        origin: WriteOrigin,
        requests: Vec<PutRequest>,
    },
    Get {
        requests: Vec<GetRequest>,
    },
    Remove {
        origin: WriteOrigin,
        requests: Vec<RemoveRequest>,
    },
    GetNetworkNodes,
    GetNodeByUri {
        uri: Endpoint,
    },
}

impl Request {
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Put { .. } => "put",
            Request::Get { .. } => "get",
            Request::Remove { .. } => "remove",
            Request::GetNetworkNodes => "get_network_nodes",
            Request::GetNodeByUri { .. } => "get_node_by_uri",
        }
    }
}

/// Answer to a [`Request`].
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Response {
    Put(Vec<PutResult>),
    Get(Vec<Vec<Value>>),
    Remove(Vec<bool>),
    Nodes(Vec<Node>),
    Node(Option<Node>),
    Fault(Fault),
}

/// Fire-and-forget copy of a committed write, sent to an async endpoint.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ReplicationMessage {
    Put(Vec<PutRequest>),
    Remove(Vec<RemoveRequest>),
}

impl ReplicationMessage {
    pub fn len(&self) -> usize {
        match self {
            ReplicationMessage::Put(requests) => requests.len(),
            ReplicationMessage::Remove(requests) => requests.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
