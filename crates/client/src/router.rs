//! Routing client.
//!
//! Presents one logical `put`/`get`/`remove` over a batch of keyed requests.
//!
//! # Algorithm
//!
//! 1. Hash every key to the index of its owning shard
//! 2. Group requests by shard, keeping their relative order
//! 3. Send each group to its shard with failover across the holders
//! 4. Scatter each group's results back to the original input positions
//!
//! Groups run one after another in order of first appearance. There is no
//! atomicity across shards: if a later group exhausts its holders the call
//! fails, and groups that already succeeded stay applied.

use crate::failover::execute_with_failover;
use corelib::{
    Endpoint, Error, GetRequest, Node, Partitioner, PutRequest, PutResult, RemoveRequest,
    Request, Response, Result, SyncTransport, Value, WriteOrigin, Xxh3Partitioner,
};
use std::sync::Arc;

/// Requests of one batch that belong to the same shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardGroup {
    /// Index of the owning node in the topology.
    pub shard: usize,
    /// Positions in the input batch, ascending.
    pub positions: Vec<usize>,
}

/// Groups keys by owning shard.
///
/// Groups are ordered by the first key that maps to them; positions within a
/// group keep input order.
pub fn group_by_shard<'k, P: Partitioner>(
    partitioner: &P,
    shard_count: usize,
    keys: impl IntoIterator<Item = &'k str>,
) -> Vec<ShardGroup> {
    let mut slot_of_shard: Vec<Option<usize>> = vec![None; shard_count];
    let mut groups: Vec<ShardGroup> = Vec::new();
    for (position, key) in keys.into_iter().enumerate() {
        let shard = partitioner.shard_index(key.as_bytes(), shard_count);
        let slot = *slot_of_shard[shard].get_or_insert_with(|| {
            groups.push(ShardGroup {
                shard,
                positions: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].positions.push(position);
    }
    groups
}

pub struct RoutingClient<T, P = Xxh3Partitioner> {
    transport: Arc<T>,
    partitioner: P,
    topology: Vec<Node>,
}

impl<T, P: Partitioner> std::fmt::Debug for RoutingClient<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingClient")
            .field("partitioner", &self.partitioner.name())
            .field("shards", &self.topology.len())
            .finish_non_exhaustive()
    }
}

impl<T: SyncTransport> RoutingClient<T, Xxh3Partitioner> {
    /// Fetches the topology from `seed`, failing over across its holders.
    pub async fn connect(transport: Arc<T>, seed: &Node) -> Result<Self> {
        Self::connect_with(transport, seed, Xxh3Partitioner).await
    }

    pub fn with_topology(transport: Arc<T>, topology: Vec<Node>) -> Result<Self> {
        Self::with_partitioner(transport, topology, Xxh3Partitioner)
    }
}

impl<T: SyncTransport, P: Partitioner> RoutingClient<T, P> {
    pub async fn connect_with(transport: Arc<T>, seed: &Node, partitioner: P) -> Result<Self> {
        let transport_ref = &transport;
        let topology = execute_with_failover(seed, |endpoint| async move {
            match call(transport_ref.as_ref(), &endpoint, Request::GetNetworkNodes).await? {
                Response::Nodes(nodes) => Ok(nodes),
                other => Err(unexpected("get_network_nodes", &other)),
            }
        })
        .await?;
        tracing::info!(seed = %seed.name, shards = topology.len(), "topology fetched");
        Self::with_partitioner(transport, topology, partitioner)
    }

    pub fn with_partitioner(
        transport: Arc<T>,
        topology: Vec<Node>,
        partitioner: P,
    ) -> Result<Self> {
        if topology.is_empty() {
            return Err(Error::Configuration("cannot route over an empty topology".into()));
        }
        Ok(Self {
            transport,
            partitioner,
            topology,
        })
    }

    /// The topology this client routes over.
    pub fn network_nodes(&self) -> &[Node] {
        &self.topology
    }

    /// The shard whose primary lives at `uri`.
    pub fn node_by_uri(&self, uri: &Endpoint) -> Option<&Node> {
        self.topology
            .iter()
            .find(|node| &node.primary.sync_uri == uri || &node.primary.async_uri == uri)
    }

    /// The shard that owns `key`.
    pub fn shard_for(&self, key: &str) -> &Node {
        &self.topology[self.partitioner.shard_index(key.as_bytes(), self.topology.len())]
    }

    pub fn group_by_shard<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> Vec<ShardGroup> {
        group_by_shard(&self.partitioner, self.topology.len(), keys)
    }

    pub async fn put(&self, requests: Vec<PutRequest>) -> Result<Vec<PutResult>> {
        self.execute(
            requests,
            |request| &request.key,
            |node, requests| Request::Put {
                origin: WriteOrigin::client(node.clone()),
                requests,
            },
            |response| match response {
                Response::Put(results) => Ok(results),
                other => Err(unexpected("put", &other)),
            },
        )
        .await
    }

    pub async fn get(&self, requests: Vec<GetRequest>) -> Result<Vec<Vec<Value>>> {
        self.execute(
            requests,
            |request| &request.key,
            |_, requests| Request::Get { requests },
            |response| match response {
                Response::Get(values) => Ok(values),
                other => Err(unexpected("get", &other)),
            },
        )
        .await
    }

    pub async fn remove(&self, requests: Vec<RemoveRequest>) -> Result<Vec<bool>> {
        self.execute(
            requests,
            |request| &request.key,
            |node, requests| Request::Remove {
                origin: WriteOrigin::client(node.clone()),
                requests,
            },
            |response| match response {
                Response::Remove(removed) => Ok(removed),
                other => Err(unexpected("remove", &other)),
            },
        )
        .await
    }

    async fn execute<R, X>(
        &self,
        requests: Vec<R>,
        key_of: fn(&R) -> &String,
        build: fn(&Node, Vec<R>) -> Request,
        extract: fn(Response) -> Result<Vec<X>>,
    ) -> Result<Vec<X>>
    where
        R: Clone + Send + Sync,
        X: Send,
    {
        let groups = self.group_by_shard(requests.iter().map(|r| key_of(r).as_str()));
        let mut slots: Vec<Option<X>> = std::iter::repeat_with(|| None)
            .take(requests.len())
            .collect();

        for group in groups {
            let node = &self.topology[group.shard];
            let batch: Vec<R> = group.positions.iter().map(|&i| requests[i].clone()).collect();
            let request = build(node, batch);
            tracing::debug!(
                shard = %node.name,
                operation = request.operation(),
                requests = group.positions.len(),
                "routing group"
            );

            let transport = self.transport.as_ref();
            let request = &request;
            let results = execute_with_failover(node, |endpoint| async move {
                extract(call(transport, &endpoint, request.clone()).await?)
            })
            .await?;

            if results.len() != group.positions.len() {
                return Err(Error::Protocol(format!(
                    "shard '{}' answered {} results for {} requests",
                    node.name,
                    results.len(),
                    group.positions.len()
                )));
            }
            for (position, result) in group.positions.into_iter().zip(results) {
                slots[position] = Some(result);
            }
        }

        slots
            .into_iter()
            .collect::<Option<Vec<X>>>()
            .ok_or_else(|| Error::Protocol("batch result left unfilled".into()))
    }
}

/// One sync call, with remote faults turned back into errors.
async fn call<T: SyncTransport + ?Sized>(
    transport: &T,
    endpoint: &Endpoint,
    request: Request,
) -> Result<Response> {
    match transport.call(endpoint, request).await? {
        Response::Fault(fault) => Err(fault.into()),
        response => Ok(response),
    }
}

fn unexpected(operation: &str, response: &Response) -> Error {
    let kind = match response {
        Response::Put(_) => "put",
        Response::Get(_) => "get",
        Response::Remove(_) => "remove",
        Response::Nodes(_) => "nodes",
        Response::Node(_) => "node",
        Response::Fault(_) => "fault",
    };
    Error::Protocol(format!("{operation} answered with a {kind} response"))
}
