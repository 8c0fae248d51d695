//! Subcommands of the `ringkv` binary.

use anyhow::{bail, Context};
use clap::{Subcommand, ValueEnum};
use client::RoutingClient;
use corelib::{
    Endpoint, GetRequest, MetadataProvider, Node, Partitioner, PutRequest, Request, Response,
    Sip13Partitioner, SyncTransport, Value, Xxh3Partitioner,
};
use replication::{MemoryStorage, ReplicationServer};
use std::sync::Arc;
use std::time::Duration;
use transport::InMemoryNetwork;

pub type CommandResult = anyhow::Result<()>;

const CONVERGENCE_ATTEMPTS: usize = 10;
const CONVERGENCE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print every shard's replica triplet.
    Topology,
    /// Show the owning shard and failover chain of each key.
    Route {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long, value_enum, default_value_t = HashFunction::Xxh3)]
        hash: HashFunction,
    },
    /// Run the topology as an in-process cluster, write one key and wait for
    /// every holder to converge.
    Demo {
        #[arg(long, default_value = "k1")]
        key: String,
        #[arg(long, default_value = "hello")]
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HashFunction {
    Xxh3,
    Sip13,
}

fn describe(node: &Node) -> String {
    let replica = |uri: &Option<corelib::NodeUri>| {
        uri.as_ref()
            .map_or_else(|| "-".to_string(), |uri| uri.sync_uri.to_string())
    };
    format!(
        "{:<12} primary={} secondary={} tertiary={}",
        node.name,
        node.primary.sync_uri,
        replica(&node.secondary),
        replica(&node.tertiary)
    )
}

pub fn show_topology(metadata: &MetadataProvider) -> CommandResult {
    for node in metadata.network_nodes() {
        println!("{}", describe(node));
    }
    Ok(())
}

/// One line per key: owning shard, then the endpoints failover would try.
pub fn route_lines<P: Partitioner>(
    partitioner: &P,
    nodes: &[Node],
    keys: &[String],
) -> Vec<String> {
    keys.iter()
        .map(|key| {
            let node = &nodes[partitioner.shard_index(key.as_bytes(), nodes.len())];
            let chain: Vec<&str> = node.failover_chain().map(Endpoint::as_str).collect();
            format!("{key} -> {} via {}", node.name, chain.join(" > "))
        })
        .collect()
}

pub fn route(metadata: &MetadataProvider, keys: &[String], hash: HashFunction) -> CommandResult {
    let nodes = metadata.network_nodes();
    let lines = match hash {
        HashFunction::Xxh3 => route_lines(&Xxh3Partitioner, nodes, keys),
        HashFunction::Sip13 => route_lines(&Sip13Partitioner, nodes, keys),
    };
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

async fn read_at(
    network: &InMemoryNetwork,
    endpoint: &Endpoint,
    key: &str,
) -> anyhow::Result<Vec<Value>> {
    let request = Request::Get {
        requests: vec![GetRequest::new(key)],
    };
    match network.call(endpoint, request).await? {
        Response::Get(mut values) if values.len() == 1 => Ok(values.remove(0)),
        other => bail!("unexpected answer from {endpoint}: {other:?}"),
    }
}

/// Starts one server per node, writes `key` through the routing client and
/// pumps replication until every holder returns the written bytes.
pub async fn demo(metadata: &MetadataProvider, key: &str, value: &[u8]) -> CommandResult {
    let metadata = Arc::new(metadata.clone());
    let network = Arc::new(InMemoryNetwork::new());
    for node in metadata.network_nodes() {
        let storage = Arc::new(MemoryStorage::new(corelib::InstanceId::from_name(&node.name)));
        let server = ReplicationServer::bootstrap(
            &node.primary.sync_uri,
            Arc::clone(&metadata),
            storage,
            Arc::clone(&network),
        )?;
        network.register(&node.primary, Arc::new(server));
    }

    let seed = metadata
        .network_nodes()
        .first()
        .context("topology has no nodes")?;
    let client = RoutingClient::connect(Arc::clone(&network), seed).await?;
    let owner = client.shard_for(key).clone();

    let results = client.put(vec![PutRequest::new(key, value)]).await?;
    tracing::info!(%key, shard = %owner.name, version = ?results[0].version, "written");

    let immediate = read_at(&network, &owner.primary.sync_uri, key).await?;
    if !immediate.iter().any(|v| v.data == value) {
        bail!("owner {} does not hold {key} right after the write", owner.name);
    }

    for holder in owner.holders() {
        let mut converged = false;
        for attempt in 0..CONVERGENCE_ATTEMPTS {
            network.deliver_pending().await;
            let values = read_at(&network, &holder.sync_uri, key).await?;
            if values.iter().any(|v| v.data == value) {
                tracing::info!(holder = %holder.sync_uri, attempt, "converged");
                converged = true;
                break;
            }
            tokio::time::sleep(CONVERGENCE_INTERVAL).await;
        }
        if !converged {
            bail!("{} did not converge on {key}", holder.sync_uri);
        }
    }

    println!("{key} replicated to {} holder(s)", owner.holders().count());
    Ok(())
}
