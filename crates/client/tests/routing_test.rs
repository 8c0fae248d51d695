//! End-to-end tests for the routing client on an in-process cluster.
//!
//! # Test Strategy
//!
//! 1. **Round trip**: put, get and remove through the client
//! 2. **Batch order**: results line up with inputs across shards
//! 3. **Failover**: down and hung holders are skipped, exhaustion fails
//! 4. **Convergence**: replicas catch up once the mailbox is pumped
//! 5. **Determinism**: the same key always lands on the same shard

use corelib::{
    Endpoint, Error, FaultKind, GetRequest, MetadataProvider, Node, PutRequest, RemoveRequest,
    Request, Response, SyncTransport, TopologyConfig, TransportError, Value,
};
use client::RoutingClient;
use proptest::prelude::*;
use replication::{MemoryStorage, ReplicationServer};
use std::sync::Arc;
use std::time::Duration;
use transport::InMemoryNetwork;

const POLL_ATTEMPTS: usize = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Cluster {
    network: Arc<InMemoryNetwork>,
    client: RoutingClient<InMemoryNetwork>,
}

impl Cluster {
    fn start() -> Self {
        Self::with_network(InMemoryNetwork::new())
    }

    fn with_network(network: InMemoryNetwork) -> Self {
        let config = TopologyConfig::ring(["a", "b", "c"].into_iter().map(|n| {
            (
                n.to_string(),
                Endpoint::new(format!("tcp://{n}:2200")),
                Endpoint::new(format!("queue://{n}")),
            )
        }));
        let metadata = Arc::new(MetadataProvider::new(&config).unwrap());
        let network = Arc::new(network);
        for node in metadata.network_nodes() {
            let storage = Arc::new(MemoryStorage::new(corelib::InstanceId::from_name(&node.name)));
            let server = ReplicationServer::bootstrap(
                &node.primary.sync_uri,
                metadata.clone(),
                storage,
                network.clone(),
            )
            .unwrap();
            network.register(&node.primary, Arc::new(server));
        }
        let client =
            RoutingClient::with_topology(network.clone(), metadata.network_nodes().to_vec())
                .unwrap();
        Self { network, client }
    }

    fn node(&self, name: &str) -> &Node {
        self.client
            .network_nodes()
            .iter()
            .find(|n| n.name == name)
            .unwrap()
    }

    /// Reads `key` straight from one endpoint, bypassing routing.
    async fn read_at(&self, endpoint: &Endpoint, key: &str) -> Vec<Value> {
        let request = Request::Get {
            requests: vec![GetRequest::new(key)],
        };
        match self.network.call(endpoint, request).await.unwrap() {
            Response::Get(mut values) => values.remove(0),
            other => panic!("unexpected {other:?}"),
        }
    }

    /// Pumps the mailbox until `check` holds for `key` at `endpoint`.
    async fn eventually(
        &self,
        endpoint: &Endpoint,
        key: &str,
        check: impl Fn(&[Value]) -> bool,
    ) -> bool {
        for _ in 0..POLL_ATTEMPTS {
            self.network.deliver_pending().await;
            if check(&self.read_at(endpoint, key).await) {
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        false
    }
}

fn holds_bytes(expected: &'static [u8]) -> impl Fn(&[Value]) -> bool {
    move |values: &[Value]| values.len() == 1 && values[0].data == expected
}

// ============================================================================
// Round Trip
// ============================================================================

#[tokio::test]
async fn test_put_get_remove_round_trip() {
    let cluster = Cluster::start();
    let client = &cluster.client;

    let results = client
        .put(vec![PutRequest::new("k1", vec![0x01u8, 0x02])])
        .await
        .unwrap();
    assert!(!results[0].conflict_exists);
    let version = results[0].version.unwrap();

    let values = client.get(vec![GetRequest::new("k1")]).await.unwrap();
    assert_eq!(values[0].len(), 1);
    assert_eq!(values[0][0].data, vec![0x01, 0x02]);
    assert_eq!(values[0][0].version, version);

    let removed = client
        .remove(vec![RemoveRequest::new("k1", [version])])
        .await
        .unwrap();
    assert_eq!(removed, vec![true]);
    assert!(client.get(vec![GetRequest::new("k1")]).await.unwrap()[0].is_empty());
}

#[tokio::test]
async fn test_remote_fault_surfaces_as_error() {
    let cluster = Cluster::start();
    let err = cluster
        .client
        .put(vec![PutRequest::new("__ringkv:internal", vec![1u8])])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(corelib::Fault::from(&err).kind, FaultKind::InvalidArgument);
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let cluster = Cluster::start();
    assert!(cluster.client.put(vec![]).await.unwrap().is_empty());
    assert!(cluster.client.get(vec![]).await.unwrap().is_empty());
}

// ============================================================================
// Batch Order Preservation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_batch_results_follow_input_order(
        keys in prop::collection::hash_set("[a-z0-9]{1,12}", 1..48)
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (puts, gets) = runtime.block_on(async {
            let cluster = Cluster::start();
            let puts = cluster
                .client
                .put(keys.iter().map(|k| PutRequest::new(k.clone(), k.as_bytes())).collect())
                .await
                .unwrap();
            // Read back in reverse to make sure grouping, not input order, is undone.
            let gets = cluster
                .client
                .get(keys.iter().rev().map(|k| GetRequest::new(k.clone())).collect())
                .await
                .unwrap();
            (puts, gets)
        });

        prop_assert_eq!(puts.len(), keys.len());
        prop_assert_eq!(gets.len(), keys.len());
        for (i, key) in keys.iter().rev().enumerate() {
            prop_assert_eq!(gets[i].len(), 1);
            prop_assert_eq!(&gets[i][0].data, &key.as_bytes().to_vec());
            prop_assert_eq!(&gets[i][0].key, key);
        }
        for i in 0..keys.len() {
            let position = keys.len() - 1 - i;
            prop_assert_eq!(Some(gets[position][0].version), puts[i].version);
        }
    }
}

// ============================================================================
// Failover
// ============================================================================

#[tokio::test]
async fn test_primary_down_uses_secondary() {
    let cluster = Cluster::start();
    let owner = cluster.client.shard_for("k1").clone();
    cluster.network.set_down(&owner.primary);

    cluster
        .client
        .put(vec![PutRequest::new("k1", vec![7u8])])
        .await
        .unwrap();
    let values = cluster.client.get(vec![GetRequest::new("k1")]).await.unwrap();
    assert_eq!(values[0][0].data, vec![7]);

    let secondary = owner.secondary.as_ref().unwrap();
    assert_eq!(cluster.read_at(&secondary.sync_uri, "k1").await.len(), 1);
}

#[tokio::test]
async fn test_primary_and_secondary_down_uses_tertiary() {
    let cluster = Cluster::start();
    let owner = cluster.client.shard_for("k1").clone();
    cluster.network.set_down(&owner.primary);
    cluster.network.set_down(owner.secondary.as_ref().unwrap());

    cluster
        .client
        .put(vec![PutRequest::new("k1", vec![8u8])])
        .await
        .unwrap();
    let values = cluster.client.get(vec![GetRequest::new("k1")]).await.unwrap();
    assert_eq!(values[0][0].data, vec![8]);
}

#[tokio::test]
async fn test_hung_primary_times_out_then_fails_over() {
    let cluster = Cluster::with_network(InMemoryNetwork::with_timeout(Duration::from_millis(50)));
    let owner = cluster.client.shard_for("k1").clone();
    cluster.network.hang(&owner.primary);

    let results = cluster
        .client
        .put(vec![PutRequest::new("k1", vec![9u8])])
        .await
        .unwrap();
    assert!(results[0].version.is_some());
}

#[tokio::test]
async fn test_all_holders_down_fails() {
    let cluster = Cluster::start();
    let owner = cluster.client.shard_for("k1").clone();
    for uri in owner.holders() {
        cluster.network.set_down(uri);
    }

    let err = cluster
        .client
        .put(vec![PutRequest::new("k1", vec![1u8])])
        .await
        .unwrap_err();
    match err {
        Error::Transport(TransportError::Unreachable { endpoint }) => {
            assert_eq!(Some(&endpoint), owner.failover_chain().last());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_fails_over_across_seed() {
    let cluster = Cluster::start();
    let seed = cluster.node("a").clone();
    cluster.network.set_down(&seed.primary);

    let client = RoutingClient::connect(cluster.network.clone(), &seed)
        .await
        .unwrap();
    assert_eq!(client.network_nodes(), cluster.client.network_nodes());
}

// ============================================================================
// Convergence
// ============================================================================

#[tokio::test]
async fn test_replicas_converge_after_put() {
    let cluster = Cluster::start();
    let owner = cluster.client.shard_for("k1").clone();
    cluster
        .client
        .put(vec![PutRequest::new("k1", vec![0x01u8, 0x02])])
        .await
        .unwrap();

    for uri in [&owner.secondary, &owner.tertiary] {
        let endpoint = &uri.as_ref().unwrap().sync_uri;
        assert!(
            cluster
                .eventually(endpoint, "k1", holds_bytes(&[0x01, 0x02]))
                .await,
            "{endpoint} never converged"
        );
    }
}

#[tokio::test]
async fn test_removal_replicates_to_all_holders() {
    let cluster = Cluster::start();
    let owner = cluster.client.shard_for("k1").clone();
    let version = cluster
        .client
        .put(vec![PutRequest::new("k1", vec![3u8])])
        .await
        .unwrap()[0]
        .version
        .unwrap();
    for endpoint in owner.failover_chain() {
        assert!(cluster.eventually(endpoint, "k1", holds_bytes(&[3])).await);
    }

    cluster
        .client
        .remove(vec![RemoveRequest::new("k1", [version])])
        .await
        .unwrap();
    for endpoint in owner.failover_chain() {
        assert!(
            cluster.eventually(endpoint, "k1", |v| v.is_empty()).await,
            "{endpoint} still holds k1"
        );
    }
}

#[tokio::test]
async fn test_removal_through_failover_holder_reaches_all_holders() {
    let cluster = Cluster::start();
    let owner = cluster.client.shard_for("k1").clone();
    let version = cluster
        .client
        .put(vec![PutRequest::new("k1", vec![5u8])])
        .await
        .unwrap()[0]
        .version
        .unwrap();
    for endpoint in owner.failover_chain() {
        assert!(cluster.eventually(endpoint, "k1", holds_bytes(&[5])).await);
    }

    // The secondary takes the remove and forwards it to the primary and tertiary.
    cluster.network.set_down(&owner.primary);
    let removed = cluster
        .client
        .remove(vec![RemoveRequest::new("k1", [version])])
        .await
        .unwrap();
    assert_eq!(removed, vec![true]);
    cluster.network.deliver_pending().await;
    let secondary = &owner.secondary.as_ref().unwrap().sync_uri;
    assert!(cluster.read_at(secondary, "k1").await.is_empty());

    cluster.network.set_up(&owner.primary);
    for endpoint in owner.failover_chain() {
        assert!(
            cluster.eventually(endpoint, "k1", |v| v.is_empty()).await,
            "{endpoint} still holds k1"
        );
    }
}

#[tokio::test]
async fn test_failover_write_reaches_primary_when_it_returns() {
    let cluster = Cluster::start();
    let owner = cluster.client.shard_for("k1").clone();
    cluster.network.set_down(&owner.primary);
    cluster
        .client
        .put(vec![PutRequest::new("k1", vec![4u8])])
        .await
        .unwrap();
    cluster.network.deliver_pending().await;

    cluster.network.set_up(&owner.primary);
    assert!(
        cluster
            .eventually(&owner.primary.sync_uri, "k1", holds_bytes(&[4]))
            .await
    );
}

// ============================================================================
// Determinism and the Three-Node Scenario
// ============================================================================

#[tokio::test]
async fn test_shard_mapping_is_deterministic() {
    let cluster = Cluster::start();
    let other = RoutingClient::connect(cluster.network.clone(), cluster.node("b"))
        .await
        .unwrap();
    for i in 0..200 {
        let key = format!("key-{i}");
        let first = cluster.client.shard_for(&key);
        assert_eq!(first, cluster.client.shard_for(&key));
        assert_eq!(first, other.shard_for(&key));
    }
}

#[tokio::test]
async fn test_three_node_ring_scenario() {
    let cluster = Cluster::start();
    let (a, b, c) = (cluster.node("a"), cluster.node("b"), cluster.node("c"));
    assert_eq!(a.secondary.as_ref(), Some(&b.primary));
    assert_eq!(a.tertiary.as_ref(), Some(&c.primary));
    assert_eq!(b.secondary.as_ref(), Some(&c.primary));
    assert_eq!(b.tertiary.as_ref(), Some(&a.primary));
    assert_eq!(c.secondary.as_ref(), Some(&a.primary));
    assert_eq!(c.tertiary.as_ref(), Some(&b.primary));

    cluster
        .client
        .put(vec![PutRequest::new("k1", vec![0x01u8, 0x02])])
        .await
        .unwrap();

    let owner = cluster.client.shard_for("k1").clone();
    let immediate = cluster.read_at(&owner.primary.sync_uri, "k1").await;
    assert_eq!(immediate[0].data, vec![0x01, 0x02]);

    for node in [a, b, c].into_iter().filter(|n| n.name != owner.name) {
        assert!(
            cluster
                .eventually(&node.primary.sync_uri, "k1", holds_bytes(&[0x01, 0x02]))
                .await,
            "{} never converged",
            node.name
        );
    }
}
