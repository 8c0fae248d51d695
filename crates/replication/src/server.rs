//! Per-node request handler.
//!
//! Writes commit locally first, then copies of the committed batch are
//! enqueued for the other holders according to [`plan_forwarding`]. The
//! copy carries the version this node assigned (`replication_version`), so
//! every holder ends up storing the same version for the key.
//!
//! Forwarding is fire-and-forget: a failed enqueue is logged and counted,
//! never returned to the caller. Reads never forward and never consult the
//! topology; they return whatever this node holds right now.

use crate::forwarding::{plan_forwarding, ForwardPlan};
use crate::storage::{StorageBatch, StorageEngine};
use async_trait::async_trait;
use corelib::version::{validate_key, validate_parents};
use corelib::{
    AsyncTransport, Endpoint, Error, Fault, GetRequest, MetadataProvider, NodeService, NodeUri,
    PutRequest, PutResult, RemoveRequest, ReplicationMessage, Request, Response, Result, Value,
    WriteOrigin,
};
use std::sync::Arc;

pub struct ReplicationServer<S, Q> {
    name: String,
    local: NodeUri,
    metadata: Arc<MetadataProvider>,
    storage: Arc<S>,
    queue: Arc<Q>,
}

impl<S, Q> std::fmt::Debug for ReplicationServer<S, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationServer")
            .field("name", &self.name)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl<S: StorageEngine, Q: AsyncTransport> ReplicationServer<S, Q> {
    /// Starts the handler for the node whose sync endpoint is `local_sync`.
    ///
    /// The node finds its own shard, and with it its endpoints and peers,
    /// through the topology's reverse lookup. An address missing from the
    /// topology is a configuration error.
    pub fn bootstrap(
        local_sync: &Endpoint,
        metadata: Arc<MetadataProvider>,
        storage: Arc<S>,
        queue: Arc<Q>,
    ) -> Result<Self> {
        let own = metadata.node_by_uri(local_sync).ok_or_else(|| {
            Error::Configuration(format!("{local_sync} is not a primary in the topology"))
        })?;
        tracing::info!(
            node = %own.name,
            secondary = ?own.secondary.as_ref().map(|uri| uri.sync_uri.to_string()),
            tertiary = ?own.tertiary.as_ref().map(|uri| uri.sync_uri.to_string()),
            "replication server ready"
        );
        Ok(Self {
            name: own.name.clone(),
            local: own.primary.clone(),
            metadata,
            storage,
            queue,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local(&self) -> &NodeUri {
        &self.local
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Writes a batch locally and forwards copies.
    ///
    /// The batch is all-or-nothing: one invalid request or storage failure
    /// and nothing is committed or forwarded.
    pub async fn put(
        &self,
        origin: &WriteOrigin,
        requests: Vec<PutRequest>,
    ) -> Result<Vec<PutResult>> {
        let from_client = matches!(origin, WriteOrigin::ExternalClient { .. });
        for request in &requests {
            validate_key(&request.key)?;
            validate_parents(&request.key, &request.parent_versions)?;
            if from_client && request.replication_version.is_some() {
                return Err(Error::InvalidArgument(format!(
                    "key '{}': replication version is assigned by the shard's holders",
                    request.key
                )));
            }
        }

        let plan = plan_forwarding(origin, &self.local);
        let mut batch = self.storage.begin_batch()?;
        let mut results = Vec::with_capacity(requests.len());
        let mut outbox = Vec::new();
        for mut request in requests {
            let result = batch.put(&request)?;
            // Refused optimistic writes changed nothing, so there is nothing to copy.
            match result.version {
                Some(version) if !plan.is_empty() => {
                    request.replication_version = Some(version);
                    outbox.push(request);
                }
                _ => {}
            }
            results.push(result);
        }
        batch.commit()?;
        tracing::debug!(
            node = %self.name,
            role = ?plan.role,
            writes = results.len(),
            "put committed"
        );

        self.forward(&plan, ReplicationMessage::Put(outbox)).await;
        Ok(results)
    }

    /// Removes versions locally and forwards the removal with the same
    /// parent versions.
    pub async fn remove(
        &self,
        origin: &WriteOrigin,
        requests: Vec<RemoveRequest>,
    ) -> Result<Vec<bool>> {
        for request in &requests {
            validate_key(&request.key)?;
            validate_parents(&request.key, &request.parent_versions)?;
        }

        let plan = plan_forwarding(origin, &self.local);
        let mut batch = self.storage.begin_batch()?;
        let results = requests
            .iter()
            .map(|request| batch.remove(request))
            .collect::<Result<Vec<_>>>()?;
        batch.commit()?;
        tracing::debug!(
            node = %self.name,
            role = ?plan.role,
            removes = results.len(),
            "remove committed"
        );

        if !plan.is_empty() {
            self.forward(&plan, ReplicationMessage::Remove(requests)).await;
        }
        Ok(results)
    }

    /// Reads whatever this node currently holds.
    pub fn get(&self, requests: &[GetRequest]) -> Result<Vec<Vec<Value>>> {
        let mut batch = self.storage.begin_batch()?;
        requests.iter().map(|request| batch.get(request)).collect()
    }

    async fn forward(&self, plan: &ForwardPlan, message: ReplicationMessage) {
        if plan.is_empty() || message.is_empty() {
            return;
        }
        for target in &plan.targets {
            match self.queue.enqueue(target, message.clone()).await {
                Ok(()) => {
                    metrics::counter!("ringkv_replication_forwarded_total").increment(1);
                    tracing::debug!(
                        node = %self.name,
                        %target,
                        requests = message.len(),
                        "forward enqueued"
                    );
                }
                Err(e) => {
                    metrics::counter!("ringkv_replication_forward_failed_total").increment(1);
                    tracing::warn!(
                        node = %self.name,
                        %target,
                        error = %e,
                        "forward enqueue failed"
                    );
                }
            }
        }
    }
}

fn respond<T>(result: Result<T>, into: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => into(value),
        Err(e) => Response::Fault(Fault::from(&e)),
    }
}

#[async_trait]
impl<S: StorageEngine, Q: AsyncTransport> NodeService for ReplicationServer<S, Q> {
    async fn handle_call(&self, request: Request) -> Response {
        match request {
            Request::Put { origin, requests } => {
                respond(self.put(&origin, requests).await, Response::Put)
            }
            Request::Get { requests } => respond(self.get(&requests), Response::Get),
            Request::Remove { origin, requests } => {
                respond(self.remove(&origin, requests).await, Response::Remove)
            }
            Request::GetNetworkNodes => Response::Nodes(self.metadata.network_nodes().to_vec()),
            Request::GetNodeByUri { uri } => {
                Response::Node(self.metadata.node_by_uri(&uri).cloned())
            }
        }
    }

    async fn handle_message(&self, message: ReplicationMessage) {
        let origin = WriteOrigin::ReplicatedFromPeer;
        let outcome = match message {
            ReplicationMessage::Put(requests) => self.put(&origin, requests).await.map(|_| ()),
            ReplicationMessage::Remove(requests) => {
                self.remove(&origin, requests).await.map(|_| ())
            }
        };
        if let Err(e) = outcome {
            tracing::warn!(node = %self.name, error = %e, "replicated write rejected");
        }
    }
}
