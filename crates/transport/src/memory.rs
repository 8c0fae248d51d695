//! In-process network.
//!
//! Every call and every message goes through the codec, so whatever reaches
//! a service has survived the same framing a real wire would apply.
//!
//! Sync calls are dispatched immediately. Replication messages are pushed
//! onto a lock-free mailbox and only applied when [`InMemoryNetwork::deliver_pending`]
//! runs; nothing is delivered in the background. Messages addressed to a node
//! that is down stay queued until it comes back, which mirrors a durable
//! queue holding mail for an offline machine.

use crate::codec;
use async_trait::async_trait;
use bytes::Bytes;
use corelib::{
    AsyncTransport, Endpoint, NodeService, NodeUri, ReplicationMessage, Request, Response,
    SyncTransport, TransportError,
};
use crossbeam::queue::SegQueue;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

pub struct InMemoryNetwork {
    sync_services: DashMap<Endpoint, Arc<dyn NodeService>>,
    async_services: DashMap<Endpoint, Arc<dyn NodeService>>,
    down: DashSet<Endpoint>,
    hung: DashSet<Endpoint>,
    mailbox: SegQueue<(Endpoint, Bytes)>,
    call_timeout: Duration,
}

impl std::fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNetwork")
            .field("nodes", &self.sync_services.len())
            .field("pending", &self.mailbox.len())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CALL_TIMEOUT)
    }

    /// A network whose sync calls give up after `call_timeout`.
    pub fn with_timeout(call_timeout: Duration) -> Self {
        Self {
            sync_services: DashMap::new(),
            async_services: DashMap::new(),
            down: DashSet::new(),
            hung: DashSet::new(),
            mailbox: SegQueue::new(),
            call_timeout,
        }
    }

    /// Makes `service` answer on both endpoints of `uri`.
    pub fn register(&self, uri: &NodeUri, service: Arc<dyn NodeService>) {
        self.sync_services
            .insert(uri.sync_uri.clone(), Arc::clone(&service));
        self.async_services.insert(uri.async_uri.clone(), service);
    }

    /// Takes both endpoints of a node offline.
    pub fn set_down(&self, uri: &NodeUri) {
        self.down.insert(uri.sync_uri.clone());
        self.down.insert(uri.async_uri.clone());
    }

    /// Brings a node back, clearing any hang as well.
    pub fn set_up(&self, uri: &NodeUri) {
        self.down.remove(&uri.sync_uri);
        self.down.remove(&uri.async_uri);
        self.hung.remove(&uri.sync_uri);
    }

    /// Sync calls to this node are accepted but never answered.
    pub fn hang(&self, uri: &NodeUri) {
        self.hung.insert(uri.sync_uri.clone());
    }

    /// Number of replication messages waiting in the mailbox.
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Applies every message queued before this call.
    ///
    /// Messages enqueued by the handlers themselves are left for the next
    /// call. Returns the number of messages applied.
    pub async fn deliver_pending(&self) -> usize {
        let mut delivered = 0;
        for _ in 0..self.mailbox.len() {
            let Some((endpoint, frame)) = self.mailbox.pop() else {
                break;
            };
            if self.down.contains(&endpoint) {
                self.mailbox.push((endpoint, frame));
                continue;
            }
            let service = match self.async_services.get(&endpoint) {
                Some(entry) => Arc::clone(entry.value()),
                None => {
                    tracing::warn!(%endpoint, "dropping message for unknown endpoint");
                    continue;
                }
            };
            match codec::decode::<ReplicationMessage>(&frame) {
                Ok(message) => {
                    service.handle_message(message).await;
                    delivered += 1;
                }
                Err(e) => tracing::warn!(%endpoint, error = %e, "dropping undecodable message"),
            }
        }
        delivered
    }
}

#[async_trait]
impl SyncTransport for InMemoryNetwork {
    async fn call(
        &self,
        endpoint: &Endpoint,
        request: Request,
    ) -> Result<Response, TransportError> {
        let unreachable = || TransportError::Unreachable {
            endpoint: endpoint.clone(),
        };
        if self.down.contains(endpoint) {
            return Err(unreachable());
        }
        let service = self
            .sync_services
            .get(endpoint)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(unreachable)?;

        let frame = codec::encode(&request)?;
        let hung = self.hung.contains(endpoint);
        let exchange = async move {
            if hung {
                std::future::pending::<()>().await;
            }
            let request: Request = codec::decode(&frame)?;
            let response = service.handle_call(request).await;
            codec::encode(&response)
        };

        let frame = tokio::time::timeout(self.call_timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout {
                endpoint: endpoint.clone(),
            })??;
        codec::decode(&frame)
    }
}

#[async_trait]
impl AsyncTransport for InMemoryNetwork {
    async fn enqueue(
        &self,
        endpoint: &Endpoint,
        message: ReplicationMessage,
    ) -> Result<(), TransportError> {
        if !self.async_services.contains_key(endpoint) {
            return Err(TransportError::Unreachable {
                endpoint: endpoint.clone(),
            });
        }
        let frame = codec::encode(&message)?;
        self.mailbox.push((endpoint.clone(), frame));
        Ok(())
    }
}
