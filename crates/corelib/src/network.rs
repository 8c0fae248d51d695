//! Transport-agnostic contracts between nodes.
//!
//! Two kinds of delivery exist:
//!
//! - [`SyncTransport`]: request/response against a sync endpoint. Failures
//!   (unreachable, timeout) are what client failover walks across.
//! - [`AsyncTransport`]: fire-and-forget enqueue to an async endpoint, used
//!   only for replication forwarding. Delivery is at-least-once at the
//!   transport's discretion, with no ordering promise.
//!
//! [`NodeService`] is the receiving side a transport dispatches into.

use crate::error::TransportError;
use crate::node::Endpoint;
use crate::protocol::{ReplicationMessage, Request, Response};
use async_trait::async_trait;

#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    /// Sends `request` to `endpoint` and waits for the answer, bounded by the
    /// transport's own timeout.
    async fn call(&self, endpoint: &Endpoint, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
pub trait AsyncTransport: Send + Sync + 'static {
    /// Queues `message` for `endpoint` without waiting for it to be applied.
    async fn enqueue(
        &self,
        endpoint: &Endpoint,
        message: ReplicationMessage,
    ) -> Result<(), TransportError>;
}

#[async_trait]
pub trait NodeService: Send + Sync + 'static {
    /// Handles a call that arrived on the node's sync endpoint.
    async fn handle_call(&self, request: Request) -> Response;

    /// Handles a message that arrived on the node's async endpoint.
    async fn handle_message(&self, message: ReplicationMessage);
}
