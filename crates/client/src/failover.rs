//! Failover execution.
//!
//! One linear pass over a shard's holders: primary, then secondary, then
//! tertiary. The first success wins. Every call starts again at the
//! primary; there is no backoff, no memory of earlier failures and no
//! circuit breaker. A hung endpoint costs the full transport timeout before
//! the next one is tried.

use corelib::{Endpoint, Error, Node, Result};
use std::future::Future;

/// Runs `action` against each sync endpoint of `node` until one succeeds.
///
/// Any error, transport failure or remote fault alike, moves on to the next
/// holder. When the chain is exhausted the last error is returned.
pub async fn execute_with_failover<T, F, Fut>(node: &Node, mut action: F) -> Result<T>
where
    F: FnMut(Endpoint) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;
    for (attempt, endpoint) in node.failover_chain().enumerate() {
        if attempt > 0 {
            metrics::counter!("ringkv_client_failover_total").increment(1);
        }
        match action(endpoint.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(shard = %node.name, %endpoint, attempt, error = %e, "holder failed");
                last_error = Some(e);
            }
        }
    }

    metrics::counter!("ringkv_client_exhausted_total").increment(1);
    Err(last_error.unwrap_or_else(|| {
        Error::Configuration(format!("shard '{}' has no endpoints", node.name))
    }))
}
