//! Batch evaluation.
//!
//! A flushed pipeline batch is evaluated against a snapshot of the shard
//! map: requests are regrouped into per-node sub-pipelines, dispatched
//! concurrently, corrected for redirections, and reassembled in submission
//! order. Transactions take the narrower path: one slot, one node, the
//! whole batch retried together.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future;
use tracing::debug;

use crate::core::command::Cmd;
use crate::proto::frame::Frame;
use crate::proto::{Error, Result};

use super::connection::{ConnectionInner, RefreshShardMap};
use super::node::NodeConnection;
use super::redirect;
use super::route;
use super::shard::NodeId;

/// A request waiting for dispatch, tagged with its submission index.
struct PendingRequest {
    index: usize,
    request: Cmd,
}

/// A dispatched request paired with its reply.
struct CompletedRequest {
    index: usize,
    request: Cmd,
    reply: Frame,
}

/// Evaluates a non-transactional batch.
///
/// Requests arrive in submission order. Broadcast requests contribute one
/// per-node copy sharing a single submission index, so the reply vector
/// carries one reply per master for them, ordered by node id.
pub(crate) async fn run_pipeline(
    inner: &ConnectionInner,
    refresher: &dyn RefreshShardMap,
    requests: Vec<Cmd>,
) -> Result<Vec<Frame>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let shard_map = inner.shard_map_snapshot().await;
    let conns = inner.node_connections().await;

    // Group by node id; BTreeMap keeps dispatch (and with it broadcast
    // reply order) deterministic.
    let mut groups: BTreeMap<NodeId, (Arc<NodeConnection>, Vec<PendingRequest>)> = BTreeMap::new();
    for (index, request) in requests.iter().enumerate() {
        let targets = route::node_connections_for(&shard_map, &conns, inner.infos(), request)?;
        for conn in targets {
            groups
                .entry(conn.id().clone())
                .or_insert_with(|| (Arc::clone(&conn), Vec::new()))
                .1
                .push(PendingRequest {
                    index,
                    request: request.clone(),
                });
        }
    }

    debug!(
        requests = requests.len(),
        nodes = groups.len(),
        "dispatching pipeline batch"
    );

    let dispatches = groups.into_values().map(|(conn, pending)| {
        let hooks = inner.hooks().clone();
        async move {
            hooks.batch(conn.address(), pending.len());
            let batch: Vec<Cmd> = pending.iter().map(|p| p.request.clone()).collect();
            let replies = conn.request(&batch).await?;
            let completed = pending
                .into_iter()
                .zip(replies)
                .map(|(p, reply)| CompletedRequest {
                    index: p.index,
                    request: p.request,
                    reply,
                })
                .collect::<Vec<_>>();
            Ok::<_, Error>(completed)
        }
    });

    let mut completed = Vec::with_capacity(requests.len());
    for result in future::join_all(dispatches).await {
        completed.extend(result?);
    }

    // At most one refresh per batch evaluation, however many MOVEDs came back.
    if completed.iter().any(|c| redirect::is_moved(&c.reply)) {
        inner.refresh_shard_map(refresher).await?;
    }

    // Redirections are corrected per reply, each treated as a one-request
    // batch, so only the requests that actually moved get re-sent.
    let mut corrected = Vec::with_capacity(completed.len());
    for c in completed {
        let replies = redirect::retry_batch(
            inner,
            refresher,
            std::slice::from_ref(&c.request),
            vec![c.reply],
        )
        .await?;
        let reply = replies.into_iter().next().ok_or_else(|| Error::Protocol {
            message: "redirection retry returned no reply".to_string(),
        })?;
        corrected.push(CompletedRequest {
            index: c.index,
            request: c.request,
            reply,
        });
    }

    // Stable: same-index broadcast replies keep their node-id order.
    corrected.sort_by_key(|c| c.index);
    Ok(corrected.into_iter().map(|c| c.reply).collect())
}

/// Evaluates a MULTI..EXEC batch.
///
/// Every key in the transaction must hash to one slot; the whole batch is
/// sent to that slot's master as a single pipeline. A MOVED on the EXEC
/// refreshes the map and re-runs the entire transaction on the new owner.
/// TRYAGAIN is not retried; it reaches the caller as a plain error reply.
pub(crate) async fn run_transaction(
    inner: &ConnectionInner,
    refresher: &dyn RefreshShardMap,
    requests: Vec<Cmd>,
) -> Result<Vec<Frame>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let slot = route::slot_for_requests(inner.infos(), &requests)?;
    let shard_map = inner.shard_map_snapshot().await;
    let conns = inner.node_connections().await;
    let conn = route::master_connection_for_slot(&shard_map, &conns, slot)?;

    debug!(slot, requests = requests.len(), "dispatching transaction");
    inner.hooks().batch(conn.address(), requests.len());

    let replies = conn.request(&requests).await?;

    if replies.iter().any(redirect::is_moved) {
        inner.refresh_shard_map(refresher).await?;
    }

    redirect::retry_batch(inner, refresher, &requests, replies).await
}
