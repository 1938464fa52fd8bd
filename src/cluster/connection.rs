//! The cluster connection: node links, pipeline cell, shard map.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::core::command::Cmd;
use crate::proto::Result;

use super::info::InfoMap;
use super::node::NodeConnection;
use super::pipeline::{new_cell, PipelineCell, PipelineState, ReplyHandle, PIPELINE_FLUSH_LIMIT};
use super::evaluate;
use super::shard::{Node, NodeId, ShardMap};

/// Fetches a fresh shard map from the cluster.
///
/// Supplied per request so callers decide how topology is rediscovered;
/// the connection invokes it at most once per batch evaluation, replaces
/// the shard-map cell's value, and reconciles node connections against the
/// new map.
#[async_trait]
pub trait RefreshShardMap: Send + Sync {
    /// Produces the current shard map, typically by querying the cluster.
    async fn refresh(&self) -> Result<ShardMap>;
}

/// Telemetry callbacks threaded through the connection.
///
/// All hooks are optional and default to no-ops; they are invoked inline
/// on the dispatching task, so they should be cheap.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Called with the node address and batch length before each per-node send.
    pub on_batch: Option<Arc<dyn Fn(&str, usize) + Send + Sync>>,
    /// Called with the redirection kind ("MOVED"/"ASK") and target address.
    pub on_redirect: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
    /// Called when a shard-map refresh begins.
    pub on_refresh: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Hooks {
    pub(crate) fn batch(&self, address: &str, len: usize) {
        if let Some(hook) = &self.on_batch {
            hook(address, len);
        }
    }

    pub(crate) fn redirect(&self, kind: &str, target: &str) {
        if let Some(hook) = &self.on_redirect {
            hook(kind, target);
        }
    }

    pub(crate) fn refresh(&self) {
        if let Some(hook) = &self.on_refresh {
            hook();
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_batch", &self.on_batch.is_some())
            .field("on_redirect", &self.on_redirect.is_some())
            .field("on_refresh", &self.on_refresh.is_some())
            .finish()
    }
}

/// A connection to the whole cluster.
///
/// Holds one [`NodeConnection`] per known node, the current pipeline cell,
/// and the shard-map cell. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    /// One connection per known node, keyed by id. Entries are added on
    /// refresh when a node first appears and dropped when it vanishes;
    /// surviving nodes keep their connection.
    node_conns: RwLock<HashMap<NodeId, Arc<NodeConnection>>>,
    /// The current pipeline cell. The outer mutex orders state-machine
    /// transitions; it is never held across network IO.
    pipeline: Mutex<PipelineCell>,
    /// The shard-map cell, replaced wholesale on refresh.
    shard_map: Arc<RwLock<ShardMap>>,
    infos: InfoMap,
    hooks: Hooks,
    timeout: Option<Duration>,
}

/// What a submission decided to do after the state transition.
enum FlushPlan {
    Enqueued,
    Pipeline(Vec<Cmd>),
    Transaction(Vec<Cmd>),
}

impl Connection {
    /// Connects to every node in the shard map.
    ///
    /// The map cell is taken as-is; discovery belongs to the caller (see
    /// [`SeedRefresher`](super::client::SeedRefresher) for the usual
    /// implementation). Dial failures on any node fail the connect.
    pub async fn connect(
        infos: InfoMap,
        shard_map: Arc<RwLock<ShardMap>>,
        timeout: Option<Duration>,
        hooks: Hooks,
    ) -> Result<Self> {
        let nodes = shard_map.read().await.nodes();

        let mut conns = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            let conn = NodeConnection::connect(node, timeout).await?;
            conns.insert(node.id.clone(), Arc::new(conn));
        }

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                node_conns: RwLock::new(conns),
                pipeline: Mutex::new(new_cell(PipelineState::Pending(Vec::new()))),
                shard_map,
                infos,
                hooks,
                timeout,
            }),
        })
    }

    /// Closes every node connection.
    ///
    /// Outstanding reply handles over already-executed batches keep their
    /// replies; unflushed batches will fail on resolution.
    pub async fn disconnect(&self) {
        self.inner.node_conns.write().await.clear();
    }

    /// Submits a request to the pipeline and returns a lazy reply handle.
    ///
    /// The state transition runs under the connection-level lock; when it
    /// decides to flush, the outgoing cell is swapped out first, the lock
    /// released, and the flush runs holding only the detached cell's lock.
    /// Nothing is sent for a plain enqueue until some handle of the batch
    /// is awaited.
    pub async fn request_pipelined(
        &self,
        refresher: &Arc<dyn RefreshShardMap>,
        request: Cmd,
    ) -> ReplyHandle {
        let is_multi = request.name_matches("MULTI");

        let mut installed = self.inner.pipeline.lock().await;
        let cell = Arc::clone(&*installed);
        // Owned guard: it must outlive the connection-level critical
        // section when the cell is detached for an inline flush.
        let mut state = cell.clone().lock_owned().await;

        let (handle_cell, index, plan) = match &mut *state {
            PipelineState::Pending(queue) => {
                if is_multi {
                    // The open batch flushes; the transaction starts fresh.
                    let fresh = new_cell(PipelineState::TransactionPending(vec![request]));
                    *installed = Arc::clone(&fresh);
                    (fresh, 0, FlushPlan::Pipeline(std::mem::take(queue)))
                } else if queue.len() >= PIPELINE_FLUSH_LIMIT {
                    queue.push(request);
                    let index = queue.len() - 1;
                    *installed = new_cell(PipelineState::Pending(Vec::new()));
                    (
                        Arc::clone(&cell),
                        index,
                        FlushPlan::Pipeline(std::mem::take(queue)),
                    )
                } else {
                    queue.push(request);
                    (Arc::clone(&cell), queue.len() - 1, FlushPlan::Enqueued)
                }
            }
            PipelineState::TransactionPending(queue) => {
                if request.name_matches("EXEC") {
                    queue.push(request);
                    let index = queue.len() - 1;
                    *installed = new_cell(PipelineState::Pending(Vec::new()));
                    (
                        Arc::clone(&cell),
                        index,
                        FlushPlan::Transaction(std::mem::take(queue)),
                    )
                } else {
                    queue.push(request);
                    (Arc::clone(&cell), queue.len() - 1, FlushPlan::Enqueued)
                }
            }
            PipelineState::Executed(_) => {
                // The executed cell stays visible to its handles; the new
                // request opens a fresh one.
                let fresh = if is_multi {
                    new_cell(PipelineState::TransactionPending(vec![request]))
                } else {
                    new_cell(PipelineState::Pending(vec![request]))
                };
                *installed = Arc::clone(&fresh);
                (fresh, 0, FlushPlan::Enqueued)
            }
        };

        // Release the connection-level lock before any flush IO.
        drop(installed);

        match plan {
            FlushPlan::Enqueued => drop(state),
            FlushPlan::Pipeline(queue) => {
                let result =
                    evaluate::run_pipeline(&self.inner, refresher.as_ref(), queue).await;
                *state = PipelineState::Executed(Arc::new(result));
                drop(state);
            }
            FlushPlan::Transaction(queue) => {
                let result =
                    evaluate::run_transaction(&self.inner, refresher.as_ref(), queue).await;
                *state = PipelineState::Executed(Arc::new(result));
                drop(state);
            }
        }

        ReplyHandle::new(
            handle_cell,
            index,
            Arc::clone(&self.inner),
            Arc::clone(refresher),
        )
    }

    /// Deduplicated list of every node in the current shard map.
    pub async fn nodes(&self) -> Vec<Node> {
        self.inner.shard_map.read().await.nodes()
    }

    /// The shard-map cell shared with refreshers and the caller.
    pub fn shard_map_cell(&self) -> &Arc<RwLock<ShardMap>> {
        &self.inner.shard_map
    }

    /// The telemetry hooks threaded through this connection.
    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl ConnectionInner {
    /// A point-in-time copy of the shard map; evaluation routes against it
    /// even if a refresh replaces the cell mid-batch.
    pub(crate) async fn shard_map_snapshot(&self) -> ShardMap {
        self.shard_map.read().await.clone()
    }

    /// A point-in-time copy of the node connection table.
    pub(crate) async fn node_connections(&self) -> HashMap<NodeId, Arc<NodeConnection>> {
        self.node_conns.read().await.clone()
    }

    pub(crate) async fn connection_for(&self, id: &NodeId) -> Option<Arc<NodeConnection>> {
        self.node_conns.read().await.get(id).cloned()
    }

    pub(crate) fn infos(&self) -> &InfoMap {
        &self.infos
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Fetches a fresh shard map, replaces the cell's value, and
    /// reconciles node connections against the new topology.
    pub(crate) async fn refresh_shard_map(
        &self,
        refresher: &dyn RefreshShardMap,
    ) -> Result<()> {
        info!("refreshing shard map");
        self.hooks.refresh();

        let fresh = refresher.refresh().await?;
        {
            let mut map = self.shard_map.write().await;
            *map = fresh.clone();
        }
        self.reconcile_nodes(&fresh).await;
        Ok(())
    }

    /// Dials nodes the new map introduced and drops ones it no longer
    /// names. Surviving nodes keep their connection and its remainder.
    async fn reconcile_nodes(&self, map: &ShardMap) {
        let nodes = map.nodes();
        let known: HashSet<NodeId> = self.node_conns.read().await.keys().cloned().collect();

        // Dial outside the lock; a node that refuses now will surface as
        // missing-node when something routes to it.
        let mut added = Vec::new();
        for node in &nodes {
            if !known.contains(&node.id) {
                match NodeConnection::connect(node, self.timeout).await {
                    Ok(conn) => added.push((node.id.clone(), Arc::new(conn))),
                    Err(e) => {
                        warn!(node = %node.id, address = %node.address(), error = %e,
                            "failed to connect to new node");
                    }
                }
            }
        }

        let live: HashSet<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        let mut conns = self.node_conns.write().await;
        conns.retain(|id, _| live.contains(id));
        for (id, conn) in added {
            conns.insert(id, conn);
        }
    }
}
