//! High-level cluster client.
//!
//! Wraps the pipelining [`Connection`] with seed-based topology discovery
//! and a small convenience command surface. Every operation goes through
//! `request_pipelined`, so callers issuing several operations before
//! awaiting any of them get implicit batching for free.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tracing::warn;

use crate::core::command::{self, Cmd};
use crate::core::connection::Connection as NodeStream;
use crate::proto::frame::Frame;
use crate::proto::{Error, Result};

use super::connection::{Connection, Hooks, RefreshShardMap};
use super::info::InfoMap;
use super::pipeline::ReplyHandle;
use super::shard::ShardMap;

/// Cluster client with automatic routing and redirect handling.
///
/// # Example
///
/// ```no_run
/// use slotmux::ClusterClient;
/// use bytes::Bytes;
///
/// # async fn example() -> slotmux::Result<()> {
/// let client = ClusterClient::connect("127.0.0.1:7000,127.0.0.1:7001").await?;
/// client.set("key", Bytes::from("value")).await?;
/// let value = client.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClusterClient {
    connection: Connection,
    refresher: Arc<dyn RefreshShardMap>,
}

impl ClusterClient {
    /// Connects to the cluster via seed nodes.
    ///
    /// The address can be a single node or a comma-separated list; each
    /// entry is `host:port`, optionally `redis://`-prefixed. The full
    /// topology is discovered from the first seed that answers.
    pub async fn connect(addresses: &str) -> Result<Self> {
        Self::connect_with(addresses, None, Hooks::default()).await
    }

    /// Connects with an IO timeout and telemetry hooks.
    pub async fn connect_with(
        addresses: &str,
        timeout: Option<Duration>,
        hooks: Hooks,
    ) -> Result<Self> {
        let seeds = parse_addresses(addresses)?;
        let refresher: Arc<dyn RefreshShardMap> =
            Arc::new(SeedRefresher::new(seeds, timeout));

        let map = refresher.refresh().await?;
        let shard_map = Arc::new(RwLock::new(map));
        let connection = Connection::connect(InfoMap::default(), shard_map, timeout, hooks).await?;

        Ok(Self {
            connection,
            refresher,
        })
    }

    /// The underlying cluster connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Submits a raw request and returns its lazy reply handle.
    pub async fn request_pipelined(&self, request: Cmd) -> ReplyHandle {
        self.connection
            .request_pipelined(&self.refresher, request)
            .await
    }

    /// Submits a raw request and awaits its reply.
    async fn request(&self, request: Cmd) -> Result<Frame> {
        let handle = self.request_pipelined(request).await;
        reply_to_result(handle.wait().await?)
    }

    /// Pings slot 0's master.
    pub async fn ping(&self) -> Result<()> {
        match self.request(command::ping()).await? {
            Frame::SimpleString(s) if s == b"PONG" => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    /// Gets the value of a key, or `None` if it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match self.request(command::get(key.to_string())).await? {
            Frame::BulkString(data) => Ok(data),
            Frame::Null => Ok(None),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// Sets a key to a value.
    pub async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.request(command::set(key.to_string(), value)).await?;
        Ok(())
    }

    /// Deletes a key; returns how many keys were removed.
    pub async fn del(&self, key: &str) -> Result<i64> {
        match self.request(command::del(key.to_string())).await? {
            Frame::Integer(n) => Ok(n),
            other => Err(unexpected("DEL", &other)),
        }
    }

    /// Returns true if the key exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.request(command::exists(key.to_string())).await? {
            Frame::Integer(n) => Ok(n > 0),
            other => Err(unexpected("EXISTS", &other)),
        }
    }

    /// Number of nodes in the current shard map.
    pub async fn node_count(&self) -> usize {
        self.connection.nodes().await.len()
    }

    /// Returns true if every hash slot has an owner.
    pub async fn is_fully_covered(&self) -> bool {
        self.connection
            .shard_map_cell()
            .read()
            .await
            .is_fully_covered()
    }
}

/// Turns a leftover error reply into a server error.
///
/// Redirections were already consumed by the evaluators; whatever error
/// frame reaches this point (TRYAGAIN included) is the server's answer.
fn reply_to_result(frame: Frame) -> Result<Frame> {
    match frame {
        Frame::Error(payload) => Err(Error::Server {
            message: String::from_utf8_lossy(&payload).to_string(),
        }),
        other => Ok(other),
    }
}

fn unexpected(command: &str, frame: &Frame) -> Error {
    Error::Protocol {
        message: format!("unexpected response type for {}: {:?}", command, frame),
    }
}

/// Parses a comma-separated seed list into `(host, port)` pairs.
fn parse_addresses(addresses: &str) -> Result<Vec<(String, u16)>> {
    let mut parsed = Vec::new();
    for addr in addresses.split(',') {
        let addr = addr.trim();
        if addr.is_empty() {
            continue;
        }
        let addr = addr
            .strip_prefix("redis://")
            .or_else(|| addr.strip_prefix("rediss://"))
            .unwrap_or(addr);

        let (host, port) = addr.rsplit_once(':').ok_or_else(|| Error::InvalidArgument {
            message: format!("address missing port: {}", addr),
        })?;
        let port: u16 = port.parse().map_err(|_| Error::InvalidArgument {
            message: format!("invalid port in address: {}", addr),
        })?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        parsed.push((host.to_string(), port));
    }

    if parsed.is_empty() {
        return Err(Error::InvalidArgument {
            message: "no valid addresses provided".to_string(),
        });
    }
    Ok(parsed)
}

/// The production [`RefreshShardMap`]: asks each seed in turn for
/// `CLUSTER SLOTS` and parses the first answer.
pub struct SeedRefresher {
    seeds: Vec<(String, u16)>,
    timeout: Option<Duration>,
}

impl SeedRefresher {
    /// Creates a refresher over the given seed list.
    pub fn new(seeds: Vec<(String, u16)>, timeout: Option<Duration>) -> Self {
        Self { seeds, timeout }
    }

    async fn fetch_from(&self, host: &str, port: u16) -> Result<ShardMap> {
        let stream = TcpStream::connect((host, port)).await?;
        let mut conn = NodeStream::new(stream).with_timeouts(self.timeout, self.timeout);
        conn.write_frame(&command::cluster_slots().to_frame())
            .await?;
        let reply = conn.read_frame().await?;
        ShardMap::from_cluster_slots(reply)
    }
}

#[async_trait]
impl RefreshShardMap for SeedRefresher {
    async fn refresh(&self) -> Result<ShardMap> {
        for (host, port) in &self.seeds {
            match self.fetch_from(host, *port).await {
                Ok(map) => return Ok(map),
                Err(e) => {
                    warn!(seed = %format!("{}:{}", host, port), error = %e,
                        "seed did not yield a shard map");
                }
            }
        }
        Err(Error::Protocol {
            message: "failed to refresh shard map from any seed node".to_string(),
        })
    }
}
