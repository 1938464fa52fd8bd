//! Per-node connections.

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::trace;

use crate::core::command::Cmd;
use crate::core::connection::Connection;
use crate::proto::frame::Frame;
use crate::proto::{Error, Result};

use super::shard::{Node, NodeId};

/// A single stream to one cluster node.
///
/// One instance exists per known node for the life of the cluster
/// connection; shard-map refreshes reuse it unless the node disappears.
/// The framed stream (and with it the receive remainder) sits behind a
/// mutex, making each batch single-writer: requests and replies of one
/// batch can never interleave with another's.
pub struct NodeConnection {
    id: NodeId,
    address: String,
    io: Mutex<Connection<TcpStream>>,
}

impl NodeConnection {
    /// Dials the node and wraps the stream.
    pub async fn connect(node: &Node, timeout: Option<Duration>) -> Result<Self> {
        let address = node.address();
        let dial = TcpStream::connect((node.host.as_str(), node.port));
        let stream = match timeout {
            Some(duration) => tokio::time::timeout(duration, dial).await.map_err(|_| {
                Error::Io {
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timeout"),
                }
            })??,
            None => dial.await?,
        };
        Ok(Self {
            id: node.id.clone(),
            address,
            io: Mutex::new(Connection::new(stream).with_timeouts(timeout, timeout)),
        })
    }

    /// The node's cluster-assigned id.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// The node's `host:port` address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends a batch of requests as one pipeline and collects the replies.
    ///
    /// All requests are rendered and pushed with a single flush, then
    /// exactly one reply per request is read back, in request order. The
    /// decoder remainder persists across calls, so framing survives
    /// replies that arrive split or coalesced.
    pub async fn request(&self, batch: &[Cmd]) -> Result<Vec<Frame>> {
        let mut io = self.io.lock().await;
        trace!(node = %self.id, len = batch.len(), "sending pipeline");

        let frames: Vec<Frame> = batch.iter().map(Cmd::to_frame).collect();
        io.write_batch(&frames).await?;

        let mut replies = Vec::with_capacity(batch.len());
        for _ in batch {
            replies.push(io.read_frame().await?);
        }
        Ok(replies)
    }
}

impl fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}
