//! Cluster-aware pipelining.
//!
//! The subsystem that accepts a stream of requests, routes each to the
//! node owning its hash slot, batches per-node pipelines, reassembles
//! replies in submission order, and recovers from MOVED/ASK redirection.
//!
//! - **Slot routing**: keys hash to one of 16384 slots via CRC16, honoring
//!   `{...}` hash tags; each slot belongs to exactly one shard's master.
//! - **Implicit batching**: [`Connection::request_pipelined`] returns a
//!   lazy [`ReplyHandle`]; nothing is sent until a handle is awaited, so
//!   submitting N requests first sends them as one batch, split per node.
//! - **Transactions**: MULTI..EXEC batches are validated to a single slot
//!   and dispatched to its master as one pipeline.
//! - **Redirect handling**: MOVED refreshes the shard map (once per batch)
//!   and re-issues on the new owner; ASK performs a one-shot ASKING retry.
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> slotmux::Result<()> {
//! use slotmux::ClusterClient;
//! use bytes::Bytes;
//!
//! let client = ClusterClient::connect("127.0.0.1:7000,127.0.0.1:7001").await?;
//! client.set("key", Bytes::from("value")).await?;
//! let value = client.get("key").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
mod evaluate;
mod info;
mod node;
mod pipeline;
mod redirect;
mod route;
mod shard;
mod slot;

pub use client::{ClusterClient, SeedRefresher};
pub use connection::{Connection, Hooks, RefreshShardMap};
pub use info::{CommandInfo, InfoMap};
pub use node::NodeConnection;
pub use pipeline::ReplyHandle;
pub use shard::{Node, NodeId, NodeRole, Shard, ShardMap};
pub use slot::{key_slot, SLOT_COUNT};
