//! # Slotmux
//!
//! Cluster-aware pipelining client for sharded in-memory key-value stores.
//! Requests are routed by hash slot, lazily batched into per-node
//! pipelines, dispatched concurrently, and reassembled in submission
//! order, with transparent MOVED/ASK redirect handling and MULTI/EXEC
//! transactions on top.
//!
//! ## Example
//!
//! ```no_run
//! use slotmux::ClusterClient;
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClusterClient::connect("127.0.0.1:7000,127.0.0.1:7001").await?;
//!     client.set("key", Bytes::from("value")).await?;
//!     let _ = client.get("key").await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod core;
pub mod proto;

pub use crate::cluster::{
    key_slot, ClusterClient, Connection, Hooks, InfoMap, Node, NodeRole, RefreshShardMap,
    ReplyHandle, SeedRefresher, Shard, ShardMap,
};
pub use crate::core::command::Cmd;
pub use crate::proto::{Error, Frame, Result};
