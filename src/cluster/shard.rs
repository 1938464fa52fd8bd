//! Shard map data structures and the CLUSTER SLOTS parser.
//!
//! A [`ShardMap`] is an immutable snapshot assigning each of the 16384 hash
//! slots to a [`Shard`] (one master plus its replicas). Updates happen by
//! atomic replacement of the whole map, never in place.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::proto::frame::Frame;
use crate::proto::{Error, Result};

use super::slot::SLOT_COUNT;

/// Unique identifier for a node in the cluster.
///
/// Node ids are opaque byte strings assigned by the cluster (typically
/// 40-character hex). All node equality and ordering goes through the id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new NodeId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the node id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role a node plays within its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// The node serves writes for its shard's slots.
    Master,
    /// The node replicates a master; never routed to by this client.
    Replica,
}

/// One node of the cluster.
#[derive(Debug, Clone, Eq)]
pub struct Node {
    /// Opaque cluster-assigned identifier.
    pub id: NodeId,
    /// Role within the owning shard.
    pub role: NodeRole,
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Node {
    /// Returns the node's `host:port` address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Node identity is the cluster-assigned id; addresses can move.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One master and its replicas, owning some set of hash slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// The master serving the shard's slots.
    pub master: Node,
    /// Zero or more replicas of the master.
    pub replicas: Vec<Node>,
}

impl Shard {
    /// Creates a shard from a master and its replicas.
    pub fn new(master: Node, replicas: Vec<Node>) -> Self {
        Self { master, replicas }
    }

    /// All nodes of the shard, master first.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::once(&self.master).chain(self.replicas.iter())
    }
}

/// An immutable snapshot mapping every hash slot to its shard.
///
/// The table is dense: one entry per slot, with ranges sharing the same
/// `Arc<Shard>`. Slots a malformed topology leaves uncovered resolve to
/// `None` and surface as missing-node errors at routing time.
#[derive(Debug, Clone)]
pub struct ShardMap {
    slots: Vec<Option<Arc<Shard>>>,
}

impl ShardMap {
    /// Creates an empty map covering no slots.
    pub fn new() -> Self {
        Self {
            slots: vec![None; SLOT_COUNT as usize],
        }
    }

    /// Builds a map from inclusive slot ranges.
    ///
    /// Later ranges overwrite earlier ones on overlap, matching the
    /// server's last-writer-wins slot assignment.
    pub fn from_ranges(ranges: Vec<(u16, u16, Shard)>) -> Result<Self> {
        let mut map = Self::new();
        for (start, end, shard) in ranges {
            if start > end || end >= SLOT_COUNT {
                return Err(Error::InvalidArgument {
                    message: format!("invalid slot range {}-{}", start, end),
                });
            }
            let shard = Arc::new(shard);
            for slot in start..=end {
                map.slots[slot as usize] = Some(Arc::clone(&shard));
            }
        }
        Ok(map)
    }

    /// O(1) lookup of the shard owning `slot`.
    pub fn shard_for_slot(&self, slot: u16) -> Option<&Arc<Shard>> {
        self.slots.get(slot as usize).and_then(|s| s.as_ref())
    }

    /// Deduplicated list of every node across all shards, ordered by id.
    pub fn nodes(&self) -> Vec<Node> {
        let mut by_id: BTreeMap<NodeId, Node> = BTreeMap::new();
        for shard in self.slots.iter().flatten() {
            for node in shard.nodes() {
                by_id.entry(node.id.clone()).or_insert_with(|| node.clone());
            }
        }
        by_id.into_values().collect()
    }

    /// Deduplicated list of every master, ordered by id.
    pub fn masters(&self) -> Vec<Node> {
        let mut by_id: BTreeMap<NodeId, Node> = BTreeMap::new();
        for shard in self.slots.iter().flatten() {
            by_id
                .entry(shard.master.id.clone())
                .or_insert_with(|| shard.master.clone());
        }
        by_id.into_values().collect()
    }

    /// Linear scan for a node with the given address.
    ///
    /// Only used on ASK redirection, which names the target by address
    /// rather than id; rare enough that a scan is fine.
    pub fn node_by_host_port(&self, host: &str, port: u16) -> Option<Node> {
        for shard in self.slots.iter().flatten() {
            for node in shard.nodes() {
                if node.host == host && node.port == port {
                    return Some(node.clone());
                }
            }
        }
        None
    }

    /// Number of slots with an owning shard.
    pub fn covered_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns true if every slot resolves to a shard.
    pub fn is_fully_covered(&self) -> bool {
        self.covered_slots() == SLOT_COUNT as usize
    }

    /// Parses a shard map from a CLUSTER SLOTS reply.
    ///
    /// The reply is an array of ranges, each `[start, end, master,
    /// replica...]` with nodes as `[host, port, id?]`. Malformed entries
    /// are skipped rather than failing the whole map.
    pub fn from_cluster_slots(frame: Frame) -> Result<Self> {
        let ranges = match frame {
            Frame::Array(arr) => arr,
            _ => {
                return Err(Error::Protocol {
                    message: "CLUSTER SLOTS response must be an array".to_string(),
                })
            }
        };

        let mut parsed = Vec::new();
        for range_frame in ranges {
            let range_arr = match range_frame {
                Frame::Array(arr) => arr,
                _ => continue,
            };

            if range_arr.len() < 3 {
                continue;
            }

            let start = match &range_arr[0] {
                Frame::Integer(n) => *n as u16,
                _ => continue,
            };
            let end = match &range_arr[1] {
                Frame::Integer(n) => *n as u16,
                _ => continue,
            };

            let master = match Self::parse_node(&range_arr[2], NodeRole::Master) {
                Ok(node) => node,
                Err(_) => continue,
            };

            let mut replicas = Vec::new();
            for node_frame in range_arr.iter().skip(3) {
                if let Ok(replica) = Self::parse_node(node_frame, NodeRole::Replica) {
                    replicas.push(replica);
                }
            }

            parsed.push((start, end, Shard::new(master, replicas)));
        }

        Self::from_ranges(parsed)
    }

    /// Parses one `[host, port, id?]` node entry.
    fn parse_node(frame: &Frame, role: NodeRole) -> Result<Node> {
        let node_arr = match frame {
            Frame::Array(arr) => arr,
            _ => {
                return Err(Error::Protocol {
                    message: "node info must be an array".to_string(),
                })
            }
        };

        if node_arr.len() < 2 {
            return Err(Error::Protocol {
                message: "node info array must have at least 2 elements".to_string(),
            });
        }

        let host = match &node_arr[0] {
            Frame::BulkString(Some(data)) => String::from_utf8_lossy(data).to_string(),
            _ => {
                return Err(Error::Protocol {
                    message: "node host must be a bulk string".to_string(),
                })
            }
        };

        let port = match &node_arr[1] {
            Frame::Integer(n) => *n as u16,
            _ => {
                return Err(Error::Protocol {
                    message: "node port must be an integer".to_string(),
                })
            }
        };

        // Older servers omit the id; fall back to the address.
        let id = match node_arr.get(2) {
            Some(Frame::BulkString(Some(data))) => {
                NodeId::new(String::from_utf8_lossy(data).to_string())
            }
            _ => NodeId::new(format!("{}:{}", host, port)),
        };

        Ok(Node {
            id,
            role,
            host,
            port,
        })
    }
}

impl Default for ShardMap {
    fn default() -> Self {
        Self::new()
    }
}
