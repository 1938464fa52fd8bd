//! Request routing.
//!
//! Maps a raw request onto the node connections it must be sent to: one
//! master for keyed requests (or slot 0's master when key-less), every
//! master for the broadcast commands.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::core::command::Cmd;
use crate::proto::{Error, Result};

use super::info::InfoMap;
use super::node::NodeConnection;
use super::shard::{NodeId, ShardMap};
use super::slot::key_slot;

/// Commands that fan out to every master instead of routing by key.
const BROADCAST_COMMANDS: [&str; 4] = ["FLUSHALL", "FLUSHDB", "QUIT", "UNWATCH"];

/// Returns true if the request must be sent to every master.
pub(crate) fn is_broadcast(request: &Cmd) -> bool {
    BROADCAST_COMMANDS
        .iter()
        .any(|name| request.name_matches(name))
}

/// Collapses a key set to its single hash slot.
///
/// Key-less requests land on slot 0, which pins them to an arbitrary but
/// stable master.
pub(crate) fn slot_for_keys(keys: &[Bytes]) -> Result<u16> {
    let mut slot = None;
    for key in keys {
        let key_slot = key_slot(key);
        match slot {
            None => slot = Some(key_slot),
            Some(existing) if existing != key_slot => return Err(Error::CrossSlot),
            Some(_) => {}
        }
    }
    Ok(slot.unwrap_or(0))
}

/// Derives the target slot of one request via the command table.
pub(crate) fn slot_for_request(infos: &InfoMap, request: &Cmd) -> Result<u16> {
    let keys = infos
        .keys_for_request(request)
        .ok_or_else(|| unsupported(request))?;
    slot_for_keys(&keys)
}

/// Derives the single target slot of a whole batch (transaction routing).
pub(crate) fn slot_for_requests(infos: &InfoMap, requests: &[Cmd]) -> Result<u16> {
    let mut keys = Vec::new();
    for request in requests {
        let mut request_keys = infos
            .keys_for_request(request)
            .ok_or_else(|| unsupported(request))?;
        keys.append(&mut request_keys);
    }
    slot_for_keys(&keys)
}

/// Resolves the node connections a request must be sent to.
pub(crate) fn node_connections_for(
    shard_map: &ShardMap,
    conns: &HashMap<NodeId, Arc<NodeConnection>>,
    infos: &InfoMap,
    request: &Cmd,
) -> Result<Vec<Arc<NodeConnection>>> {
    if is_broadcast(request) {
        let masters = shard_map.masters();
        let mut targets = Vec::with_capacity(masters.len());
        for master in masters {
            let conn = conns.get(&master.id).ok_or_else(|| Error::MissingNode {
                target: master.address(),
            })?;
            targets.push(Arc::clone(conn));
        }
        return Ok(targets);
    }

    let slot = slot_for_request(infos, request)?;
    Ok(vec![master_connection_for_slot(shard_map, conns, slot)?])
}

/// Looks up the connection to the master currently owning `slot`.
pub(crate) fn master_connection_for_slot(
    shard_map: &ShardMap,
    conns: &HashMap<NodeId, Arc<NodeConnection>>,
    slot: u16,
) -> Result<Arc<NodeConnection>> {
    let shard = shard_map
        .shard_for_slot(slot)
        .ok_or_else(|| Error::MissingNode {
            target: format!("slot {}", slot),
        })?;
    let conn = conns
        .get(&shard.master.id)
        .ok_or_else(|| Error::MissingNode {
            target: shard.master.address(),
        })?;
    Ok(Arc::clone(conn))
}

fn unsupported(request: &Cmd) -> Error {
    let name = request
        .name()
        .map(|n| String::from_utf8_lossy(n).to_string())
        .unwrap_or_default();
    Error::UnsupportedCommand { name }
}
