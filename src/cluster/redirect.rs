//! Redirection parsing and retry.
//!
//! The cluster signals shard movement through error replies:
//! - `MOVED <slot> <host>:<port>`: the slot relocated permanently; the
//!   shard map is stale and the batch belongs on the new owner.
//! - `ASK <slot> <host>:<port>`: the key is mid-migration; exactly one
//!   `ASKING`-prefixed retry goes to the named node, nothing is cached.

use tracing::warn;

use crate::core::command::{self, Cmd};
use crate::proto::frame::Frame;
use crate::proto::{Error, Result};

use super::connection::{ConnectionInner, RefreshShardMap};
use super::route;

/// A parsed redirection reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Redirect {
    /// The slot moved permanently.
    Moved {
        slot: u16,
        host: String,
        port: u16,
    },
    /// The key is temporarily served elsewhere during a reshard. The slot
    /// is validated during parsing but only the target matters: the batch
    /// goes where the server pointed, not where the map says.
    Ask { host: String, port: u16 },
}

/// Parses a redirection out of an error reply, if it is one.
pub(crate) fn parse_redirect(reply: &Frame) -> Option<Redirect> {
    let payload = reply.as_error()?;
    let msg = String::from_utf8_lossy(payload);
    let msg = msg.trim();

    if let Some(args) = msg.strip_prefix("MOVED ") {
        let (slot, host, port) = parse_target(args)?;
        return Some(Redirect::Moved { slot, host, port });
    }
    if let Some(args) = msg.strip_prefix("ASK ") {
        let (_slot, host, port) = parse_target(args)?;
        return Some(Redirect::Ask { host, port });
    }
    None
}

/// Returns true if the reply is a MOVED redirection.
pub(crate) fn is_moved(reply: &Frame) -> bool {
    matches!(parse_redirect(reply), Some(Redirect::Moved { .. }))
}

/// Extracts the target of an ASK redirection.
pub(crate) fn parse_ask(reply: &Frame) -> Option<(String, u16)> {
    match parse_redirect(reply) {
        Some(Redirect::Ask { host, port, .. }) => Some((host, port)),
        _ => None,
    }
}

/// Parses redirect arguments: `<slot> <host>:<port>`.
fn parse_target(args: &str) -> Option<(u16, String, u16)> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    if parts.len() != 2 {
        return None;
    }
    let slot: u16 = parts[0].parse().ok()?;
    let (host, port) = parts[1].rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    // IPv6 targets arrive bracketed; shard maps store them bare.
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Some((slot, host.to_string(), port))
}

/// Re-dispatches a batch whose last reply was a redirection.
///
/// For MOVED the shard map has already been refreshed by the evaluator;
/// the batch's slot is re-derived and the whole batch re-issued on the
/// current master. For ASK the batch is sent once to the named node behind
/// an `ASKING` prefix whose acknowledgement is dropped; if the node is not
/// in the shard map, one refresh is attempted before giving up. Any other
/// last reply passes the batch through untouched.
pub(crate) async fn retry_batch(
    inner: &ConnectionInner,
    refresher: &dyn RefreshShardMap,
    requests: &[Cmd],
    replies: Vec<Frame>,
) -> Result<Vec<Frame>> {
    let last = match replies.last() {
        Some(reply) => reply,
        None => return Ok(replies),
    };

    if let Some(Redirect::Moved { slot, host, port }) = parse_redirect(last) {
        let target = format!("{}:{}", host, port);
        warn!(slot, %target, "retrying batch after MOVED");
        inner.hooks().redirect("MOVED", &target);

        // The evaluator refreshed the map before calling here; route the
        // whole batch against the current owner of its slot.
        let slot = route::slot_for_requests(inner.infos(), requests)?;
        let shard_map = inner.shard_map_snapshot().await;
        let conns = inner.node_connections().await;
        let conn = route::master_connection_for_slot(&shard_map, &conns, slot)?;
        return conn.request(requests).await;
    }

    if let Some((host, port)) = parse_ask(last) {
        let target = format!("{}:{}", host, port);
        warn!(%target, "retrying batch after ASK");
        inner.hooks().redirect("ASK", &target);

        let mut refreshed = false;
        loop {
            let node = inner.shard_map_snapshot().await.node_by_host_port(&host, port);
            match node {
                Some(node) => {
                    let conn = inner.connection_for(&node.id).await.ok_or_else(|| {
                        Error::MissingNode {
                            target: node.address(),
                        }
                    })?;
                    let mut batch = Vec::with_capacity(requests.len() + 1);
                    batch.push(command::asking());
                    batch.extend_from_slice(requests);
                    let mut replies = conn.request(&batch).await?;
                    // First reply acknowledges ASKING; the caller never sees it.
                    replies.remove(0);
                    return Ok(replies);
                }
                None if !refreshed => {
                    inner.refresh_shard_map(refresher).await?;
                    refreshed = true;
                }
                None => return Err(Error::MissingNode { target }),
            }
        }
    }

    Ok(replies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(payload: &str) -> Frame {
        Frame::Error(payload.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_moved() {
        let redirect = parse_redirect(&err("MOVED 3999 127.0.0.1:7000")).unwrap();
        assert_eq!(
            redirect,
            Redirect::Moved {
                slot: 3999,
                host: "127.0.0.1".to_string(),
                port: 7000,
            }
        );
        assert!(is_moved(&err("MOVED 3999 127.0.0.1:7000")));
    }

    #[test]
    fn test_parse_ask() {
        let target = parse_ask(&err("ASK 12182 10.0.0.3:6380")).unwrap();
        assert_eq!(target, ("10.0.0.3".to_string(), 6380));
        assert!(!is_moved(&err("ASK 12182 10.0.0.3:6380")));
    }

    #[test]
    fn test_parse_redirect_with_whitespace() {
        let redirect = parse_redirect(&err("  MOVED 100 localhost:7001  ")).unwrap();
        assert_eq!(
            redirect,
            Redirect::Moved {
                slot: 100,
                host: "localhost".to_string(),
                port: 7001,
            }
        );
    }

    #[test]
    fn test_parse_redirect_ipv6() {
        let redirect = parse_redirect(&err("ASK 1234 [::1]:7000")).unwrap();
        assert_eq!(
            redirect,
            Redirect::Ask {
                host: "::1".to_string(),
                port: 7000,
            }
        );
    }

    #[test]
    fn test_parse_redirect_rejects_malformed() {
        assert!(parse_redirect(&err("MOVED invalid 127.0.0.1:7000")).is_none());
        assert!(parse_redirect(&err("MOVED 3999")).is_none());
        assert!(parse_redirect(&err("ERR unknown command")).is_none());
        assert!(parse_redirect(&err("TRYAGAIN Multiple keys request during rehashing")).is_none());
        assert!(parse_redirect(&Frame::SimpleString(b"MOVED".to_vec())).is_none());
    }

    #[test]
    fn test_moved_prefix_must_be_a_whole_word() {
        // A server error that merely mentions MOVED is not a redirection.
        assert!(parse_redirect(&err("MOVEDX 1 a:1")).is_none());
    }
}
