use bytes::Bytes;

use crate::proto::frame::Frame;

/// A raw request ready to be sent to the cluster.
///
/// Commands are built using the builder pattern and rendered to frames for
/// transmission. The argument vector stays inspectable because routing reads
/// the command name and key positions back out of it.
///
/// # Example
///
/// ```
/// use slotmux::core::command::{get, Cmd};
///
/// let cmd = Cmd::new("SET").arg("key").arg("value");
/// let get_cmd = get("key");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    args: Vec<Bytes>,
}

impl Cmd {
    /// Creates a new command with the given name.
    #[inline]
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self {
            args: vec![name.into()],
        }
    }

    /// Appends an argument to the command.
    #[inline]
    pub fn arg<T: Into<Bytes>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Returns the argument vector, command name first.
    #[inline]
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Returns the command name (the first token), if any.
    #[inline]
    pub fn name(&self) -> Option<&[u8]> {
        self.args.first().map(|b| b.as_ref())
    }

    /// Returns true if the command name matches `name`, ignoring case.
    #[inline]
    pub fn name_matches(&self, name: &str) -> bool {
        self.name()
            .map(|n| n.eq_ignore_ascii_case(name.as_bytes()))
            .unwrap_or(false)
    }

    /// Renders the command to a protocol Array frame.
    #[inline]
    pub fn to_frame(&self) -> Frame {
        Frame::Array(
            self.args
                .iter()
                .map(|b| Frame::BulkString(Some(b.clone())))
                .collect(),
        )
    }
}

/// Creates a PING command.
#[inline]
pub fn ping() -> Cmd {
    Cmd::new("PING")
}

/// Creates an ECHO command.
#[inline]
pub fn echo(msg: impl Into<Bytes>) -> Cmd {
    Cmd::new("ECHO").arg(msg)
}

/// Creates a GET command.
#[inline]
pub fn get(key: impl Into<Bytes>) -> Cmd {
    Cmd::new("GET").arg(key)
}

/// Creates a SET command.
#[inline]
pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Cmd {
    Cmd::new("SET").arg(key).arg(value)
}

/// Creates a DEL command.
#[inline]
pub fn del(key: impl Into<Bytes>) -> Cmd {
    Cmd::new("DEL").arg(key)
}

/// Creates an EXISTS command.
#[inline]
pub fn exists(key: impl Into<Bytes>) -> Cmd {
    Cmd::new("EXISTS").arg(key)
}

/// Creates an INCR command.
#[inline]
pub fn incr(key: impl Into<Bytes>) -> Cmd {
    Cmd::new("INCR").arg(key)
}

/// Creates an MGET command.
#[inline]
pub fn mget(keys: Vec<Bytes>) -> Cmd {
    let mut cmd = Cmd::new("MGET");
    for key in keys {
        cmd = cmd.arg(key);
    }
    cmd
}

/// Creates a MULTI command, opening a transaction.
#[inline]
pub fn multi() -> Cmd {
    Cmd::new("MULTI")
}

/// Creates an EXEC command, closing a transaction.
#[inline]
pub fn exec() -> Cmd {
    Cmd::new("EXEC")
}

/// Creates a DISCARD command.
#[inline]
pub fn discard() -> Cmd {
    Cmd::new("DISCARD")
}

/// Creates a WATCH command for the given key.
#[inline]
pub fn watch(key: impl Into<Bytes>) -> Cmd {
    Cmd::new("WATCH").arg(key)
}

/// Creates an UNWATCH command (broadcast to every master).
#[inline]
pub fn unwatch() -> Cmd {
    Cmd::new("UNWATCH")
}

/// Creates a FLUSHALL command (broadcast to every master).
#[inline]
pub fn flushall() -> Cmd {
    Cmd::new("FLUSHALL")
}

/// Creates a FLUSHDB command (broadcast to every master).
#[inline]
pub fn flushdb() -> Cmd {
    Cmd::new("FLUSHDB")
}

/// Creates an ASKING command.
///
/// Sent before retrying a request that received an ASK redirect, telling the
/// target node to accept the request even though the slot is still migrating.
/// ASKING is a one-time flag: it affects only the immediately following
/// request.
#[inline]
pub fn asking() -> Cmd {
    Cmd::new("ASKING")
}

/// Creates a CLUSTER SLOTS command, used for topology discovery.
#[inline]
pub fn cluster_slots() -> Cmd {
    Cmd::new("CLUSTER").arg("SLOTS")
}

/// Creates a COMMAND command, used to fetch the server's key-position table.
#[inline]
pub fn command_table() -> Cmd {
    Cmd::new("COMMAND")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmd_into_frame() {
        let cmd = Cmd::new("SET").arg("key").arg("value");
        let frame = cmd.to_frame();
        if let Frame::Array(arr) = frame {
            assert_eq!(arr.len(), 3);
            assert_eq!(arr[0], Frame::BulkString(Some(Bytes::from("SET"))));
            assert_eq!(arr[1], Frame::BulkString(Some(Bytes::from("key"))));
            assert_eq!(arr[2], Frame::BulkString(Some(Bytes::from("value"))));
        } else {
            panic!("expected Array frame");
        }
    }

    #[test]
    fn test_cmd_name_matches_is_case_insensitive() {
        assert!(Cmd::new("multi").name_matches("MULTI"));
        assert!(multi().name_matches("MULTI"));
        assert!(!exec().name_matches("MULTI"));
    }

    #[test]
    fn test_cluster_slots_cmd() {
        let frame = cluster_slots().to_frame();
        if let Frame::Array(arr) = frame {
            assert_eq!(arr.len(), 2);
            assert_eq!(arr[0], Frame::BulkString(Some(Bytes::from("CLUSTER"))));
            assert_eq!(arr[1], Frame::BulkString(Some(Bytes::from("SLOTS"))));
        } else {
            panic!("expected Array frame");
        }
    }

    #[test]
    fn test_asking_cmd() {
        let frame = asking().to_frame();
        if let Frame::Array(arr) = frame {
            assert_eq!(arr.len(), 1);
            assert_eq!(arr[0], Frame::BulkString(Some(Bytes::from("ASKING"))));
        } else {
            panic!("expected Array frame");
        }
    }
}
