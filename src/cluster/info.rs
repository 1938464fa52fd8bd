//! Command key-position metadata.
//!
//! Routing needs to know which argument positions of a request hold keys.
//! The table can be seeded from the built-in defaults or parsed from the
//! server's `COMMAND` reply; the positional scheme (first key, last key,
//! step) is the server's own.

use std::collections::HashMap;

use bytes::Bytes;

use crate::core::command::Cmd;
use crate::proto::frame::Frame;
use crate::proto::{Error, Result};

/// Key positions for one command.
///
/// `first_key`/`last_key` are 1-based argument indices; `last_key` may be
/// negative, counting from the end (-1 is the final argument). A
/// `first_key` of 0 means the command takes no keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    /// Position of the first key argument (0 = no keys).
    pub first_key: i64,
    /// Position of the last key argument; negative counts from the end.
    pub last_key: i64,
    /// Interval between key arguments (e.g. 2 for MSET's key/value pairs).
    pub step: i64,
}

impl CommandInfo {
    /// Creates a key-position spec.
    pub const fn new(first_key: i64, last_key: i64, step: i64) -> Self {
        Self {
            first_key,
            last_key,
            step,
        }
    }

    /// Spec for a command that takes no keys.
    pub const fn keyless() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Table mapping command names to their key positions.
#[derive(Debug, Clone)]
pub struct InfoMap {
    map: HashMap<String, CommandInfo>,
}

/// Commands covered by the built-in table, with their key positions.
const DEFAULT_COMMANDS: &[(&str, CommandInfo)] = &[
    ("APPEND", CommandInfo::new(1, 1, 1)),
    ("DECR", CommandInfo::new(1, 1, 1)),
    ("DECRBY", CommandInfo::new(1, 1, 1)),
    ("DEL", CommandInfo::new(1, -1, 1)),
    ("EXISTS", CommandInfo::new(1, -1, 1)),
    ("EXPIRE", CommandInfo::new(1, 1, 1)),
    ("GET", CommandInfo::new(1, 1, 1)),
    ("GETSET", CommandInfo::new(1, 1, 1)),
    ("HDEL", CommandInfo::new(1, 1, 1)),
    ("HGET", CommandInfo::new(1, 1, 1)),
    ("HGETALL", CommandInfo::new(1, 1, 1)),
    ("HSET", CommandInfo::new(1, 1, 1)),
    ("INCR", CommandInfo::new(1, 1, 1)),
    ("INCRBY", CommandInfo::new(1, 1, 1)),
    ("LLEN", CommandInfo::new(1, 1, 1)),
    ("LPOP", CommandInfo::new(1, 1, 1)),
    ("LPUSH", CommandInfo::new(1, 1, 1)),
    ("LRANGE", CommandInfo::new(1, 1, 1)),
    ("MGET", CommandInfo::new(1, -1, 1)),
    ("MSET", CommandInfo::new(1, -1, 2)),
    ("PERSIST", CommandInfo::new(1, 1, 1)),
    ("PTTL", CommandInfo::new(1, 1, 1)),
    ("RPOP", CommandInfo::new(1, 1, 1)),
    ("RPUSH", CommandInfo::new(1, 1, 1)),
    ("SADD", CommandInfo::new(1, 1, 1)),
    ("SCARD", CommandInfo::new(1, 1, 1)),
    ("SET", CommandInfo::new(1, 1, 1)),
    ("SETEX", CommandInfo::new(1, 1, 1)),
    ("SETNX", CommandInfo::new(1, 1, 1)),
    ("SISMEMBER", CommandInfo::new(1, 1, 1)),
    ("SMEMBERS", CommandInfo::new(1, 1, 1)),
    ("SREM", CommandInfo::new(1, 1, 1)),
    ("STRLEN", CommandInfo::new(1, 1, 1)),
    ("TTL", CommandInfo::new(1, 1, 1)),
    ("TYPE", CommandInfo::new(1, 1, 1)),
    ("WATCH", CommandInfo::new(1, -1, 1)),
    ("ZADD", CommandInfo::new(1, 1, 1)),
    ("ZCARD", CommandInfo::new(1, 1, 1)),
    ("ZRANGE", CommandInfo::new(1, 1, 1)),
    ("ZREM", CommandInfo::new(1, 1, 1)),
    ("ZSCORE", CommandInfo::new(1, 1, 1)),
    // Key-less commands still need entries: an unknown command is a
    // routing error, while "known, no keys" routes to slot 0.
    ("ASKING", CommandInfo::keyless()),
    ("CLUSTER", CommandInfo::keyless()),
    ("COMMAND", CommandInfo::keyless()),
    ("DISCARD", CommandInfo::keyless()),
    ("ECHO", CommandInfo::keyless()),
    ("EXEC", CommandInfo::keyless()),
    ("FLUSHALL", CommandInfo::keyless()),
    ("FLUSHDB", CommandInfo::keyless()),
    ("MULTI", CommandInfo::keyless()),
    ("PING", CommandInfo::keyless()),
    ("QUIT", CommandInfo::keyless()),
    ("UNWATCH", CommandInfo::keyless()),
    ("EVAL", CommandInfo::new(0, 0, 0)),
    ("EVALSHA", CommandInfo::new(0, 0, 0)),
];

impl InfoMap {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Parses the table from a server `COMMAND` reply.
    ///
    /// Each entry is `[name, arity, flags, first, last, step, ...]`.
    /// Malformed entries are skipped.
    pub fn from_command_reply(frame: Frame) -> Result<Self> {
        let entries = match frame {
            Frame::Array(arr) => arr,
            _ => {
                return Err(Error::Protocol {
                    message: "COMMAND response must be an array".to_string(),
                })
            }
        };

        let mut map = HashMap::new();
        for entry in entries {
            let fields = match entry {
                Frame::Array(arr) => arr,
                _ => continue,
            };
            if fields.len() < 6 {
                continue;
            }
            let name = match &fields[0] {
                Frame::BulkString(Some(data)) => {
                    String::from_utf8_lossy(data).to_ascii_uppercase()
                }
                Frame::SimpleString(data) => String::from_utf8_lossy(data).to_ascii_uppercase(),
                _ => continue,
            };
            let (first, last, step) = match (&fields[3], &fields[4], &fields[5]) {
                (Frame::Integer(f), Frame::Integer(l), Frame::Integer(s)) => (*f, *l, *s),
                _ => continue,
            };
            map.insert(name, CommandInfo::new(first, last, step));
        }

        Ok(Self { map })
    }

    /// Inserts or replaces the entry for `name`.
    pub fn insert(&mut self, name: impl Into<String>, info: CommandInfo) {
        self.map.insert(name.into().to_ascii_uppercase(), info);
    }

    /// Extracts the key arguments of a raw request.
    ///
    /// Returns `None` if the command name is unknown; a known command with
    /// no keys yields an empty vector. EVAL and EVALSHA carry their key
    /// count in the argument after the script, so they bypass the table's
    /// positional scheme.
    pub fn keys_for_request(&self, request: &Cmd) -> Option<Vec<Bytes>> {
        let args = request.args();
        let name = args.first()?;
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();

        if name == "EVAL" || name == "EVALSHA" {
            return Some(eval_keys(args));
        }

        let info = self.map.get(&name)?;
        if info.first_key <= 0 || info.step <= 0 {
            return Some(Vec::new());
        }

        let last = if info.last_key < 0 {
            args.len() as i64 + info.last_key
        } else {
            info.last_key
        };

        let mut keys = Vec::new();
        let mut pos = info.first_key;
        while pos <= last {
            if let Some(key) = args.get(pos as usize) {
                keys.push(key.clone());
            }
            pos += info.step;
        }
        Some(keys)
    }
}

impl Default for InfoMap {
    /// The built-in table covering the common command set.
    fn default() -> Self {
        let mut map = HashMap::with_capacity(DEFAULT_COMMANDS.len());
        for (name, info) in DEFAULT_COMMANDS {
            map.insert((*name).to_string(), *info);
        }
        Self { map }
    }
}

/// EVAL-style key extraction: `EVAL script numkeys key [key ...]`.
fn eval_keys(args: &[Bytes]) -> Vec<Bytes> {
    let numkeys = args
        .get(2)
        .and_then(|b| std::str::from_utf8(b).ok())
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(0);
    args.iter().skip(3).take(numkeys).cloned().collect()
}

#[cfg(test)]
mod tests {
    use crate::core::command;

    use super::*;

    #[test]
    fn test_single_key_command() {
        let infos = InfoMap::default();
        let keys = infos.keys_for_request(&command::get("foo")).unwrap();
        assert_eq!(keys, vec![Bytes::from("foo")]);
    }

    #[test]
    fn test_multi_key_command() {
        let infos = InfoMap::default();
        let cmd = Cmd::new("DEL").arg("a").arg("b").arg("c");
        let keys = infos.keys_for_request(&cmd).unwrap();
        assert_eq!(
            keys,
            vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]
        );
    }

    #[test]
    fn test_stepped_keys() {
        let infos = InfoMap::default();
        let cmd = Cmd::new("MSET").arg("k1").arg("v1").arg("k2").arg("v2");
        let keys = infos.keys_for_request(&cmd).unwrap();
        assert_eq!(keys, vec![Bytes::from("k1"), Bytes::from("k2")]);
    }

    #[test]
    fn test_keyless_command() {
        let infos = InfoMap::default();
        let keys = infos.keys_for_request(&command::ping()).unwrap();
        assert!(keys.is_empty());
        let keys = infos.keys_for_request(&command::multi()).unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_unknown_command() {
        let infos = InfoMap::default();
        let cmd = Cmd::new("OBJECT").arg("ENCODING").arg("foo");
        assert!(infos.keys_for_request(&cmd).is_none());
    }

    #[test]
    fn test_eval_keys() {
        let infos = InfoMap::default();
        let cmd = Cmd::new("EVAL")
            .arg("return 1")
            .arg("2")
            .arg("k1")
            .arg("k2")
            .arg("extra-arg");
        let keys = infos.keys_for_request(&cmd).unwrap();
        assert_eq!(keys, vec![Bytes::from("k1"), Bytes::from("k2")]);
    }

    #[test]
    fn test_eval_zero_keys() {
        let infos = InfoMap::default();
        let cmd = Cmd::new("EVAL").arg("return 1").arg("0");
        let keys = infos.keys_for_request(&cmd).unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let infos = InfoMap::default();
        let cmd = Cmd::new("get").arg("foo");
        let keys = infos.keys_for_request(&cmd).unwrap();
        assert_eq!(keys, vec![Bytes::from("foo")]);
    }

    #[test]
    fn test_from_command_reply() {
        let reply = Frame::Array(vec![
            Frame::Array(vec![
                Frame::BulkString(Some("getrange".into())),
                Frame::Integer(4),
                Frame::Array(vec![]),
                Frame::Integer(1),
                Frame::Integer(1),
                Frame::Integer(1),
            ]),
            // Too short, skipped.
            Frame::Array(vec![Frame::BulkString(Some("junk".into()))]),
        ]);
        let infos = InfoMap::from_command_reply(reply).unwrap();
        let cmd = Cmd::new("GETRANGE").arg("foo").arg("0").arg("3");
        let keys = infos.keys_for_request(&cmd).unwrap();
        assert_eq!(keys, vec![Bytes::from("foo")]);
        assert!(infos.keys_for_request(&Cmd::new("JUNK")).is_none());
    }
}
