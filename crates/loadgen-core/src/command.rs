//! Operation kinds, wire commands and replies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An operation a workload can issue against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum OpKind {
    Set,
    Get,
    Del,
    Incr,
    Decr,
    IncrBy,
    DecrBy,
    Append,
    Strlen,
    Exists,
    Expire,
    Ttl,
    Type,
    LPush,
    RPush,
    LPop,
    RPop,
    LRange,
    LLen,
    LTrim,
    SAdd,
    SRem,
    SMembers,
    SCard,
    HSet,
    HGet,
    HDel,
    HGetAll,
    HLen,
    ZAdd,
    ZRem,
    ZRange,
    ZCard,
    ZScore,
    Publish,
    /// Starts the background listener of a pub/sub workload.
    Subscribe,
}

impl OpKind {
    pub const ALL: [OpKind; 36] = [
        OpKind::Set,
        OpKind::Get,
        OpKind::Del,
        OpKind::Incr,
        OpKind::Decr,
        OpKind::IncrBy,
        OpKind::DecrBy,
        OpKind::Append,
        OpKind::Strlen,
        OpKind::Exists,
        OpKind::Expire,
        OpKind::Ttl,
        OpKind::Type,
        OpKind::LPush,
        OpKind::RPush,
        OpKind::LPop,
        OpKind::RPop,
        OpKind::LRange,
        OpKind::LLen,
        OpKind::LTrim,
        OpKind::SAdd,
        OpKind::SRem,
        OpKind::SMembers,
        OpKind::SCard,
        OpKind::HSet,
        OpKind::HGet,
        OpKind::HDel,
        OpKind::HGetAll,
        OpKind::HLen,
        OpKind::ZAdd,
        OpKind::ZRem,
        OpKind::ZRange,
        OpKind::ZCard,
        OpKind::ZScore,
        OpKind::Publish,
        OpKind::Subscribe,
    ];

    /// Command name as sent on the wire and used as the metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Set => "SET",
            OpKind::Get => "GET",
            OpKind::Del => "DEL",
            OpKind::Incr => "INCR",
            OpKind::Decr => "DECR",
            OpKind::IncrBy => "INCRBY",
            OpKind::DecrBy => "DECRBY",
            OpKind::Append => "APPEND",
            OpKind::Strlen => "STRLEN",
            OpKind::Exists => "EXISTS",
            OpKind::Expire => "EXPIRE",
            OpKind::Ttl => "TTL",
            OpKind::Type => "TYPE",
            OpKind::LPush => "LPUSH",
            OpKind::RPush => "RPUSH",
            OpKind::LPop => "LPOP",
            OpKind::RPop => "RPOP",
            OpKind::LRange => "LRANGE",
            OpKind::LLen => "LLEN",
            OpKind::LTrim => "LTRIM",
            OpKind::SAdd => "SADD",
            OpKind::SRem => "SREM",
            OpKind::SMembers => "SMEMBERS",
            OpKind::SCard => "SCARD",
            OpKind::HSet => "HSET",
            OpKind::HGet => "HGET",
            OpKind::HDel => "HDEL",
            OpKind::HGetAll => "HGETALL",
            OpKind::HLen => "HLEN",
            OpKind::ZAdd => "ZADD",
            OpKind::ZRem => "ZREM",
            OpKind::ZRange => "ZRANGE",
            OpKind::ZCard => "ZCARD",
            OpKind::ZScore => "ZSCORE",
            OpKind::Publish => "PUBLISH",
            OpKind::Subscribe => "SUBSCRIBE",
        }
    }

    /// Whether the operation belongs to the pub/sub family.
    pub fn is_pubsub(&self) -> bool {
        matches!(self, OpKind::Publish | OpKind::Subscribe)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "DELETE" {
            return Ok(OpKind::Del);
        }
        OpKind::ALL
            .iter()
            .copied()
            .find(|op| op.name() == upper)
            .ok_or_else(|| format!("Unknown operation: {s}"))
    }
}

impl TryFrom<String> for OpKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OpKind> for &'static str {
    fn from(op: OpKind) -> Self {
        op.name()
    }
}

/// A command ready to be written to the wire: the command name followed by
/// its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    pub fn arg_int(self, value: i64) -> Self {
        self.arg(value.to_string())
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).to_ascii_uppercase()
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }
}

/// A successful reply from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Status(String),
    Int(i64),
    Bulk(Vec<u8>),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn is_status(&self, expected: &str) -> bool {
        matches!(self, Reply::Status(s) if s.eq_ignore_ascii_case(expected))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(b) => Some(b),
            Reply::Status(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}
