//! The decoded command vocabulary understood by every [`Store`](crate::Store).
//!
//! Commands and replies are plain Rust values. Backends translate them to and from their wire
//! format, so no raw bytes ever reach the workload.

use std::fmt;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};

/// A single store command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// `PING`, replies [`Reply::Text`].
    Ping,
    /// `GET key`, replies [`Reply::Text`] or [`Reply::Nil`].
    Get { key: String },
    /// `SET key value` or `SETEX key ttl value`, replies [`Reply::Ok`].
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    /// `DEL key [key ...]`, replies the number of removed keys.
    Del { keys: Vec<String> },
    /// `EXPIRE key seconds`, replies `1` if the key exists.
    Expire { key: String, ttl: Duration },
    /// `INCR key`, replies the new value.
    Incr { key: String },
    /// `HSET key field value [field value ...]`, replies the number of new fields.
    HashSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// `HINCRBY key field delta`, replies the new value.
    HashIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    /// `SADD key member`, replies the number of added members.
    SetAdd { key: String, member: String },
    /// `SREM key member`, replies the number of removed members.
    SetRemove { key: String, member: String },
    /// `SCARD key`.
    SetCard { key: String },
    /// `ZADD key score member`, replies the number of added members.
    SortedSetAdd {
        key: String,
        member: String,
        score: f64,
    },
    /// `ZINCRBY key delta member`, replies the new score as [`Reply::Float`].
    SortedSetIncrBy {
        key: String,
        member: String,
        delta: f64,
    },
    /// `ZCARD key`.
    SortedSetCard { key: String },
    /// `ZREVRANGE key start stop [WITHSCORES]`.
    ///
    /// Replies [`Reply::Scored`] with scores, [`Reply::List`] without.
    SortedSetRevRange {
        key: String,
        start: isize,
        stop: isize,
        with_scores: bool,
    },
    /// `LPUSH key value`, replies the new length.
    ListPush { key: String, value: String },
    /// `LTRIM key start stop`, replies [`Reply::Ok`].
    ListTrim { key: String, start: isize, stop: isize },
    /// `LRANGE key start stop`, replies [`Reply::List`].
    ListRange { key: String, start: isize, stop: isize },
    /// `DBSIZE`.
    DbSize,
}

impl Command {
    /// The command verb, used for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Get { .. } => "GET",
            Self::Set { ttl: None, .. } => "SET",
            Self::Set { ttl: Some(_), .. } => "SETEX",
            Self::Del { .. } => "DEL",
            Self::Expire { .. } => "EXPIRE",
            Self::Incr { .. } => "INCR",
            Self::HashSet { .. } => "HSET",
            Self::HashIncrBy { .. } => "HINCRBY",
            Self::SetAdd { .. } => "SADD",
            Self::SetRemove { .. } => "SREM",
            Self::SetCard { .. } => "SCARD",
            Self::SortedSetAdd { .. } => "ZADD",
            Self::SortedSetIncrBy { .. } => "ZINCRBY",
            Self::SortedSetCard { .. } => "ZCARD",
            Self::SortedSetRevRange { .. } => "ZREVRANGE",
            Self::ListPush { .. } => "LPUSH",
            Self::ListTrim { .. } => "LTRIM",
            Self::ListRange { .. } => "LRANGE",
            Self::DbSize => "DBSIZE",
        }
    }

    pub fn get(key: impl Into<String>) -> Self {
        Self::Get { key: key.into() }
    }

    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    pub fn set_ex(key: impl Into<String>, value: impl Into<String>, ttl: Duration) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            ttl: Some(ttl),
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self::Del {
            keys: vec![key.into()],
        }
    }

    pub fn expire(key: impl Into<String>, ttl: Duration) -> Self {
        Self::Expire {
            key: key.into(),
            ttl,
        }
    }

    pub fn hset<K, V>(key: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::HashSet {
            key: key.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A decoded reply.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Nil,
    Ok,
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
    Scored(Vec<(String, f64)>),
}

impl Reply {
    fn unexpected(&self, command: &'static str) -> StoreError {
        StoreError::UnexpectedReply {
            command,
            reply: self.to_string(),
        }
    }

    pub fn into_int(self, command: &'static str) -> StoreResult<i64> {
        match self {
            Self::Int(value) => Ok(value),
            Self::Text(ref text) => text.parse().map_err(|_| self.unexpected(command)),
            other => Err(other.unexpected(command)),
        }
    }

    pub fn into_float(self, command: &'static str) -> StoreResult<f64> {
        match self {
            Self::Float(value) => Ok(value),
            Self::Int(value) => Ok(value as f64),
            Self::Text(ref text) => text.parse().map_err(|_| self.unexpected(command)),
            other => Err(other.unexpected(command)),
        }
    }

    /// Returns the text of a bulk reply, or `None` for a missing key.
    pub fn into_text(self, command: &'static str) -> StoreResult<Option<String>> {
        match self {
            Self::Nil => Ok(None),
            Self::Text(text) => Ok(Some(text)),
            Self::Int(value) => Ok(Some(value.to_string())),
            other => Err(other.unexpected(command)),
        }
    }

    pub fn into_list(self, command: &'static str) -> StoreResult<Vec<String>> {
        match self {
            Self::Nil => Ok(Vec::new()),
            Self::List(items) => Ok(items),
            other => Err(other.unexpected(command)),
        }
    }

    pub fn into_scored(self, command: &'static str) -> StoreResult<Vec<(String, f64)>> {
        match self {
            Self::Nil => Ok(Vec::new()),
            Self::Scored(items) => Ok(items),
            other => Err(other.unexpected(command)),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "(nil)"),
            Self::Ok => write!(f, "OK"),
            Self::Int(value) => write!(f, "(integer) {value}"),
            Self::Float(value) => write!(f, "(double) {value}"),
            Self::Text(text) => write!(f, "{text:?}"),
            Self::List(items) => write!(f, "(list of {})", items.len()),
            Self::Scored(items) => write!(f, "(scored list of {})", items.len()),
        }
    }
}
