//! Redis backend.
//!
//! Every pooled connection is a [`ConnectionManager`], which transparently reconnects after a
//! dropped socket. Batches are sent as `MULTI`/`EXEC` transactions.

use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{
    Client, Cmd, ConnectionAddr, ConnectionInfo, FromRedisValue, RedisConnectionInfo, RedisError,
    RedisResult, Value,
};

use super::common::Store;
use crate::command::{Command, Reply};
use crate::error::{StoreError, StoreResult};
use crate::pool::Pool;

/// Connection parameters for [`RedisStore::connect`].
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database index.
    pub database: i64,
    /// Number of connections to open and keep.
    pub pool_size: usize,
    /// Maximum time to establish each connection.
    pub connect_timeout: Duration,
    /// Maximum time to wait for a free pooled connection.
    pub acquire_timeout: Duration,
    /// Maximum time for a single command or batch round-trip.
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            password: None,
            database: 0,
            pool_size: 50,
            connect_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(5),
        }
    }
}

/// A [`Store`] backed by a pool of Redis connections.
#[derive(Debug)]
pub struct RedisStore {
    addr: String,
    pool: Pool<ConnectionManager>,
    command_timeout: Duration,
}

impl RedisStore {
    /// Opens the connection pool and verifies the store answers `PING`.
    ///
    /// Fails with [`StoreError::Connection`] if the store is unreachable or authentication fails.
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.database,
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info)
            .map_err(|e| StoreError::connection("invalid connection parameters", e))?;

        let pool_size = config.pool_size.max(1);
        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let manager =
                tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client.clone()))
                    .await
                    .map_err(|e| StoreError::connection(format!("timed out connecting to {addr}"), e))?
                    .map_err(|e| StoreError::connection(format!("failed to connect to {addr}"), e))?;
            connections.push(manager);
        }

        let store = Self {
            addr,
            pool: Pool::new(connections, config.acquire_timeout),
            command_timeout: config.command_timeout,
        };

        match store.execute(Command::Ping).await {
            Ok(_) => {}
            Err(StoreError::Command { message, .. }) => {
                return Err(StoreError::Connection {
                    context: format!("{} rejected PING", store.addr),
                    cause: message.into(),
                });
            }
            Err(err) => return Err(err),
        }

        tracing::info!(addr = %store.addr, pool_size, "Connected to store");
        Ok(store)
    }

    async fn bounded<T>(
        &self,
        command: &'static str,
        future: impl Future<Output = RedisResult<T>>,
    ) -> StoreResult<T> {
        tokio::time::timeout(self.command_timeout, future)
            .await
            .map_err(|_| StoreError::Timeout {
                timeout: self.command_timeout,
            })?
            .map_err(|e| self.map_error(command, e))
    }

    fn map_error(&self, command: &'static str, error: RedisError) -> StoreError {
        if error.is_timeout() {
            StoreError::Timeout {
                timeout: self.command_timeout,
            }
        } else if error.is_io_error()
            || error.is_connection_refusal()
            || error.is_connection_dropped()
        {
            StoreError::connection(format!("{command} to {} failed", self.addr), error)
        } else {
            StoreError::Command {
                command,
                message: error.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn execute(&self, command: Command) -> StoreResult<Reply> {
        let name = command.name();
        let mut conn = self.pool.acquire().await?;
        let cmd = to_cmd(&command);
        let value: Value = self.bounded(name, cmd.query_async(&mut *conn)).await?;
        decode(&command, value)
    }

    async fn pipeline(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let total = commands.len();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            pipe.add_command(to_cmd(command));
        }

        let mut conn = self.pool.acquire().await?;
        let values: Vec<Value> = match self.bounded("EXEC", pipe.query_async(&mut *conn)).await {
            Ok(values) => values,
            Err(StoreError::Command { message, .. }) => {
                return Err(StoreError::Batch {
                    total,
                    failed: total,
                    first: message,
                });
            }
            Err(err) => return Err(err),
        };
        drop(conn);

        let mut replies = Vec::with_capacity(total);
        let mut failed = 0;
        let mut first = None;
        for (command, value) in commands.iter().zip(values) {
            match decode(command, value) {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    failed += 1;
                    first.get_or_insert_with(|| err.to_string());
                }
            }
        }

        match first {
            None => Ok(replies),
            Some(first) => Err(StoreError::Batch {
                total,
                failed,
                first,
            }),
        }
    }
}

fn ttl_secs(ttl: &Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn to_cmd(command: &Command) -> Cmd {
    let mut cmd = redis::cmd(command.name());
    match command {
        Command::Ping | Command::DbSize => {}
        Command::Get { key }
        | Command::Incr { key }
        | Command::SetCard { key }
        | Command::SortedSetCard { key } => {
            cmd.arg(key);
        }
        Command::Set {
            key,
            value,
            ttl: None,
        } => {
            cmd.arg(key).arg(value);
        }
        Command::Set {
            key,
            value,
            ttl: Some(ttl),
        } => {
            cmd.arg(key).arg(ttl_secs(ttl)).arg(value);
        }
        Command::Del { keys } => {
            cmd.arg(keys);
        }
        Command::Expire { key, ttl } => {
            cmd.arg(key).arg(ttl_secs(ttl));
        }
        Command::HashSet { key, fields } => {
            cmd.arg(key);
            for (field, value) in fields {
                cmd.arg(field).arg(value);
            }
        }
        Command::HashIncrBy { key, field, delta } => {
            cmd.arg(key).arg(field).arg(*delta);
        }
        Command::SetAdd { key, member } | Command::SetRemove { key, member } => {
            cmd.arg(key).arg(member);
        }
        Command::SortedSetAdd { key, member, score } => {
            cmd.arg(key).arg(*score).arg(member);
        }
        Command::SortedSetIncrBy { key, member, delta } => {
            cmd.arg(key).arg(*delta).arg(member);
        }
        Command::SortedSetRevRange {
            key,
            start,
            stop,
            with_scores,
        } => {
            cmd.arg(key).arg(*start).arg(*stop);
            if *with_scores {
                cmd.arg("WITHSCORES");
            }
        }
        Command::ListPush { key, value } => {
            cmd.arg(key).arg(value);
        }
        Command::ListTrim { key, start, stop } | Command::ListRange { key, start, stop } => {
            cmd.arg(key).arg(*start).arg(*stop);
        }
    }
    cmd
}

fn decode(command: &Command, value: Value) -> StoreResult<Reply> {
    let name = command.name();
    if let Value::ServerError(error) = &value {
        return Err(StoreError::Command {
            command: name,
            message: format!("{error:?}"),
        });
    }

    let parse = |e: RedisError| StoreError::UnexpectedReply {
        command: name,
        reply: e.to_string(),
    };

    let reply = match command {
        Command::Ping | Command::Get { .. } => match value {
            Value::Nil => Reply::Nil,
            value => Reply::Text(String::from_owned_redis_value(value).map_err(parse)?),
        },
        Command::Set { .. } | Command::ListTrim { .. } => Reply::Ok,
        Command::SortedSetIncrBy { .. } => match value {
            Value::Nil => Reply::Nil,
            value => Reply::Float(f64::from_owned_redis_value(value).map_err(parse)?),
        },
        Command::SortedSetRevRange {
            with_scores: true, ..
        } => Reply::Scored(Vec::<(String, f64)>::from_owned_redis_value(value).map_err(parse)?),
        Command::SortedSetRevRange {
            with_scores: false,
            ..
        }
        | Command::ListRange { .. } => {
            Reply::List(Vec::<String>::from_owned_redis_value(value).map_err(parse)?)
        }
        Command::Del { .. }
        | Command::Expire { .. }
        | Command::Incr { .. }
        | Command::HashSet { .. }
        | Command::HashIncrBy { .. }
        | Command::SetAdd { .. }
        | Command::SetRemove { .. }
        | Command::SetCard { .. }
        | Command::SortedSetAdd { .. }
        | Command::SortedSetCard { .. }
        | Command::ListPush { .. }
        | Command::DbSize => Reply::Int(i64::from_owned_redis_value(value).map_err(parse)?),
    };

    Ok(reply)
}
