//! In-memory backend for tests and dry runs.
//!
//! This provides a [`Store`](super::common::Store) backed by a `HashMap`, with the value types and
//! expiry semantics the workload relies on. Expiry follows the tokio clock, so tests running with a
//! paused clock can advance past TTLs deterministically. The store is [`Clone`] so tests can hold a
//! handle for direct inspection while the simulation owns a shared copy.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::common::Store;
use crate::command::{Command, Reply};
use crate::error::{StoreError, StoreResult};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";

#[derive(Debug)]
enum Data {
    Text(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    SortedSet(HashMap<String, f64>),
    List(VecDeque<String>),
}

impl Data {
    fn is_empty(&self) -> bool {
        match self {
            Data::Text(_) => false,
            Data::Hash(map) => map.is_empty(),
            Data::Set(set) => set.is_empty(),
            Data::SortedSet(set) => set.is_empty(),
            Data::List(list) => list.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    data: Data,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

fn wrong_type(command: &'static str) -> StoreError {
    StoreError::Command {
        command,
        message: WRONG_TYPE.into(),
    }
}

fn parse_int(command: &'static str, text: &str) -> StoreResult<i64> {
    text.parse().map_err(|_| StoreError::Command {
        command,
        message: NOT_AN_INTEGER.into(),
    })
}

/// Resolves an inclusive, possibly negative index range like Redis does.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start >= len || start > stop {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl Keyspace {
    /// Drops the entry if it has expired and returns whatever is left.
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn live_or_insert(&mut self, key: &str, now: Instant, default: fn() -> Data) -> &mut Entry {
        self.live(key, now);
        self.entries
            .entry(key.to_owned())
            .or_insert_with(|| Entry {
                data: default(),
                expires_at: None,
            })
    }

    fn remove_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.data.is_empty()) {
            self.entries.remove(key);
        }
    }

    fn apply(&mut self, command: Command, now: Instant) -> StoreResult<Reply> {
        let name = command.name();
        let reply = match command {
            Command::Ping => Reply::Text("PONG".into()),
            Command::DbSize => {
                self.entries
                    .retain(|_, entry| entry.expires_at.is_none_or(|at| at > now));
                Reply::Int(self.entries.len() as i64)
            }
            Command::Get { key } => match self.live(&key, now) {
                None => Reply::Nil,
                Some(Entry {
                    data: Data::Text(text),
                    ..
                }) => Reply::Text(text.clone()),
                Some(_) => return Err(wrong_type(name)),
            },
            Command::Set { key, value, ttl } => {
                self.entries.insert(
                    key,
                    Entry {
                        data: Data::Text(value),
                        expires_at: ttl.map(|ttl| now + ttl),
                    },
                );
                Reply::Ok
            }
            Command::Del { keys } => {
                let mut removed = 0;
                for key in keys {
                    if self.live(&key, now).is_some() {
                        self.entries.remove(&key);
                        removed += 1;
                    }
                }
                Reply::Int(removed)
            }
            Command::Expire { key, ttl } => match self.live(&key, now) {
                Some(entry) => {
                    entry.expires_at = Some(now + ttl);
                    Reply::Int(1)
                }
                None => Reply::Int(0),
            },
            Command::Incr { key } => {
                let entry = self.live_or_insert(&key, now, || Data::Text("0".into()));
                let Data::Text(text) = &mut entry.data else {
                    return Err(wrong_type(name));
                };
                let value = parse_int(name, text)? + 1;
                *text = value.to_string();
                Reply::Int(value)
            }
            Command::HashSet { key, fields } => {
                let entry = self.live_or_insert(&key, now, || Data::Hash(BTreeMap::new()));
                let Data::Hash(hash) = &mut entry.data else {
                    return Err(wrong_type(name));
                };
                let mut added = 0;
                for (field, value) in fields {
                    if hash.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Reply::Int(added)
            }
            Command::HashIncrBy { key, field, delta } => {
                let entry = self.live_or_insert(&key, now, || Data::Hash(BTreeMap::new()));
                let Data::Hash(hash) = &mut entry.data else {
                    return Err(wrong_type(name));
                };
                let current = match hash.get(&field) {
                    Some(text) => parse_int(name, text)?,
                    None => 0,
                };
                let value = current + delta;
                hash.insert(field, value.to_string());
                Reply::Int(value)
            }
            Command::SetAdd { key, member } => {
                let entry = self.live_or_insert(&key, now, || Data::Set(BTreeSet::new()));
                let Data::Set(set) = &mut entry.data else {
                    return Err(wrong_type(name));
                };
                Reply::Int(set.insert(member) as i64)
            }
            Command::SetRemove { key, member } => {
                let removed = match self.live(&key, now) {
                    None => false,
                    Some(Entry {
                        data: Data::Set(set),
                        ..
                    }) => set.remove(&member),
                    Some(_) => return Err(wrong_type(name)),
                };
                self.remove_if_empty(&key);
                Reply::Int(removed as i64)
            }
            Command::SetCard { key } => match self.live(&key, now) {
                None => Reply::Int(0),
                Some(Entry {
                    data: Data::Set(set),
                    ..
                }) => Reply::Int(set.len() as i64),
                Some(_) => return Err(wrong_type(name)),
            },
            Command::SortedSetAdd { key, member, score } => {
                let entry = self.live_or_insert(&key, now, || Data::SortedSet(HashMap::new()));
                let Data::SortedSet(set) = &mut entry.data else {
                    return Err(wrong_type(name));
                };
                Reply::Int(set.insert(member, score).is_none() as i64)
            }
            Command::SortedSetIncrBy { key, member, delta } => {
                let entry = self.live_or_insert(&key, now, || Data::SortedSet(HashMap::new()));
                let Data::SortedSet(set) = &mut entry.data else {
                    return Err(wrong_type(name));
                };
                let score = set.entry(member).or_insert(0.0);
                *score += delta;
                Reply::Float(*score)
            }
            Command::SortedSetCard { key } => match self.live(&key, now) {
                None => Reply::Int(0),
                Some(Entry {
                    data: Data::SortedSet(set),
                    ..
                }) => Reply::Int(set.len() as i64),
                Some(_) => return Err(wrong_type(name)),
            },
            Command::SortedSetRevRange {
                key,
                start,
                stop,
                with_scores,
            } => {
                let mut members: Vec<(String, f64)> = match self.live(&key, now) {
                    None => Vec::new(),
                    Some(Entry {
                        data: Data::SortedSet(set),
                        ..
                    }) => set.iter().map(|(m, s)| (m.clone(), *s)).collect(),
                    Some(_) => return Err(wrong_type(name)),
                };
                // Highest score first, equal scores in reverse lexicographic order.
                members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
                let members = match resolve_range(members.len(), start, stop) {
                    Some((start, stop)) => members[start..=stop].to_vec(),
                    None => Vec::new(),
                };
                if with_scores {
                    Reply::Scored(members)
                } else {
                    Reply::List(members.into_iter().map(|(m, _)| m).collect())
                }
            }
            Command::ListPush { key, value } => {
                let entry = self.live_or_insert(&key, now, || Data::List(VecDeque::new()));
                let Data::List(list) = &mut entry.data else {
                    return Err(wrong_type(name));
                };
                list.push_front(value);
                Reply::Int(list.len() as i64)
            }
            Command::ListTrim { key, start, stop } => {
                match self.live(&key, now) {
                    None => {}
                    Some(Entry {
                        data: Data::List(list),
                        ..
                    }) => match resolve_range(list.len(), start, stop) {
                        Some((start, stop)) => {
                            list.truncate(stop + 1);
                            list.drain(..start);
                        }
                        None => list.clear(),
                    },
                    Some(_) => return Err(wrong_type(name)),
                }
                self.remove_if_empty(&key);
                Reply::Ok
            }
            Command::ListRange { key, start, stop } => match self.live(&key, now) {
                None => Reply::List(Vec::new()),
                Some(Entry {
                    data: Data::List(list),
                    ..
                }) => match resolve_range(list.len(), start, stop) {
                    Some((start, stop)) => Reply::List(list.range(start..=stop).cloned().collect()),
                    None => Reply::List(Vec::new()),
                },
                Some(_) => return Err(wrong_type(name)),
            },
        };

        Ok(reply)
    }
}

/// A [`Store`] that keeps everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    keyspace: Arc<Mutex<Keyspace>>,
    offline: Arc<AtomicBool>,
    latency: Arc<Mutex<Duration>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with a connection error, or restores service.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Delays every subsequent call by `latency` before it is applied.
    ///
    /// A call whose future is dropped during the delay is never applied.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Returns `true` if the key exists and has not expired.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().live(key, Instant::now()).is_some()
    }

    /// Returns the remaining time to live of a key, if it has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .live(key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at - now)
    }

    /// Returns all live keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let keyspace = self.lock();
        let mut keys: Vec<_> = keyspace
            .entries
            .iter()
            .filter(|(key, entry)| {
                key.starts_with(prefix) && entry.expires_at.is_none_or(|at| at > now)
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Keyspace> {
        self.keyspace.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(StoreError::connection(
                "in-memory store is offline",
                std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn execute(&self, command: Command) -> StoreResult<Reply> {
        self.check_online()?;
        self.delay().await;
        self.lock().apply(command, Instant::now())
    }

    async fn pipeline(&self, commands: Vec<Command>) -> StoreResult<Vec<Reply>> {
        self.check_online()?;
        self.delay().await;

        let total = commands.len();
        let now = Instant::now();
        let mut keyspace = self.lock();

        // Like `EXEC`, a failing command does not roll back the others.
        let mut replies = Vec::with_capacity(total);
        let mut failed = 0;
        let mut first = None;
        for command in commands {
            match keyspace.apply(command, now) {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn zadd(key: &str, member: &str, score: f64) -> Command {
        Command::SortedSetAdd {
            key: key.into(),
            member: member.into(),
            score,
        }
    }

    #[tokio::test]
    async fn sorted_set_orders_by_score_descending() {
        let store = InMemoryStore::new();
        store.execute(zadd("lb", "low", 1.0)).await.unwrap();
        store.execute(zadd("lb", "high", 10.0)).await.unwrap();
        store.execute(zadd("lb", "mid", 5.0)).await.unwrap();

        let reply = store
            .execute(Command::SortedSetRevRange {
                key: "lb".into(),
                start: 0,
                stop: 1,
                with_scores: true,
            })
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Scored(vec![("high".into(), 10.0), ("mid".into(), 5.0)])
        );
    }

    #[tokio::test]
    async fn zincrby_creates_and_accumulates() {
        let store = InMemoryStore::new();
        let incr = |delta| Command::SortedSetIncrBy {
            key: "lb".into(),
            member: "p".into(),
            delta,
        };

        assert_eq!(store.execute(incr(5.0)).await.unwrap(), Reply::Float(5.0));
        assert_eq!(store.execute(incr(-7.0)).await.unwrap(), Reply::Float(-2.0));
    }

    #[tokio::test]
    async fn list_push_and_trim_keeps_newest() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .execute(Command::ListPush {
                    key: "l".into(),
                    value: i.to_string(),
                })
                .await
                .unwrap();
        }
        store
            .execute(Command::ListTrim {
                key: "l".into(),
                start: 0,
                stop: 2,
            })
            .await
            .unwrap();

        let reply = store
            .execute(Command::ListRange {
                key: "l".into(),
                start: 0,
                stop: -1,
            })
            .await
            .unwrap();
        assert_eq!(reply, Reply::List(vec!["4".into(), "3".into(), "2".into()]));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_expire_with_the_clock() {
        let store = InMemoryStore::new();
        store
            .execute(Command::set_ex("k", "v", Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(store.contains("k"));
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!store.contains("k"));
        assert_eq!(store.execute(Command::get("k")).await.unwrap(), Reply::Nil);
        assert_eq!(store.execute(Command::DbSize).await.unwrap(), Reply::Int(0));
    }

    #[tokio::test]
    async fn wrong_type_is_a_command_error() {
        let store = InMemoryStore::new();
        store.execute(Command::set("k", "v")).await.unwrap();

        let err = store
            .execute(Command::SetAdd {
                key: "k".into(),
                member: "m".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Command { command: "SADD", .. }));
    }

    #[tokio::test]
    async fn failing_batch_reports_one_error() {
        let store = InMemoryStore::new();
        store.execute(Command::set("text", "v")).await.unwrap();

        let err = store
            .pipeline(vec![
                Command::set("a", "1"),
                Command::Incr { key: "text".into() },
                Command::set("b", "2"),
            ])
            .await
            .unwrap_err();

        let StoreError::Batch { total, failed, .. } = err else {
            panic!("expected batch error, got {err}");
        };
        assert_eq!((total, failed), (3, 1));
    }

    #[tokio::test]
    async fn removing_last_member_deletes_the_set() {
        let store = InMemoryStore::new();
        let member = |cmd: fn(String, String) -> Command| cmd("s".into(), "m".into());
        store
            .execute(member(|key, member| Command::SetAdd { key, member }))
            .await
            .unwrap();
        store
            .execute(member(|key, member| Command::SetRemove { key, member }))
            .await
            .unwrap();
        assert!(!store.contains("s"));
    }

    #[tokio::test]
    async fn offline_store_fails_transiently() {
        let store = InMemoryStore::new();
        store.set_offline(true);

        let err = store.execute(Command::Ping).await.unwrap_err();
        assert!(err.is_transient());

        store.set_offline(false);
        assert!(store.execute(Command::Ping).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_and_dropped_calls_do_not_apply() {
        let store = InMemoryStore::new();
        store.set_latency(Duration::from_secs(2));

        let started = Instant::now();
        store.execute(Command::set("a", "1")).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));

        let dropped = tokio::time::timeout(
            Duration::from_secs(1),
            store.execute(Command::set("b", "1")),
        )
        .await;
        assert!(dropped.is_err());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
    }

    #[test]
    fn ranges_resolve_like_redis() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 0, 49), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 6, 10), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }
}
