//! Live counters and the statistics snapshot exposed to observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use arenaload_store::{Command, Store, StoreError};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::SimResult;
use crate::keys;
use crate::message::ChatMessage;
use crate::orchestrator::Phase;

const LEADERBOARD_LEN: isize = 10;
const RECENT_MESSAGES: isize = 20;

/// Counters shared by the workers, the counter task and the monitor.
///
/// All counters are approximate. Increments and the monitor's read-and-reset are not linearizable
/// with respect to each other.
#[derive(Debug)]
pub struct LiveStats {
    total_operations: AtomicU64,
    failed_operations: AtomicU64,
    skipped_operations: AtomicU64,
    ops_per_second: AtomicU64,
    counter_value: AtomicU64,
    samples: AtomicU64,
    last_sample: Mutex<Instant>,
}

impl Default for LiveStats {
    fn default() -> Self {
        Self {
            total_operations: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            skipped_operations: AtomicU64::new(0),
            ops_per_second: AtomicU64::new(0),
            counter_value: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            last_sample: Mutex::new(Instant::now()),
        }
    }
}

impl LiveStats {
    pub(crate) fn record_success(&self) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Clears per-run counters and restarts the sample clock.
    pub(crate) fn reset_run(&self) {
        self.total_operations.store(0, Ordering::Relaxed);
        self.failed_operations.store(0, Ordering::Relaxed);
        self.skipped_operations.store(0, Ordering::Relaxed);
        self.ops_per_second.store(0, Ordering::Relaxed);
        *self.last_sample.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Computes operations per second since the previous sample and resets the accumulator.
    pub(crate) fn sample(&self) -> u64 {
        let now = Instant::now();
        let elapsed = {
            let mut last = self.last_sample.lock().unwrap_or_else(PoisonError::into_inner);
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };

        let operations = self.total_operations.swap(0, Ordering::Relaxed);
        let rate = ops_per_second(operations, elapsed);

        self.ops_per_second.store(rate, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
        rate
    }

    /// Advances the counter and returns the new value.
    pub(crate) fn next_counter(&self) -> u64 {
        self.counter_value.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn set_counter(&self, value: u64) {
        self.counter_value.store(value, Ordering::Relaxed);
    }

    /// Operations completed since the last monitor sample.
    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Relaxed)
    }

    pub fn failed_operations(&self) -> u64 {
        self.failed_operations.load(Ordering::Relaxed)
    }

    /// Operations skipped because generated content failed validation.
    pub fn skipped_operations(&self) -> u64 {
        self.skipped_operations.load(Ordering::Relaxed)
    }

    pub fn ops_per_second(&self) -> u64 {
        self.ops_per_second.load(Ordering::Relaxed)
    }

    pub fn counter_value(&self) -> u64 {
        self.counter_value.load(Ordering::Relaxed)
    }

    /// Number of monitor samples taken since the process started.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}

fn ops_per_second(operations: u64, elapsed: Duration) -> u64 {
    if elapsed.is_zero() {
        return 0;
    }
    (operations as f64 / elapsed.as_secs_f64()) as u64
}

/// Formats an integer with `,` as thousands separator.
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        formatted.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(c);
    }
    formatted
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub player: String,
    pub score: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ServerStatus {
    Ready,
    Loaded,
    Running,
    Error,
}

/// Summary figures of the dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProfileStats {
    pub total_players: u64,
    pub active_games: u64,
    /// Highest leaderboard score, thousands-separated.
    pub high_score: String,
    /// Number of keys in the store, thousands-separated.
    pub total_keys: String,
    pub server_status: ServerStatus,
}

impl ProfileStats {
    fn empty(server_status: ServerStatus) -> Self {
        Self {
            total_players: 0,
            active_games: 0,
            high_score: "0".into(),
            total_keys: "0".into(),
            server_status,
        }
    }
}

/// A point-in-time view of the simulation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stats {
    /// Top players, highest score first.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Newest messages first.
    pub recent_messages: Vec<ChatMessage>,
    pub online_count: u64,
    /// Zero while not running.
    pub ops_per_second: u64,
    /// Zero while not running.
    pub counter_value: u64,
    pub failed_operations: u64,
    pub skipped_operations: u64,
    pub profile_stats: ProfileStats,
    pub running: bool,
    pub data_loaded: bool,
}

struct Snapshot {
    leaderboard: Vec<LeaderboardEntry>,
    recent_messages: Vec<ChatMessage>,
    online_count: u64,
    total_players: u64,
    total_keys: u64,
}

async fn read_snapshot(store: &dyn Store) -> SimResult<Snapshot> {
    let replies = store
        .pipeline(vec![
            Command::SortedSetRevRange {
                key: keys::LEADERBOARD.into(),
                start: 0,
                stop: LEADERBOARD_LEN - 1,
                with_scores: true,
            },
            Command::ListRange {
                key: keys::MESSAGES.into(),
                start: 0,
                stop: RECENT_MESSAGES - 1,
            },
            Command::SetCard {
                key: keys::ONLINE_PLAYERS.into(),
            },
            Command::SortedSetCard {
                key: keys::LEADERBOARD.into(),
            },
            Command::DbSize,
        ])
        .await?;

    let mut replies = replies.into_iter();
    let mut next = |command: &'static str| {
        replies.next().ok_or(StoreError::UnexpectedReply {
            command,
            reply: "(missing)".into(),
        })
    };

    let leaderboard = next("ZREVRANGE")?
        .into_scored("ZREVRANGE")?
        .into_iter()
        .map(|(player, score)| LeaderboardEntry {
            player,
            score: score as i64,
        })
        .collect();

    let recent_messages = next("LRANGE")?
        .into_list("LRANGE")?
        .iter()
        .filter_map(|raw| match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::debug!(error = &err as &dyn std::error::Error, "skipping malformed message");
                None
            }
        })
        .collect();

    Ok(Snapshot {
        leaderboard,
        recent_messages,
        online_count: next("SCARD")?.into_int("SCARD")? as u64,
        total_players: next("ZCARD")?.into_int("ZCARD")? as u64,
        total_keys: next("DBSIZE")?.into_int("DBSIZE")? as u64,
    })
}

/// Assembles [`Stats`] for the given phase.
///
/// Store data is read whenever a dataset is loaded. Store failures degrade to empty figures with
/// [`ServerStatus::Error`].
pub(crate) async fn collect(store: &dyn Store, live: &LiveStats, phase: Phase) -> Stats {
    let running = phase == Phase::Running;
    let data_loaded = phase != Phase::Idle;

    let mut stats = Stats {
        leaderboard: Vec::new(),
        recent_messages: Vec::new(),
        online_count: 0,
        ops_per_second: 0,
        counter_value: 0,
        failed_operations: live.failed_operations(),
        skipped_operations: live.skipped_operations(),
        profile_stats: ProfileStats::empty(ServerStatus::Ready),
        running,
        data_loaded,
    };

    if running {
        stats.ops_per_second = live.ops_per_second();
        stats.counter_value = live.counter_value();
    }

    if data_loaded {
        match read_snapshot(store).await {
            Ok(snapshot) => {
                let high_score = snapshot.leaderboard.first().map_or(0, |e| e.score);
                stats.profile_stats = ProfileStats {
                    total_players: snapshot.total_players,
                    active_games: snapshot.online_count,
                    high_score: format_thousands(high_score),
                    total_keys: format_thousands(snapshot.total_keys as i64),
                    server_status: if running {
                        ServerStatus::Running
                    } else {
                        ServerStatus::Loaded
                    },
                };
                stats.leaderboard = snapshot.leaderboard;
                stats.recent_messages = snapshot.recent_messages;
                stats.online_count = snapshot.online_count;
            }
            Err(err) => {
                tracing::error!(error = &err as &dyn std::error::Error, "failed to read stats");
                stats.profile_stats = ProfileStats::empty(ServerStatus::Error);
            }
        }
    }

    stats
}
