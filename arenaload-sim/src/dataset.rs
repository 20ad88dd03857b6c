//! The baseline dataset written by `load`.
//!
//! A load first deletes the leaderboard, online set and message list, then writes the leaderboard,
//! one session per player and a configurable number of cache items, lobbies, rate-limit counters,
//! achievements, analytics events and notifications. All of it is dispatched as a single atomic
//! batch. Every key except the leaderboard, the online set and the message list expires.

use std::ops::RangeInclusive;
use std::time::{Duration, SystemTime};

use arenaload_store::{Command, Store};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::catalog::{
    ACHIEVEMENTS, CHAT_TEMPLATES, EVENT_MODES, EVENT_TYPES, GAME_ITEMS, GAME_MODES,
    LOBBY_STATUSES, MAPS, NOTIFICATION_TYPES, RARITIES, SESSION_STATUSES, pick,
};
use crate::config::DatasetConfig;
use crate::error::SimResult;
use crate::keys;

/// Score range of the player at `rank` (0 is the top) in a leaderboard of `players`.
///
/// The top 3% of ranks get the highest band, then the top 10%, 25% and 50%. Bands are disjoint and
/// descending, so sorting the leaderboard by score reproduces the assigned ranks.
pub fn rank_band(rank: usize, players: usize) -> RangeInclusive<i64> {
    let percentile = rank * 100 / players.max(1);
    match percentile {
        0..3 => 5_000_000..=10_000_000,
        3..10 => 1_000_000..=4_999_999,
        10..25 => 100_000..=999_999,
        25..50 => 10_000..=99_999,
        _ => 100..=9_999,
    }
}

/// What a load wrote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub players: usize,
    pub commands: usize,
    /// Key count reported by the store after the load.
    pub total_keys: u64,
}

fn sample<'a, R: Rng + ?Sized>(rng: &mut R, items: &'a [String], amount: usize) -> Vec<&'a str> {
    items
        .choose_multiple(rng, amount)
        .map(String::as_str)
        .collect()
}

fn rfc3339(time: SystemTime) -> String {
    humantime::format_rfc3339_millis(time).to_string()
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn expiring_hash<K, V>(
    commands: &mut Vec<Command>,
    key: String,
    fields: impl IntoIterator<Item = (K, V)>,
    ttl: Duration,
) where
    K: Into<String>,
    V: Into<String>,
{
    commands.push(Command::hset(&key, fields));
    commands.push(Command::expire(key, ttl));
}

/// Builds every command of a load, in dispatch order.
pub fn build<R: Rng + ?Sized>(
    config: &DatasetConfig,
    roster: &[String],
    rng: &mut R,
) -> SimResult<Vec<Command>> {
    let now = SystemTime::now();
    let ttls = &config.ttls;
    let mut commands = vec![Command::Del {
        keys: vec![
            keys::LEADERBOARD.into(),
            keys::ONLINE_PLAYERS.into(),
            keys::MESSAGES.into(),
        ],
    }];

    let mut ranked: Vec<&String> = roster.iter().take(config.players).collect();
    ranked.shuffle(rng);
    let players = ranked.len();

    for (rank, player) in ranked.into_iter().enumerate() {
        commands.push(Command::SortedSetAdd {
            key: keys::LEADERBOARD.into(),
            member: player.clone(),
            score: rng.random_range(rank_band(rank, players)) as f64,
        });
        commands.push(Command::SetAdd {
            key: keys::ONLINE_PLAYERS.into(),
            member: player.clone(),
        });

        let game_id = if rng.random_bool(0.3) {
            Uuid::new_v4().to_string()
        } else {
            String::new()
        };
        let session = [
            ("username", player.clone()),
            ("level", rng.random_range(1..=100).to_string()),
            ("games_played", rng.random_range(50..=5000).to_string()),
            ("wins", rng.random_range(20..=2000).to_string()),
            ("losses", rng.random_range(10..=1500).to_string()),
            ("last_seen", rfc3339(now)),
            ("status", pick(rng, SESSION_STATUSES).to_string()),
            ("current_game_id", game_id),
            ("rank", rng.random_range(1..=1000).to_string()),
            ("xp", rng.random_range(1000..=100_000).to_string()),
        ];
        let ttl = ttls.session.sample_secs(rng);
        expiring_hash(&mut commands, keys::session(player), session, ttl);
    }

    for index in 0..config.cache_items {
        let stats = json!({
            "attack": rng.random_range(10..=1000),
            "defense": rng.random_range(10..=1000),
            "speed": rng.random_range(10..=100),
        });
        let item = [
            ("item_id", Uuid::new_v4().to_string()),
            ("name", pick(rng, GAME_ITEMS).to_string()),
            ("rarity", pick(rng, RARITIES).to_string()),
            ("level", rng.random_range(1..=100).to_string()),
            ("stats", stats.to_string()),
            ("price", rng.random_range(100..=50_000).to_string()),
        ];
        let key = keys::cache_item(*pick(rng, GAME_ITEMS), index);
        let ttl = ttls.cache_item.sample_secs(rng);
        expiring_hash(&mut commands, key, item, ttl);
    }

    for index in 0..config.lobbies {
        let id = Uuid::new_v4();
        let amount = rng.random_range(2..=8);
        let lobby = [
            ("id", id.to_string()),
            ("name", format!("Game Room {}", index + 1)),
            ("players", serde_json::to_string(&sample(rng, roster, amount))?),
            ("max_players", rng.random_range(4..=16).to_string()),
            ("game_mode", pick(rng, GAME_MODES).to_string()),
            ("map", pick(rng, MAPS).to_string()),
            ("status", pick(rng, LOBBY_STATUSES).to_string()),
            ("created_at", rfc3339(now)),
        ];
        let ttl = ttls.lobby.sample_secs(rng);
        expiring_hash(&mut commands, keys::lobby(id), lobby, ttl);
    }

    for player in sample(rng, roster, config.rate_limited_players) {
        for endpoint in keys::RATE_LIMIT_ENDPOINTS {
            commands.push(Command::set_ex(
                keys::rate_limit(endpoint, player),
                rng.random_range(1..=10).to_string(),
                ttls.rate_limit.sample_secs(rng),
            ));
        }
    }

    for player in sample(rng, roster, config.achievement_players) {
        let amount = config.achievements_per_player.sample(rng);
        for achievement in ACHIEVEMENTS.choose_multiple(rng, amount).copied().collect::<Vec<_>>() {
            let days_ago = Duration::from_secs(86400 * rng.random_range(1..=365));
            let record = [
                ("player", player.to_owned()),
                ("achievement", achievement.to_owned()),
                ("unlocked_at", rfc3339(now - days_ago)),
                ("progress", rng.random_range(80..=100).to_string()),
                ("reward_claimed", rng.random_bool(0.5).to_string()),
            ];
            let ttl = ttls.achievement.sample_secs(rng);
            expiring_hash(&mut commands, keys::achievement(player, achievement), record, ttl);
        }
    }

    let now_secs = unix_secs(now);
    for index in 0..config.analytics_events {
        let timestamp = now_secs.saturating_sub(rng.random_range(0..=86400));
        let metadata = json!({
            "game_mode": pick(rng, EVENT_MODES),
            "duration": rng.random_range(60..=3600),
        });
        let event = [
            ("timestamp", timestamp.to_string()),
            ("event_type", pick(rng, EVENT_TYPES).to_string()),
            ("player", pick(rng, roster).clone()),
            ("value", rng.random_range(1..=1000).to_string()),
            ("metadata", metadata.to_string()),
        ];
        let ttl = ttls.analytics_event.sample_secs(rng);
        expiring_hash(&mut commands, keys::analytics_event(timestamp, index), event, ttl);
    }

    for player in sample(rng, roster, config.notification_players) {
        for _ in 0..config.notifications_per_player.sample(rng) {
            let notification = [
                ("type", pick(rng, NOTIFICATION_TYPES).to_string()),
                ("title", "New Notification".to_owned()),
                ("message", pick(rng, CHAT_TEMPLATES).to_string()),
                ("from_player", pick(rng, roster).clone()),
                ("created_at", rfc3339(now)),
                ("read", rng.random_bool(0.5).to_string()),
            ];
            let key = keys::notification(player, Uuid::new_v4());
            let ttl = ttls.notification.sample_secs(rng);
            expiring_hash(&mut commands, key, notification, ttl);
        }
    }

    Ok(commands)
}

/// Replaces the baseline dataset in one atomic batch.
///
/// A failure of any command fails the whole load with a single batch error.
pub async fn load<R: Rng + ?Sized>(
    store: &dyn Store,
    config: &DatasetConfig,
    roster: &[String],
    rng: &mut R,
) -> SimResult<LoadSummary> {
    let commands = build(config, roster, rng)?;
    let count = commands.len();
    let players = config.players.min(roster.len());

    tracing::info!(players, commands = count, "loading dataset");
    store.pipeline(commands).await?;

    let total_keys = store.execute(Command::DbSize).await?.into_int("DBSIZE")? as u64;
    tracing::info!(total_keys, "dataset loaded");

    Ok(LoadSummary {
        players,
        commands: count,
        total_keys,
    })
}
