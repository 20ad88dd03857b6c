//! The operations workers issue against the store.
//!
//! A [`Workload`] owns an RNG and the weighted distributions that pick the next [`Operation`] and
//! the [`ScoreTier`] of leaderboard updates. Every operation draws its random inputs first and then
//! issues one command or one atomic batch.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arenaload_store::{Command, SharedStore};
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;
use serde_json::json;
use uuid::Uuid;

use crate::catalog::{
    ACHIEVEMENTS, ACTIVITY_STATUSES, ANALYTICS_ACTIONS, CHAT_TEMPLATES, GAME_ITEMS,
    PLAYER_PLACEHOLDER, pick,
};
use crate::config::{Band, OperationWeights, SimulationConfig};
use crate::error::{SimError, SimResult};
use crate::keys;
use crate::message::{ChatMessage, MessageKind, capped_push};
use crate::validation::{validate_message, validate_player_name};

/// The operation categories a worker chooses from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    UpdateLeaderboard,
    PostMessage,
    UpdateSession,
    PlayerActivity,
    CreateEphemeral,
    UpdateAnalytics,
    CacheSet,
    CacheGet,
    CacheUpdate,
    TtlChurn,
}

impl Operation {
    pub const ALL: [Self; 10] = [
        Self::UpdateLeaderboard,
        Self::PostMessage,
        Self::UpdateSession,
        Self::PlayerActivity,
        Self::CreateEphemeral,
        Self::UpdateAnalytics,
        Self::CacheSet,
        Self::CacheGet,
        Self::CacheUpdate,
        Self::TtlChurn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::UpdateLeaderboard => "update_leaderboard",
            Self::PostMessage => "post_message",
            Self::UpdateSession => "update_session",
            Self::PlayerActivity => "player_activity",
            Self::CreateEphemeral => "create_ephemeral",
            Self::UpdateAnalytics => "update_analytics",
            Self::CacheSet => "cache_set",
            Self::CacheGet => "cache_get",
            Self::CacheUpdate => "cache_update",
            Self::TtlChurn => "ttl_churn",
        }
    }

    fn weight(self, weights: &OperationWeights) -> u32 {
        match self {
            Self::UpdateLeaderboard => weights.update_leaderboard,
            Self::PostMessage => weights.post_message,
            Self::UpdateSession => weights.update_session,
            Self::PlayerActivity => weights.player_activity,
            Self::CreateEphemeral => weights.create_ephemeral,
            Self::UpdateAnalytics => weights.update_analytics,
            Self::CacheSet => weights.cache_set,
            Self::CacheGet => weights.cache_get,
            Self::CacheUpdate => weights.cache_update,
            Self::TtlChurn => weights.ttl_churn,
        }
    }
}

/// Magnitude class of a leaderboard score change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScoreTier {
    MegaWin,
    BigWin,
    Win,
    Loss,
    BigLoss,
    MegaLoss,
    RandomReset,
}

impl ScoreTier {
    pub const ALL: [Self; 7] = [
        Self::MegaWin,
        Self::BigWin,
        Self::Win,
        Self::Loss,
        Self::BigLoss,
        Self::MegaLoss,
        Self::RandomReset,
    ];

    /// The signed score change drawn for this tier.
    pub fn range(self) -> RangeInclusive<i64> {
        match self {
            Self::MegaWin => 50_000..=500_000,
            Self::BigWin => 10_000..=49_999,
            Self::Win => 500..=9_999,
            Self::Loss => -5_000..=-100,
            Self::BigLoss => -25_000..=-5_001,
            Self::MegaLoss => -200_000..=-25_001,
            Self::RandomReset => -100_000..=200_000,
        }
    }

    /// Relative frequency. The mega tiers and resets are rare.
    pub fn weight(self) -> u32 {
        match self {
            Self::MegaWin => 1,
            Self::BigWin => 3,
            Self::Win => 6,
            Self::Loss => 6,
            Self::BigLoss => 3,
            Self::MegaLoss => 1,
            Self::RandomReset => 1,
        }
    }
}

/// Returns the score to write back if `score` lies outside `bounds`.
pub fn clamp_score(score: f64, bounds: Band<i64>) -> Option<i64> {
    if score < bounds.min as f64 {
        Some(bounds.min)
    } else if score > bounds.max as f64 {
        Some(bounds.max)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug)]
enum Activity {
    Join,
    Leave,
    Achievement,
    StatusUpdate,
    Purchase,
}

impl Activity {
    const ALL: [Self; 5] = [
        Self::Join,
        Self::Leave,
        Self::Achievement,
        Self::StatusUpdate,
        Self::Purchase,
    ];
}

#[derive(Clone, Copy, Debug)]
enum Churn {
    Session,
    Data,
    Rate,
    Event,
}

impl Churn {
    const ALL: [Self; 4] = [Self::Session, Self::Data, Self::Rate, Self::Event];
}

fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn rfc3339_now() -> String {
    humantime::format_rfc3339_millis(SystemTime::now()).to_string()
}

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    store: SharedStore,
    config: Arc<SimulationConfig>,
    roster: Arc<[String]>,
    seed: u64,
}

impl WorkloadBuilder {
    /// Seeds the RNG, making operation choices reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Creates the workload, failing if the roster is too small or all weights are zero.
    pub fn build(self) -> SimResult<Workload> {
        if self.roster.len() < 2 {
            return Err(SimError::Config("roster needs at least two players".into()));
        }

        let operations = WeightedIndex::new(
            Operation::ALL
                .iter()
                .map(|op| op.weight(&self.config.weights)),
        )
        .map_err(|e| SimError::Config(format!("operation weights: {e}")))?;
        let tiers = WeightedIndex::new(ScoreTier::ALL.iter().map(|tier| tier.weight()))
            .map_err(|e| SimError::Config(format!("score tiers: {e}")))?;

        Ok(Workload {
            store: self.store,
            config: self.config,
            roster: self.roster,
            rng: SmallRng::seed_from_u64(self.seed),
            operations,
            tiers,
        })
    }
}

/// Generates and executes randomized operations for one worker.
#[derive(Debug)]
pub struct Workload {
    store: SharedStore,
    config: Arc<SimulationConfig>,
    /// Players the operations pick from.
    roster: Arc<[String]>,

    rng: SmallRng,
    operations: WeightedIndex<u32>,
    tiers: WeightedIndex<u32>,
}

impl Workload {
    pub fn builder(
        store: SharedStore,
        config: Arc<SimulationConfig>,
        roster: Arc<[String]>,
    ) -> WorkloadBuilder {
        WorkloadBuilder {
            store,
            config,
            roster,
            seed: rand::random(),
        }
    }

    pub fn next_operation(&mut self) -> Operation {
        Operation::ALL[self.operations.sample(&mut self.rng)]
    }

    pub fn next_tier(&mut self) -> ScoreTier {
        ScoreTier::ALL[self.tiers.sample(&mut self.rng)]
    }

    pub(crate) fn batch_size(&mut self) -> usize {
        self.config.batch_size.sample(&mut self.rng)
    }

    pub(crate) fn pause(&mut self) -> Duration {
        self.config.pause.sample(&mut self.rng)
    }

    fn player(&mut self) -> String {
        pick(&mut self.rng, &self.roster).clone()
    }

    fn other_player(&mut self, player: &str) -> String {
        loop {
            let other = pick(&mut self.rng, &self.roster);
            if other != player {
                return other.clone();
            }
        }
    }

    fn players(&mut self, amount: RangeInclusive<usize>) -> Vec<String> {
        let amount = self.rng.random_range(amount);
        self.roster
            .choose_multiple(&mut self.rng, amount)
            .cloned()
            .collect()
    }

    /// Executes a single operation.
    ///
    /// Generated content that fails validation yields [`SimError::Validation`] without touching the
    /// store.
    pub async fn execute(&mut self, operation: Operation) -> SimResult<()> {
        match operation {
            Operation::UpdateLeaderboard => self.update_leaderboard().await,
            Operation::PostMessage => self.post_message().await,
            Operation::UpdateSession => self.update_session().await,
            Operation::PlayerActivity => self.player_activity().await,
            Operation::CreateEphemeral => self.create_ephemeral().await,
            Operation::UpdateAnalytics => self.update_analytics().await,
            Operation::CacheSet => self.cache_set().await,
            Operation::CacheGet => self.cache_get().await,
            Operation::CacheUpdate => self.cache_update().await,
            Operation::TtlChurn => self.ttl_churn().await,
        }
    }

    async fn update_leaderboard(&mut self) -> SimResult<()> {
        let player = self.player();
        let tier = self.next_tier();
        let delta = self.rng.random_range(tier.range());

        let score = self
            .store
            .execute(Command::SortedSetIncrBy {
                key: keys::LEADERBOARD.into(),
                member: player.clone(),
                delta: delta as f64,
            })
            .await?
            .into_float("ZINCRBY")?;

        // The unclamped score is visible until this write lands.
        if let Some(clamped) = clamp_score(score, self.config.score_bounds) {
            self.store
                .execute(Command::SortedSetAdd {
                    key: keys::LEADERBOARD.into(),
                    member: player,
                    score: clamped as f64,
                })
                .await?;
        }

        Ok(())
    }

    async fn post_message(&mut self) -> SimResult<()> {
        let player = self.player();
        let template = *pick(&mut self.rng, CHAT_TEMPLATES);
        validate_player_name(&player)?;

        let text = if template.contains(PLAYER_PLACEHOLDER) {
            let other = self.other_player(&player);
            template.replace(PLAYER_PLACEHOLDER, &other)
        } else {
            template.to_owned()
        };
        validate_message(&text)?;

        self.push_message(ChatMessage::new(&player, &text, MessageKind::Chat))
            .await
    }

    async fn push_message(&mut self, message: ChatMessage) -> SimResult<()> {
        let value = serde_json::to_string(&message)?;
        self.store
            .pipeline(capped_push(keys::MESSAGES, value, self.config.message_cap))
            .await?;
        Ok(())
    }

    async fn update_session(&mut self) -> SimResult<()> {
        let player = self.player();
        let key = keys::session(&player);

        let mut commands = vec![
            Command::HashIncrBy {
                key: key.clone(),
                field: "games_played".into(),
                delta: self.rng.random_range(1..=3),
            },
            Command::hset(&key, [("last_seen", rfc3339_now())]),
        ];
        if self.rng.random_bool(0.3) {
            commands.push(Command::HashIncrBy {
                key: key.clone(),
                field: "wins".into(),
                delta: self.rng.random_range(0..=2),
            });
        }
        let ttl = self.config.ttls.session.sample_secs(&mut self.rng);
        commands.push(Command::expire(key, ttl));

        self.store.pipeline(commands).await?;
        Ok(())
    }

    async fn player_activity(&mut self) -> SimResult<()> {
        let player = self.player();

        let command = match *pick(&mut self.rng, &Activity::ALL) {
            Activity::Join => Command::SetAdd {
                key: keys::ONLINE_PLAYERS.into(),
                member: player,
            },
            Activity::Leave => Command::SetRemove {
                key: keys::ONLINE_PLAYERS.into(),
                member: player,
            },
            Activity::Achievement => {
                validate_player_name(&player)?;
                let achievement = pick(&mut self.rng, ACHIEVEMENTS);
                let text = format!("{player} unlocked {achievement}! 🏆");
                validate_message(&text)?;
                let message = ChatMessage::new(&player, &text, MessageKind::Achievement);
                return self.push_message(message).await;
            }
            Activity::StatusUpdate => {
                let status = *pick(&mut self.rng, ACTIVITY_STATUSES);
                Command::hset(keys::session(&player), [("status", status)])
            }
            Activity::Purchase => {
                let record = json!({
                    "player": player,
                    "item": pick(&mut self.rng, GAME_ITEMS),
                    "price": self.rng.random_range(100..=10_000),
                    "timestamp": unix_now().as_secs_f64(),
                });
                Command::set_ex(
                    keys::purchase(&player, Uuid::new_v4()),
                    record.to_string(),
                    self.config.ttls.purchase,
                )
            }
        };

        self.store.execute(command).await?;
        Ok(())
    }

    async fn create_ephemeral(&mut self) -> SimResult<()> {
        if self.rng.random_bool(0.5) {
            let key = keys::temp_lobby(Uuid::new_v4());
            let players = serde_json::to_string(&self.players(2..=6))?;
            let ttl = self.config.ttls.temp_lobby.sample_secs(&mut self.rng);
            let fields = [
                ("players", players),
                ("status", "waiting".to_owned()),
                ("created", unix_now().as_secs_f64().to_string()),
            ];
            self.store
                .pipeline(vec![Command::hset(&key, fields), Command::expire(key, ttl)])
                .await?;
        } else {
            let players = self.players(4..=8);
            let score: serde_json::Map<_, _> = self
                .players(4..=4)
                .into_iter()
                .map(|p| (p, json!(self.rng.random_range(0..=1000))))
                .collect();
            let record = json!({ "players": players, "score": score, "status": "active" });
            let ttl = self.config.ttls.temp_match.sample_secs(&mut self.rng);
            self.store
                .execute(Command::set_ex(
                    keys::temp_match(Uuid::new_v4()),
                    record.to_string(),
                    ttl,
                ))
                .await?;
        }

        Ok(())
    }

    async fn update_analytics(&mut self) -> SimResult<()> {
        let now = unix_now();
        let key = keys::realtime_analytics(now.as_secs(), self.rng.random_range(1..=1000));
        let record = json!({
            "player": self.player(),
            "action": pick(&mut self.rng, ANALYTICS_ACTIONS),
            "value": self.rng.random_range(1..=500),
            "timestamp": now.as_secs_f64(),
        });
        let ttl = self.config.ttls.realtime_analytics.sample_secs(&mut self.rng);

        self.store
            .execute(Command::set_ex(key, record.to_string(), ttl))
            .await?;
        Ok(())
    }

    async fn cache_set(&mut self) -> SimResult<()> {
        let record = json!({ "data": self.rng.random_range(1..=1000) });
        let ttl = self.config.ttls.rapid_cache.sample_secs(&mut self.rng);
        self.store
            .execute(Command::set_ex(
                keys::rapid_cache(Uuid::new_v4()),
                record.to_string(),
                ttl,
            ))
            .await?;
        Ok(())
    }

    /// Reads a key that almost certainly does not exist, producing cache misses.
    async fn cache_get(&mut self) -> SimResult<()> {
        self.store
            .execute(Command::get(keys::rapid_cache(Uuid::new_v4())))
            .await?;
        Ok(())
    }

    async fn cache_update(&mut self) -> SimResult<()> {
        let key = keys::cache_update(self.rng.random_range(1..=1000));
        let record = json!({ "updated": unix_now().as_secs_f64() });
        let ttl = self.config.ttls.cache_update.sample_secs(&mut self.rng);
        self.store
            .execute(Command::set_ex(key, record.to_string(), ttl))
            .await?;
        Ok(())
    }

    async fn ttl_churn(&mut self) -> SimResult<()> {
        let ttls = &self.config.ttls;
        let command = match *pick(&mut self.rng, &Churn::ALL) {
            Churn::Session => Command::set_ex(
                keys::temp_session(Uuid::new_v4()),
                json!({ "session_data": unix_now().as_secs_f64() }).to_string(),
                ttls.temp_session.sample_secs(&mut self.rng),
            ),
            Churn::Data => Command::set_ex(
                keys::temp_data(Uuid::new_v4()),
                format!("temp_value_{}", self.rng.random_range(1..=1000)),
                ttls.temp_data.sample_secs(&mut self.rng),
            ),
            Churn::Rate => {
                let player = pick(&mut self.rng, &self.roster);
                Command::set_ex(
                    keys::rate(player, self.rng.random_range(1..=100)),
                    "1",
                    ttls.rate.sample_secs(&mut self.rng),
                )
            }
            Churn::Event => Command::set_ex(
                keys::temp_event(unix_now().as_secs(), self.rng.random_range(1..=1000)),
                json!({ "event": "temp_event" }).to_string(),
                ttls.temp_event.sample_secs(&mut self.rng),
            ),
        };

        self.store.execute(command).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use arenaload_store::{InMemoryStore, Reply, Store};

    use super::*;
    use crate::catalog;

    fn workload(store: &InMemoryStore, config: SimulationConfig) -> Workload {
        let roster: Arc<[String]> = catalog::roster(20).into();
        Workload::builder(Arc::new(store.clone()), Arc::new(config), roster)
            .seed(42)
            .build()
            .unwrap()
    }

    async fn scores(store: &InMemoryStore) -> Vec<(String, f64)> {
        store
            .execute(Command::SortedSetRevRange {
                key: keys::LEADERBOARD.into(),
                start: 0,
                stop: -1,
                with_scores: true,
            })
            .await
            .unwrap()
            .into_scored("ZREVRANGE")
            .unwrap()
    }

    #[test]
    fn clamps_out_of_bounds_scores() {
        let bounds = Band::new(100, 50_000_000);
        assert_eq!(clamp_score(99.0, bounds), Some(100));
        assert_eq!(clamp_score(-250_000.0, bounds), Some(100));
        assert_eq!(clamp_score(100.0, bounds), None);
        assert_eq!(clamp_score(50_000_000.0, bounds), None);
        assert_eq!(clamp_score(50_000_001.0, bounds), Some(50_000_000));
    }

    #[test]
    fn tier_ranges_match_their_sign() {
        for tier in ScoreTier::ALL {
            let range = tier.range();
            assert!(range.start() <= range.end(), "{tier:?}");
            assert!(tier.weight() > 0);
        }
        assert!(ScoreTier::MegaWin.weight() < ScoreTier::Win.weight());
        assert!(ScoreTier::MegaLoss.weight() < ScoreTier::Loss.weight());
        assert!(ScoreTier::Loss.range().all(|d| d < 0));
        assert!(*ScoreTier::Win.range().start() > 0);
    }

    #[tokio::test]
    async fn leaderboard_scores_stay_in_bounds() {
        let store = InMemoryStore::new();
        let config = SimulationConfig {
            score_bounds: Band::new(100, 300_000),
            ..Default::default()
        };
        let roster: Arc<[String]> = catalog::roster(2).into();
        for (player, score) in roster.iter().zip([100.0, 300_000.0]) {
            store
                .execute(Command::SortedSetAdd {
                    key: keys::LEADERBOARD.into(),
                    member: player.clone(),
                    score,
                })
                .await
                .unwrap();
        }

        let mut workload = Workload::builder(Arc::new(store.clone()), Arc::new(config), roster)
            .seed(1)
            .build()
            .unwrap();

        for _ in 0..500 {
            workload.execute(Operation::UpdateLeaderboard).await.unwrap();
            for (player, score) in scores(&store).await {
                assert!((100.0..=300_000.0).contains(&score), "{player}: {score}");
            }
        }
    }

    async fn messages(store: &InMemoryStore) -> Vec<ChatMessage> {
        store
            .execute(Command::ListRange {
                key: keys::MESSAGES.into(),
                start: 0,
                stop: -1,
            })
            .await
            .unwrap()
            .into_list("LRANGE")
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn message_list_stays_capped() {
        let store = InMemoryStore::new();
        let config = SimulationConfig {
            message_cap: 5,
            ..Default::default()
        };
        let mut workload = workload(&store, config);

        for _ in 0..100 {
            workload.execute(Operation::PostMessage).await.unwrap();
            assert!(messages(&store).await.len() <= 5);
        }
        assert_eq!(messages(&store).await.len(), 5);
    }

    #[tokio::test]
    async fn message_list_is_newest_first() {
        let store = InMemoryStore::new();
        let config = SimulationConfig {
            message_cap: 5,
            ..Default::default()
        };
        let mut workload = workload(&store, config);

        for i in 0..12 {
            let message = ChatMessage::new("Ice_Queen", &format!("message {i}"), MessageKind::Chat);
            workload.push_message(message).await.unwrap();
        }

        let texts: Vec<_> = messages(&store)
            .await
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(
            texts,
            ["message 11", "message 10", "message 9", "message 8", "message 7"]
        );
    }

    #[tokio::test]
    async fn every_operation_succeeds() {
        let store = InMemoryStore::new();
        let mut workload = workload(&store, SimulationConfig::default());

        for operation in Operation::ALL {
            for _ in 0..50 {
                workload.execute(operation).await.unwrap();
            }
        }

        for prefix in [
            "leaderboard:",
            "user:session:",
            "temp:",
            "analytics:realtime:",
            "cache:rapid:",
            "cache:update:",
        ] {
            assert!(
                !store.keys_with_prefix(prefix).is_empty(),
                "no keys under {prefix}"
            );
        }
    }

    #[tokio::test]
    async fn ephemeral_keys_expire_within_their_band() {
        let store = InMemoryStore::new();
        let config = SimulationConfig::default();
        let ttls = config.ttls.clone();
        let mut workload = workload(&store, config);

        for _ in 0..50 {
            workload.execute(Operation::CacheSet).await.unwrap();
            workload.execute(Operation::CacheUpdate).await.unwrap();
            workload.execute(Operation::UpdateAnalytics).await.unwrap();
        }

        for (prefix, band) in [
            ("cache:rapid:", ttls.rapid_cache),
            ("cache:update:", ttls.cache_update),
            ("analytics:realtime:", ttls.realtime_analytics),
        ] {
            for key in store.keys_with_prefix(prefix) {
                let ttl = store.ttl(&key).unwrap();
                assert!(band.contains(ttl), "{key}: {ttl:?}");
            }
        }
    }

    #[tokio::test]
    async fn session_updates_increment_games_played() {
        let store = InMemoryStore::new();
        let roster: Arc<[String]> = catalog::roster(2).into();
        let mut workload = Workload::builder(
            Arc::new(store.clone()),
            Arc::new(SimulationConfig::default()),
            Arc::clone(&roster),
        )
        .build()
        .unwrap();

        for _ in 0..20 {
            workload.execute(Operation::UpdateSession).await.unwrap();
        }

        let mut total = 0;
        for player in roster.iter() {
            let key = keys::session(player);
            let reply = store
                .execute(Command::HashIncrBy {
                    key: key.clone(),
                    field: "games_played".into(),
                    delta: 0,
                })
                .await
                .unwrap();
            let Reply::Int(games) = reply else {
                panic!("unexpected reply {reply}");
            };
            total += games;
            if games > 0 {
                assert!(store.ttl(&key).is_some());
            }
        }
        assert!((20..=60).contains(&total), "{total}");
    }

    #[test]
    fn zero_weights_disable_operations() {
        let store = InMemoryStore::new();
        let config = SimulationConfig {
            weights: OperationWeights {
                update_leaderboard: 0,
                post_message: 0,
                update_session: 0,
                player_activity: 0,
                create_ephemeral: 0,
                update_analytics: 0,
                cache_set: 0,
                cache_get: 1,
                cache_update: 0,
                ttl_churn: 0,
            },
            ..Default::default()
        };
        let mut workload = workload(&store, config);

        for _ in 0..100 {
            assert_eq!(workload.next_operation(), Operation::CacheGet);
        }
    }

    #[test]
    fn tiny_roster_is_rejected() {
        let roster: Arc<[String]> = catalog::roster(1).into();
        let result = Workload::builder(
            Arc::new(InMemoryStore::new()),
            Arc::new(SimulationConfig::default()),
            roster,
        )
        .build();
        assert!(matches!(result, Err(SimError::Config(_))));
    }
}
