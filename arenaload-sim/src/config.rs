//! Tunables for the workload and the dataset.
//!
//! These types are embedded in the server configuration and deserialize with defaults for every
//! field, so a partial YAML file or a single environment variable is enough to override one value.
//! Durations use humantime syntax such as `10ms` or `30m`.

use std::time::Duration;

use rand::Rng;
use rand::distr::uniform::SampleUniform;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// An inclusive range of integers to sample from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Band<T> {
    pub min: T,
    pub max: T,
}

impl<T> Band<T>
where
    T: SampleUniform + PartialOrd + Copy,
{
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        rng.random_range(self.min..=self.max)
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    fn check(&self, name: &str) -> SimResult<()> {
        if self.max < self.min {
            return Err(SimError::Config(format!("{name}: max is below min")));
        }
        Ok(())
    }
}

/// An inclusive range of durations to sample from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DurationBand {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl DurationBand {
    pub const fn from_secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    /// Samples with microsecond resolution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_micros() as u64;
        let max = self.max.as_micros() as u64;
        Duration::from_micros(rng.random_range(min..=max))
    }

    /// Samples whole seconds, as used for key expirations.
    pub fn sample_secs<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_secs(rng.random_range(self.min.as_secs()..=self.max.as_secs()))
    }

    pub fn contains(&self, value: Duration) -> bool {
        self.min <= value && value <= self.max
    }

    fn check(&self, name: &str) -> SimResult<()> {
        if self.max < self.min {
            return Err(SimError::Config(format!("{name}: max is below min")));
        }
        Ok(())
    }
}

/// Relative frequency of each workload operation.
///
/// Weights are relative to each other. A weight of `0` disables an operation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationWeights {
    pub update_leaderboard: u32,
    pub post_message: u32,
    pub update_session: u32,
    pub player_activity: u32,
    pub create_ephemeral: u32,
    pub update_analytics: u32,
    pub cache_set: u32,
    pub cache_get: u32,
    pub cache_update: u32,
    pub ttl_churn: u32,
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self {
            update_leaderboard: 1,
            post_message: 1,
            update_session: 1,
            player_activity: 1,
            create_ephemeral: 1,
            update_analytics: 1,
            cache_set: 1,
            cache_get: 1,
            cache_update: 1,
            ttl_churn: 1,
        }
    }
}

/// Expiration ranges for keys written by the workload.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadTtls {
    /// Refreshed on every session update.
    pub session: DurationBand,
    pub temp_lobby: DurationBand,
    pub temp_match: DurationBand,
    pub rapid_cache: DurationBand,
    pub cache_update: DurationBand,
    pub temp_session: DurationBand,
    pub temp_data: DurationBand,
    pub rate: DurationBand,
    pub temp_event: DurationBand,
    pub realtime_analytics: DurationBand,
    #[serde(with = "humantime_serde")]
    pub purchase: Duration,
}

impl Default for WorkloadTtls {
    fn default() -> Self {
        Self {
            session: DurationBand::from_secs(1800, 86400),
            temp_lobby: DurationBand::from_secs(300, 900),
            temp_match: DurationBand::from_secs(600, 1800),
            rapid_cache: DurationBand::from_secs(60, 300),
            cache_update: DurationBand::from_secs(30, 600),
            temp_session: DurationBand::from_secs(30, 300),
            temp_data: DurationBand::from_secs(10, 60),
            rate: DurationBand::from_secs(5, 30),
            temp_event: DurationBand::from_secs(60, 180),
            realtime_analytics: DurationBand::from_secs(1800, 7200),
            purchase: Duration::from_secs(86400),
        }
    }
}

/// Configuration of a simulation run.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of concurrent workers. Fixed for the duration of a run.
    pub workers: usize,
    /// Operations per worker batch.
    pub batch_size: Band<usize>,
    /// Pause after every batch.
    pub pause: DurationBand,
    /// Pause after a batch aborted by a connectivity failure.
    #[serde(with = "humantime_serde")]
    pub error_backoff: Duration,
    pub weights: OperationWeights,
    /// Leaderboard scores are clamped into this range after every update.
    pub score_bounds: Band<i64>,
    /// Maximum length of the message list.
    pub message_cap: usize,
    #[serde(with = "humantime_serde")]
    pub counter_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,
    /// How long `stop` waits for each task before abandoning it.
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    /// Resume a previous run found in the store when the process starts.
    pub auto_resume: bool,
    pub ttls: WorkloadTtls,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            batch_size: Band::new(8, 15),
            pause: DurationBand::from_millis(1, 10),
            error_backoff: Duration::from_millis(100),
            weights: OperationWeights::default(),
            score_bounds: Band::new(100, 50_000_000),
            message_cap: 50,
            counter_interval: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(2),
            auto_resume: true,
            ttls: WorkloadTtls::default(),
        }
    }
}

impl SimulationConfig {
    /// Rejects inverted ranges and values that would stall the workload.
    pub fn validate(&self) -> SimResult<()> {
        if self.workers == 0 {
            return Err(SimError::Config("workers must be at least 1".into()));
        }
        if self.message_cap == 0 {
            return Err(SimError::Config("message_cap must be at least 1".into()));
        }
        if self.counter_interval.is_zero() || self.monitor_interval.is_zero() {
            return Err(SimError::Config("task intervals must be positive".into()));
        }
        if self.batch_size.min == 0 {
            return Err(SimError::Config("batch_size must be at least 1".into()));
        }

        let w = &self.weights;
        let total = [
            w.update_leaderboard,
            w.post_message,
            w.update_session,
            w.player_activity,
            w.create_ephemeral,
            w.update_analytics,
            w.cache_set,
            w.cache_get,
            w.cache_update,
            w.ttl_churn,
        ]
        .iter()
        .map(|w| u64::from(*w))
        .sum::<u64>();
        if total == 0 {
            return Err(SimError::Config("at least one operation weight must be positive".into()));
        }

        self.batch_size.check("batch_size")?;
        self.pause.check("pause")?;
        self.score_bounds.check("score_bounds")?;

        let t = &self.ttls;
        t.session.check("ttls.session")?;
        t.temp_lobby.check("ttls.temp_lobby")?;
        t.temp_match.check("ttls.temp_match")?;
        t.rapid_cache.check("ttls.rapid_cache")?;
        t.cache_update.check("ttls.cache_update")?;
        t.temp_session.check("ttls.temp_session")?;
        t.temp_data.check("ttls.temp_data")?;
        t.rate.check("ttls.rate")?;
        t.temp_event.check("ttls.temp_event")?;
        t.realtime_analytics.check("ttls.realtime_analytics")?;

        Ok(())
    }
}

/// Expiration ranges for keys written by the dataset load.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetTtls {
    pub session: DurationBand,
    pub cache_item: DurationBand,
    pub lobby: DurationBand,
    pub rate_limit: DurationBand,
    pub achievement: DurationBand,
    pub analytics_event: DurationBand,
    pub notification: DurationBand,
}

impl Default for DatasetTtls {
    fn default() -> Self {
        Self {
            session: DurationBand::from_secs(1800, 86400),
            cache_item: DurationBand::from_secs(300, 3600),
            lobby: DurationBand::from_secs(600, 1800),
            rate_limit: DurationBand::from_secs(60, 300),
            achievement: DurationBand::from_secs(86400, 604800),
            analytics_event: DurationBand::from_secs(3600, 259200),
            notification: DurationBand::from_secs(86400, 604800),
        }
    }
}

/// Size and shape of the baseline dataset.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Leaderboard size. Also the roster the workload picks players from.
    pub players: usize,
    pub cache_items: usize,
    pub lobbies: usize,
    /// Players with a counter for every rate-limited endpoint.
    pub rate_limited_players: usize,
    pub achievement_players: usize,
    pub achievements_per_player: Band<usize>,
    pub analytics_events: usize,
    pub notification_players: usize,
    pub notifications_per_player: Band<usize>,
    pub ttls: DatasetTtls,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            players: 100,
            cache_items: 2000,
            lobbies: 500,
            rate_limited_players: 50,
            achievement_players: 80,
            achievements_per_player: Band::new(3, 12),
            analytics_events: 1000,
            notification_players: 60,
            notifications_per_player: Band::new(1, 5),
            ttls: DatasetTtls::default(),
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.players < 2 {
            return Err(SimError::Config("players must be at least 2".into()));
        }

        self.achievements_per_player.check("achievements_per_player")?;
        self.notifications_per_player.check("notifications_per_player")?;

        let t = &self.ttls;
        t.session.check("ttls.session")?;
        t.cache_item.check("ttls.cache_item")?;
        t.lobby.check("ttls.lobby")?;
        t.rate_limit.check("ttls.rate_limit")?;
        t.achievement.check("ttls.achievement")?;
        t.analytics_event.check("ttls.analytics_event")?;
        t.notification.check("ttls.notification")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimulationConfig::default().validate().unwrap();
        DatasetConfig::default().validate().unwrap();
    }

    #[test]
    fn inverted_band_is_rejected() {
        let config = SimulationConfig {
            pause: DurationBand::from_millis(10, 1),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pause"), "{err}");

        let config = DatasetConfig {
            ttls: DatasetTtls {
                lobby: DurationBand::from_secs(60, 30),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        let config = SimulationConfig {
            weights: OperationWeights {
                update_leaderboard: 0,
                post_message: 0,
                update_session: 0,
                player_activity: 0,
                create_ephemeral: 0,
                update_analytics: 0,
                cache_set: 0,
                cache_get: 0,
                cache_update: 0,
                ttl_churn: 0,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn samples_stay_in_band() {
        let mut rng = SmallRng::seed_from_u64(7);
        let pause = DurationBand::from_millis(1, 10);
        let ttl = DurationBand::from_secs(30, 300);
        let batch = Band::new(8usize, 15);

        for _ in 0..1000 {
            assert!(pause.contains(pause.sample(&mut rng)));
            let secs = ttl.sample_secs(&mut rng);
            assert!(ttl.contains(secs));
            assert_eq!(secs.subsec_nanos(), 0);
            assert!(batch.contains(batch.sample(&mut rng)));
        }
    }

    #[test]
    fn deserializes_partial_humantime() {
        let config: SimulationConfig = serde_json::from_value(serde_json::json!({
            "workers": 3,
            "pause": { "min": "2ms", "max": "20ms" },
            "ttls": { "rate": { "min": "1s", "max": "2s" } },
        }))
        .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.pause, DurationBand::from_millis(2, 20));
        assert_eq!(config.ttls.rate, DurationBand::from_secs(1, 2));
        assert_eq!(config.ttls.session, DurationBand::from_secs(1800, 86400));
        assert_eq!(config.message_cap, 50);
    }
}
