//! A fixed-rate connectivity probe, independent of the simulation.
//!
//! The probe issues one operation per tick against its own key namespace and reports throughput
//! and error counts periodically. It is meant to watch a store while it is being migrated or
//! failed over.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use arenaload_store::{Command, SharedStore};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{SimError, SimResult};

const KEY_SPACE: u32 = 10_000;
const USER_SPACE: u32 = 1_000;
const VALUE_LEN: usize = 100;
const VALUE_TTL: Duration = Duration::from_secs(300);
const ACTIVITY_CAP: isize = 100;
/// Keeps the tick period at one microsecond or longer.
const MAX_OPS_PER_SECOND: u32 = 1_000_000;

/// The kind of traffic the probe generates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    Ping,
    Read,
    Write,
    /// 80% reads, 20% writes.
    #[default]
    Mixed,
    /// A pipeline touching a counter, a sorted set and a capped list.
    Complex,
}

impl ProbeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Read => "read",
            Self::Write => "write",
            Self::Mixed => "mixed",
            Self::Complex => "complex",
        }
    }
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ping" => Ok(Self::Ping),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "mixed" => Ok(Self::Mixed),
            "complex" => Ok(Self::Complex),
            other => Err(SimError::Config(format!("unknown probe mode `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub mode: ProbeMode,
    pub ops_per_second: u32,
    pub key_prefix: String,
    /// Part of every key, so probes in different regions do not collide.
    pub region: String,
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub error_backoff: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            mode: ProbeMode::Mixed,
            ops_per_second: 100,
            key_prefix: "test".into(),
            region: "local".into(),
            report_interval: Duration::from_secs(10),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.ops_per_second == 0 {
            return Err(SimError::Config("ops_per_second must be at least 1".into()));
        }
        if self.ops_per_second > MAX_OPS_PER_SECOND {
            return Err(SimError::Config(format!(
                "ops_per_second must be at most {MAX_OPS_PER_SECOND}"
            )));
        }
        if self.report_interval.is_zero() {
            return Err(SimError::Config("report_interval must be positive".into()));
        }
        Ok(())
    }
}

/// Totals of a probe run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProbeReport {
    pub reads: u64,
    pub writes: u64,
    pub errors: u64,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub ops_per_second: f64,
}

impl ProbeReport {
    fn finish(&mut self, started: Instant) {
        self.elapsed = started.elapsed();
        let secs = self.elapsed.as_secs_f64();
        self.ops_per_second = if secs > 0.0 {
            (self.reads + self.writes) as f64 / secs
        } else {
            0.0
        };
    }
}

#[derive(Debug)]
pub struct Probe {
    store: SharedStore,
    config: ProbeConfig,
    rng: SmallRng,
}

impl Probe {
    pub fn new(store: SharedStore, config: ProbeConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            rng: SmallRng::seed_from_u64(rand::random()),
        })
    }

    /// Runs until the token is cancelled and returns the totals.
    pub async fn run(mut self, token: CancellationToken) -> ProbeReport {
        let period = Duration::from_secs(1) / self.config.ops_per_second;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let report_every = self.config.report_interval;
        let mut reporter = tokio::time::interval_at(Instant::now() + report_every, report_every);
        reporter.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            mode = %self.config.mode,
            ops_per_second = self.config.ops_per_second,
            prefix = %self.config.key_prefix,
            region = %self.config.region,
            "probe started"
        );

        let started = Instant::now();
        let mut report = ProbeReport::default();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = reporter.tick() => {
                    report.finish(started);
                    tracing::info!(
                        reads = report.reads,
                        writes = report.writes,
                        errors = report.errors,
                        ops_per_second = report.ops_per_second,
                        "probe progress"
                    );
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.step(&mut report).await {
                Ok(()) => {}
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(error = &err as &dyn std::error::Error, "probe operation failed");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        report.finish(started);
        tracing::info!(
            reads = report.reads,
            writes = report.writes,
            errors = report.errors,
            elapsed = ?report.elapsed,
            "probe stopped"
        );
        report
    }

    async fn step(&mut self, report: &mut ProbeReport) -> SimResult<()> {
        match self.config.mode {
            ProbeMode::Ping => {
                self.store.execute(Command::Ping).await?;
                report.reads += 1;
            }
            ProbeMode::Read => self.read(report).await?,
            ProbeMode::Write => self.write(report).await?,
            ProbeMode::Mixed => {
                if self.rng.random_bool(0.8) {
                    self.read(report).await?;
                } else {
                    self.write(report).await?;
                }
            }
            ProbeMode::Complex => self.complex(report).await?,
        }
        Ok(())
    }

    fn key(&mut self) -> String {
        let slot = self.rng.random_range(1..=KEY_SPACE);
        format!("{}:{}:{slot}", self.config.key_prefix, self.config.region)
    }

    async fn read(&mut self, report: &mut ProbeReport) -> SimResult<()> {
        let key = self.key();
        self.store.execute(Command::get(key)).await?;
        report.reads += 1;
        Ok(())
    }

    async fn write(&mut self, report: &mut ProbeReport) -> SimResult<()> {
        let key = self.key();
        let value = (&mut self.rng)
            .sample_iter(rand::distr::Alphanumeric)
            .take(VALUE_LEN)
            .map(char::from)
            .collect::<String>();
        self.store
            .execute(Command::set_ex(key, value, VALUE_TTL))
            .await?;
        report.writes += 1;
        Ok(())
    }

    async fn complex(&mut self, report: &mut ProbeReport) -> SimResult<()> {
        let prefix = &self.config.key_prefix;
        let user = self.rng.random_range(1..=USER_SPACE);
        let activity = format!("{prefix}:activity:{user}");

        let commands = vec![
            Command::Incr {
                key: format!("{prefix}:pageviews:{user}"),
            },
            Command::SortedSetIncrBy {
                key: format!("{prefix}:leaderboard"),
                member: format!("user:{user}"),
                delta: 1.0,
            },
            Command::ListPush {
                key: activity.clone(),
                value: humantime::format_rfc3339_millis(std::time::SystemTime::now()).to_string(),
            },
            Command::ListTrim {
                key: activity,
                start: 0,
                stop: ACTIVITY_CAP - 1,
            },
        ];
        let count = commands.len() as u64;

        self.store.pipeline(commands).await?;
        report.writes += count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arenaload_store::{InMemoryStore, Reply, Store};

    use super::*;

    async fn run_for(store: &InMemoryStore, config: ProbeConfig, duration: Duration) -> ProbeReport {
        let probe = Probe::new(Arc::new(store.clone()), config).unwrap();
        run_until(probe, duration).await
    }

    async fn run_until(probe: Probe, duration: Duration) -> ProbeReport {
        let token = CancellationToken::new();
        let handle = tokio::spawn(probe.run(token.clone()));

        tokio::time::sleep(duration).await;
        token.cancel();
        handle.await.unwrap()
    }

    #[test]
    fn parses_modes() {
        assert_eq!("complex".parse::<ProbeMode>().unwrap(), ProbeMode::Complex);
        assert_eq!("PING".parse::<ProbeMode>().unwrap(), ProbeMode::Ping);
        assert!("bogus".parse::<ProbeMode>().is_err());
    }

    #[test]
    fn rejects_zero_rate() {
        let config = ProbeConfig {
            ops_per_second: 0,
            ..Default::default()
        };
        assert!(Probe::new(Arc::new(InMemoryStore::new()), config).is_err());
    }

    #[test]
    fn rejects_sub_microsecond_period() {
        let config = ProbeConfig {
            ops_per_second: 2_000_000_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(Probe::new(Arc::new(InMemoryStore::new()), config).is_err());

        let fastest = ProbeConfig {
            ops_per_second: MAX_OPS_PER_SECOND,
            ..Default::default()
        };
        assert!(fastest.validate().is_ok());
        assert!(!(Duration::from_secs(1) / fastest.ops_per_second).is_zero());
    }

    #[tokio::test(start_paused = true)]
    async fn read_mode_only_reads() {
        let store = InMemoryStore::new();
        let config = ProbeConfig {
            mode: ProbeMode::Read,
            ops_per_second: 10,
            ..Default::default()
        };

        let report = run_for(&store, config, Duration::from_millis(1050)).await;
        assert_eq!(report.reads, 11);
        assert_eq!(report.writes, 0);
        assert_eq!(report.errors, 0);
        assert!(store.keys_with_prefix("test:").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_mode_reads_four_times_as_often() {
        let store = InMemoryStore::new();
        let config = ProbeConfig {
            mode: ProbeMode::Mixed,
            ops_per_second: 100,
            report_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let mut probe = Probe::new(Arc::new(store.clone()), config).unwrap();
        probe.rng = SmallRng::seed_from_u64(7);

        let report = run_until(probe, Duration::from_millis(20_005)).await;
        let total = report.reads + report.writes;
        assert!((1990..=2010).contains(&total), "{total}");
        assert_eq!(report.errors, 0);

        let read_share = report.reads as f64 / total as f64;
        assert!((0.75..=0.85).contains(&read_share), "{read_share}");
        assert!(!store.keys_with_prefix("test:local:").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn write_mode_paces_and_expires() {
        let store = InMemoryStore::new();
        let config = ProbeConfig {
            mode: ProbeMode::Write,
            ops_per_second: 10,
            ..Default::default()
        };

        let report = run_for(&store, config, Duration::from_millis(1050)).await;
        assert_eq!(report.reads, 0);
        assert_eq!(report.errors, 0);
        // Ticks at 0ms, 100ms, .., 1000ms.
        assert_eq!(report.writes, 11);

        let keys = store.keys_with_prefix("test:local:");
        assert!(!keys.is_empty());
        for key in keys {
            assert!(store.ttl(&key).unwrap() <= VALUE_TTL);
            match store.execute(Command::get(&key)).await.unwrap() {
                Reply::Text(value) => {
                    assert_eq!(value.len(), VALUE_LEN);
                    assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
                }
                other => panic!("unexpected reply {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn complex_mode_counts_four_writes() {
        let store = InMemoryStore::new();
        let config = ProbeConfig {
            mode: ProbeMode::Complex,
            ops_per_second: 10,
            key_prefix: "probe".into(),
            ..Default::default()
        };

        let report = run_for(&store, config, Duration::from_millis(450)).await;
        assert_eq!(report.writes, 4 * 5);
        assert!(store.contains("probe:leaderboard"));

        let ranked = store
            .execute(Command::SortedSetRevRange {
                key: "probe:leaderboard".into(),
                start: 0,
                stop: -1,
                with_scores: true,
            })
            .await
            .unwrap()
            .into_scored("ZREVRANGE")
            .unwrap();
        let total: f64 = ranked.iter().map(|(_, score)| score).sum();
        assert_eq!(total, 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_back_off() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        let config = ProbeConfig {
            mode: ProbeMode::Ping,
            ops_per_second: 100,
            ..Default::default()
        };

        let report = run_for(&store, config, Duration::from_millis(2500)).await;
        assert_eq!(report.reads, 0);
        // Failures at 0s, 1s and 2s, each followed by a one second backoff.
        assert_eq!(report.errors, 3);
    }
}
