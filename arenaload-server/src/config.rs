//! Configuration for the arenaload server.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `ARENA__`)
//! 2. Legacy `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD` and `REDIS_DB` variables
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `ARENA__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `ARENA__HTTP_ADDR=0.0.0.0:8080` sets the HTTP server address
//! - `ARENA__STORE__TYPE=memory` runs against the in-process store
//! - `ARENA__SIMULATION__WORKERS=16` sets the worker pool size
//!
//! # YAML Configuration File
//!
//! ```yaml
//! http_addr: 0.0.0.0:8080
//!
//! store:
//!   type: redis
//!   host: redis.internal
//!   pool_size: 20
//!
//! simulation:
//!   workers: 16
//!   pause:
//!     min: 5ms
//!     max: 20ms
//! ```

use std::borrow::Cow;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use arenaload_sim::{DatasetConfig, ProbeConfig, SimulationConfig};
use arenaload_store::RedisConfig;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "ARENA__";

/// Flat variables understood for compatibility with existing deployments.
const LEGACY_STORE_VARS: [&str; 3] = ["REDIS_HOST", "REDIS_PORT", "REDIS_DB"];

/// Secrets taken verbatim from the environment, lowest precedence first.
///
/// `Env` parses values, so a password like `123456` would arrive as a number.
const SECRET_VARS: [(&str, &str); 3] = [
    ("REDIS_PASSWORD", "store.password"),
    ("ARENA__STORE__PASSWORD", "store.password"),
    ("ARENA__SENTRY__DSN", "sentry.dsn"),
];

/// Newtype around `String` that may protect against accidental
/// logging of secrets in our configuration struct. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Store backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Store {
    /// A Redis-compatible server (type `"redis"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// store:
    ///   type: redis
    ///   host: localhost
    ///   port: 6379
    ///   password: hunter2
    /// ```
    Redis {
        host: String,
        port: u16,
        /// Password for `AUTH`. Redacted in debug output.
        ///
        /// # Environment Variables
        ///
        /// - `ARENA__STORE__PASSWORD`
        /// - `REDIS_PASSWORD`
        password: Option<SecretBox<ConfigSecret>>,
        /// Logical database index.
        database: i64,
        /// Number of connections opened at startup and shared by all workers.
        pool_size: usize,
        #[serde(with = "humantime_serde")]
        connect_timeout: Duration,
        /// Maximum wait for a free pooled connection.
        #[serde(with = "humantime_serde")]
        acquire_timeout: Duration,
        /// Maximum duration of one command or batch.
        #[serde(with = "humantime_serde")]
        command_timeout: Duration,
    },

    /// An in-process store (type `"memory"`).
    ///
    /// Data is lost when the process exits. Useful for dry runs and local development.
    Memory,
}

impl Default for Store {
    fn default() -> Self {
        let defaults = RedisConfig::default();
        Self::Redis {
            host: defaults.host,
            port: defaults.port,
            password: None,
            database: defaults.database,
            pool_size: defaults.pool_size,
            connect_timeout: defaults.connect_timeout,
            acquire_timeout: defaults.acquire_timeout,
            command_timeout: defaults.command_timeout,
        }
    }
}

impl Store {
    /// Returns the Redis connection parameters, or `None` for the in-memory store.
    pub fn redis_config(&self) -> Option<RedisConfig> {
        match self {
            Self::Redis {
                host,
                port,
                password,
                database,
                pool_size,
                connect_timeout,
                acquire_timeout,
                command_timeout,
            } => Some(RedisConfig {
                host: host.clone(),
                port: *port,
                password: password
                    .as_ref()
                    .map(|secret| secret.expose_secret().as_str().to_owned()),
                database: *database,
                pool_size: *pool_size,
                connect_timeout: *connect_timeout,
                acquire_timeout: *acquire_timeout,
                command_timeout: *command_timeout,
            }),
            Self::Memory => None,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the server runtime.
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `ARENA__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// [Sentry](https://sentry.io/) error reporting configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN. When `None`, Sentry integration is disabled.
    ///
    /// # Environment Variable
    ///
    /// `ARENA__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name for this deployment, e.g. `"staging"`.
    pub environment: Option<Cow<'static, str>>,

    /// Server name or identifier, usually the hostname.
    pub server_name: Option<Cow<'static, str>>,

    /// Error event sampling rate between `0.0` and `1.0`.
    pub sample_rate: f32,

    /// Performance trace sampling rate between `0.0` and `1.0`.
    pub traces_sample_rate: f32,

    /// Enables debug output of the Sentry SDK.
    pub debug: bool,
}

impl Sentry {
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.01,
            debug: false,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty output on a terminal, simplified output otherwise.
    Auto,

    /// Multi-line output with colors and source locations.
    Pretty,

    /// One line per event without the target.
    Simplified,

    /// One JSON object per line.
    Json,
}

#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. `RUST_LOG` takes precedence when set.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum level to log, e.g. `info` or `debug`.
    ///
    /// # Environment Variable
    ///
    /// `ARENA__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// # Environment Variable
    ///
    /// `ARENA__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the arenaload server.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Address the JSON control surface listens on.
    ///
    /// # Default
    ///
    /// `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// Store backend.
    ///
    /// # Default
    ///
    /// Redis on `localhost:6379`.
    pub store: Store,

    /// Workload shape and lifecycle timings.
    pub simulation: SimulationConfig,

    /// Shape of the baseline dataset written by `load`.
    pub dataset: DatasetConfig,

    /// Defaults for the `probe` subcommand.
    pub probe: ProbeConfig,

    pub runtime: Runtime,

    pub logging: Logging,

    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5000)),
            store: Store::default(),
            simulation: SimulationConfig::default(),
            dataset: DatasetConfig::default(),
            probe: ProbeConfig::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration from all sources.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(legacy_store_env())
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(secret_env())
            .extract()?;

        config
            .simulation
            .validate()
            .context("invalid simulation config")?;
        config.dataset.validate().context("invalid dataset config")?;
        config.probe.validate().context("invalid probe config")?;

        Ok(config)
    }
}

/// Maps `REDIS_*` variables onto the `store` section.
fn legacy_store_env() -> Env {
    Env::raw().only(&LEGACY_STORE_VARS).map(|key| {
        let field = match key.as_str().to_ascii_uppercase().as_str() {
            "REDIS_HOST" => "host",
            "REDIS_PORT" => "port",
            "REDIS_DB" => "database",
            _ => return key.into(),
        };
        format!("store.{field}").into()
    })
}

/// Reads [`SECRET_VARS`] as plain strings.
///
/// The prefixed variable wins over the legacy one since it is merged later.
fn secret_env() -> figment::Figment {
    SECRET_VARS
        .iter()
        .filter_map(|(var, key)| Some((*key, std::env::var(var).ok()?)))
        .fold(figment::Figment::new(), |figment, (key, value)| {
            figment.merge(Serialized::default(key, value))
        })
}
