use std::env;
use std::io::IsTerminal;

use secrecy::ExposeSecret;
use sentry::integrations::tracing as sentry_tracing;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::config::{Config, LogFormat};

/// Crates whose spans and events are kept below `INFO`.
const VERBOSE_CRATES: &str = "INFO,arenaload_server=TRACE,arenaload_sim=TRACE,arenaload_store=TRACE";

pub fn init_sentry(config: &Config) -> Option<sentry::ClientInitGuard> {
    let sentry_config = &config.sentry;
    let dsn = sentry_config.dsn.as_ref()?;

    Some(sentry::init(sentry::ClientOptions {
        dsn: dsn.expose_secret().as_str().parse().ok(),
        release: sentry::release_name!(),
        environment: sentry_config.environment.clone(),
        server_name: sentry_config.server_name.clone(),
        sample_rate: sentry_config.sample_rate,
        traces_sample_rate: sentry_config.traces_sample_rate,
        debug: sentry_config.debug,
        ..Default::default()
    }))
}

pub fn init_tracing(config: &Config) {
    // Errors become events, warnings and info messages are attached as breadcrumbs.
    let sentry_layer = config.sentry.is_enabled().then(|| {
        sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
            Level::ERROR => sentry_tracing::EventFilter::Event,
            Level::WARN | Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
            Level::DEBUG | Level::TRACE => sentry_tracing::EventFilter::Ignore,
        })
    });

    let (level, env_filter) = parse_rust_log(config.logging.level);
    let format = format_layer(config.logging.format);

    tracing_subscriber::registry()
        .with(format.with_filter(level))
        .with(sentry_layer)
        .with(env_filter)
        .init();
}

fn format_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Simplified => layer.compact().with_target(false).boxed(),
        LogFormat::Auto if std::io::stderr().is_terminal() => layer.pretty().boxed(),
        LogFormat::Auto => layer.compact().with_target(false).boxed(),
    }
}

/// Resolves the effective level and filter.
///
/// A `RUST_LOG` that parses as a plain level overrides the configured level. Anything else is used
/// literally as a filter directive.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    (level, EnvFilter::new(VERBOSE_CRATES))
}
