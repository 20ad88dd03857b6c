use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use arenaload_sim::{Probe, ProbeMode, Simulation};
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::{observability, state, web};

/// Synthetic game workload for Redis-compatible stores.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Load(LoadCommand),
    Probe(ProbeCommand),
    Version(VersionCommand),
}

/// serve the control surface and resume a previous simulation run
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// replace the baseline dataset and exit
///
/// This does not check whether another process is currently running a simulation against the
/// same store.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "load")]
struct LoadCommand {}

/// drive a fixed-rate probe workload until interrupted
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "probe")]
struct ProbeCommand {
    /// traffic mode: ping, read, write, mixed or complex
    #[argh(option, short = 'm')]
    mode: Option<ProbeMode>,

    /// target operations per second
    #[argh(option)]
    ops: Option<u32>,

    /// key prefix
    #[argh(option)]
    prefix: Option<String>,

    /// region name embedded in keys
    #[argh(option)]
    region: Option<String>,

    /// stop after this many seconds instead of waiting for a signal
    #[argh(option, short = 'd')]
    duration: Option<u64>,
}

/// print the arenaload version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("arenaload {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;

    // Sentry should be initialized before creating the async runtime.
    let _sentry_guard = observability::init_sentry(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads.max(1))
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(RunCommand {}) => web::server(config).await,
            Command::Load(LoadCommand {}) => load(config).await,
            Command::Probe(command) => probe(config, command).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

async fn load(config: Config) -> Result<()> {
    let store = state::connect(&config.store).await?;
    let simulation = Simulation::new(store, config.simulation, config.dataset)?;

    let summary = simulation.load().await?;
    tracing::info!(
        players = summary.players,
        commands = summary.commands,
        total_keys = summary.total_keys,
        "dataset ready"
    );

    Ok(())
}

async fn probe(config: Config, command: ProbeCommand) -> Result<()> {
    let mut probe_config = config.probe;
    if let Some(mode) = command.mode {
        probe_config.mode = mode;
    }
    if let Some(ops) = command.ops {
        probe_config.ops_per_second = ops;
    }
    if let Some(prefix) = command.prefix {
        probe_config.key_prefix = prefix;
    }
    if let Some(region) = command.region {
        probe_config.region = region;
    }

    let store = state::connect(&config.store).await?;
    let probe = Probe::new(store, probe_config)?;

    let token = CancellationToken::new();
    let handle = tokio::spawn(probe.run(token.clone()));

    let departure = elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint();
    match command.duration {
        Some(secs) => {
            // Elapsing is a regular stop, not an error.
            let _ = tokio::time::timeout(Duration::from_secs(secs), departure).await;
        }
        None => departure.await,
    }

    token.cancel();
    let report = handle.await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
