//! The arenaload command line.
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    arenaload_server::cli::execute()
}
