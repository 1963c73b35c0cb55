//! Tapedeck command-line player.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = tapedeck::cli::Cli::parse();

    // Initialize logging; stdout carries the status line
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tapedeck=info")))
        .init();

    tapedeck::cli::run_command(&args)?;
    Ok(())
}
