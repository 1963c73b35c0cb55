//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `play`: interactive playback of a queue of tracks
//! - `info`: track length and frame geometry
//! - `system`: output devices and configuration

mod info;
mod play;
mod system;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use info::cmd_info;
pub use play::cmd_play;
pub use system::{cmd_config, cmd_devices};

use crate::config::{self, Config};
use crate::error::{Result, ResultExt};

/// Tapedeck CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "TAPEDECK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Play one or more tracks in order
    Play {
        /// Paths of the tracks to play
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Output device name (substring match)
        #[arg(short, long, env = "TAPEDECK_DEVICE")]
        device: Option<String>,
        /// Start this many seconds into the first track
        #[arg(long)]
        start_at: Option<f64>,
    },
    /// Show length and frame geometry of a track
    Info {
        /// Path to the audio file
        path: PathBuf,
    },
    /// List audio output devices
    Devices,
    /// Show the config file, writing defaults if it doesn't exist
    Config {
        /// Overwrite the config file with defaults
        #[arg(long)]
        reset: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Play {
            paths,
            device,
            start_at,
        } => {
            let mut config = load_config(cli)?;
            if let Some(device) = device {
                config.audio.output_device = device.clone();
            }
            cmd_play(paths, &config, *start_at)
        }
        Commands::Info { path } => cmd_info(path),
        Commands::Devices => {
            let config = load_config(cli)?;
            cmd_devices(&config);
            Ok(())
        }
        Commands::Config { reset } => cmd_config(cli.config.as_deref(), *reset),
    }
}

/// An explicit `--config` must parse; the default location falls back to defaults.
fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => config::load_from(path).with_context("cannot use --config"),
        None => Ok(config::load()),
    }
}
