//! Command-line interface for tapedeck.
//!
//! This module provides CLI commands for playing tracks, inspecting them,
//! listing output devices and managing the config file.

mod commands;

pub use commands::{Cli, Commands, run_command};
