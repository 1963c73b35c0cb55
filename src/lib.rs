//! Tapedeck - continuous audio playback from the command line.
//!
//! The [`player`] module holds the playback engine: a track queue, a
//! streaming thread feeding the output device, seeking and level metering,
//! with playback events delivered to registered handlers.

pub mod cli;
pub mod config;
pub mod error;
pub mod player;
#[cfg(test)]
pub mod test_utils;
