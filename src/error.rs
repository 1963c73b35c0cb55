//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`
//! ([`PlayerError`], [`ConfigError`]); this module aggregates them for the
//! CLI commands. `main` hands the result to `anyhow` at the binary edge.
//!
//! # Example
//!
//! ```ignore
//! use tapedeck::error::{Result, ResultExt};
//!
//! fn inspect(path: &Path) -> Result<Track> {
//!     Track::open(&SymphoniaSource, path).with_context("cannot inspect track")
//! }
//! ```

use crate::config::ConfigError;
use crate::player::PlayerError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File or thread I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Playback engine error
    #[error("Playback error: {0}")]
    Player(#[from] PlayerError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PlayerError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Player(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, ConfigError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Config(e).context(ctx))
    }
}
