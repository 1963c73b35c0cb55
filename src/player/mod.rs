//! Continuous audio playback with a track queue, seeking and level metering.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Player (control thread)                     │
//! │      load / queue / start / stop / toggle / seek / on(...)      │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ Mutex<EngineState> + Condvar
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Streaming thread (audio-stream)                │
//! │   pull chunk from current track → device, fire level/position,  │
//! │        advance the queue when a track runs out                  │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ bounded crossbeam channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  cpal callback (audio-device)                   │
//! │        drains chunks in real time, paces the stream thread      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The output device and the track decoder are traits ([`AudioOutput`],
//! [`TrackSource`]) so the engine can run against test doubles.

mod engine;

pub mod decoder;
pub mod events;
pub mod level;
pub mod output;
pub mod position;
pub mod queue;
pub mod state;
pub mod track;

pub use decoder::{ReadOutcome, SymphoniaSource, TrackDecoder, TrackSource};
pub use events::{EventKind, HandlerError, PlayerEvent};
pub use output::{AudioOutput, CpalOutput, PullStatus, default_output_device, list_output_devices};
pub use position::FrameGeometry;
pub use queue::TrackQueue;
pub use state::{PlaybackStatus, format_duration, format_seconds};
pub use track::Track;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, PlaybackConfig};
use engine::{Engine, StreamThread};

/// The audio player.
///
/// All methods take `&self` and may be called from any thread while the
/// streaming thread is running. Dropping the player stops playback, joins the
/// streaming thread and then releases the tracks and the output device.
pub struct Player {
    engine: Arc<Engine>,
    thread: StreamThread,
    source: Box<dyn TrackSource>,
    /// Default step for [`rewind`](Self::rewind) / [`forward`](Self::forward).
    seek_step: f64,
}

impl Player {
    /// Create a player over an already opened output device.
    pub fn new(
        output: Box<dyn AudioOutput>,
        source: Box<dyn TrackSource>,
        config: &PlaybackConfig,
    ) -> Self {
        Self {
            engine: Arc::new(Engine::new(output, config.chunk_samples)),
            thread: StreamThread::new(),
            source,
            seek_step: config.seek_step_secs,
        }
    }

    /// Open the configured cpal device and decode with symphonia.
    pub fn open(config: &Config) -> Result<Self, PlayerError> {
        let output = CpalOutput::open(&config.audio)?;
        Ok(Self::new(
            Box::new(output),
            Box::new(SymphoniaSource),
            &config.playback,
        ))
    }

    // ------------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------------

    /// Enqueue every path in order, then advance once.
    ///
    /// All paths are opened before anything is enqueued: if one fails, the
    /// error is returned and neither the queue nor the current track change.
    /// Audio still buffered in the device from the replaced track is dropped.
    pub fn load<I, P>(&self, paths: I) -> Result<(), PlayerError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let tracks = paths
            .into_iter()
            .map(|p| Track::open(self.source.as_ref(), p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if tracks.is_empty() {
            return Ok(());
        }

        let mut state = self.engine.state.lock();
        for track in tracks {
            state.queue.enqueue(track);
        }
        if let Some(current) = state.queue.advance() {
            tracing::info!(track = %current.name(), "loaded");
            self.engine.output.flush();
        }
        state.decode_errors = 0;
        Ok(())
    }

    /// Append one path to the end of the queue.
    pub fn queue(&self, path: impl AsRef<Path>) -> Result<(), PlayerError> {
        let track = Track::open(self.source.as_ref(), path.as_ref())?;
        tracing::debug!(track = %track.name(), "queued");
        self.engine.state.lock().queue.enqueue(track);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    /// Start playback if there is a current (or queued) track.
    ///
    /// Spawns the streaming thread on first use. Calling while playing is a no-op.
    pub fn start(&self) -> Result<(), PlayerError> {
        let playing = {
            let mut state = self.engine.state.lock();
            self.engine.start_locked(&mut state)?;
            state.status.is_playing()
        };
        if playing && self.thread.spawn_if_absent(&self.engine)? {
            tracing::debug!("streaming thread spawned");
        }
        Ok(())
    }

    /// Stop playback. The streaming thread parks until the next `start`.
    pub fn stop(&self) -> Result<(), PlayerError> {
        let mut state = self.engine.state.lock();
        self.engine.stop_locked(&mut state)
    }

    pub fn toggle(&self) -> Result<(), PlayerError> {
        if self.is_playing() {
            self.stop()
        } else {
            self.start()
        }
    }

    /// Jump to `seconds` into the current track.
    ///
    /// Out-of-range targets and calls with no track loaded are ignored. A
    /// successful seek drops audio buffered in the device and fires
    /// `PositionChange` with the new position.
    pub fn seek(&self, seconds: f64) {
        let position = {
            let mut state = self.engine.state.lock();
            let Some(track) = state.queue.current_mut() else {
                tracing::debug!(seconds, "seek ignored, nothing loaded");
                return;
            };
            let Some(target) = track.geometry().seek_target(seconds, track.length()) else {
                tracing::debug!(seconds, "seek out of range, ignored");
                return;
            };
            match track.seek(target) {
                Ok(()) => {
                    let position = track.position();
                    self.engine.output.flush();
                    position
                }
                Err(e @ PlayerError::SeekOutOfRange { .. }) => {
                    tracing::debug!(error = %e, "seek ignored");
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "seek failed");
                    return;
                }
            }
        };
        self.engine
            .events
            .trigger(PlayerEvent::PositionChange(position));
    }

    /// Seek back by the configured step.
    pub fn rewind(&self) {
        self.rewind_by(self.seek_step);
    }

    pub fn rewind_by(&self, seconds: f64) {
        self.seek(self.position() - seconds);
    }

    /// Seek ahead by the configured step.
    pub fn forward(&self) {
        self.forward_by(self.seek_step);
    }

    pub fn forward_by(&self, seconds: f64) {
        self.seek(self.position() + seconds);
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Position of the current track in seconds, `0.0` with nothing loaded.
    pub fn position(&self) -> f64 {
        self.engine
            .state
            .lock()
            .queue
            .current()
            .map(Track::position)
            .unwrap_or(0.0)
    }

    pub fn length_in_seconds(&self) -> f64 {
        self.engine
            .state
            .lock()
            .queue
            .current()
            .map(Track::length_in_seconds)
            .unwrap_or(0.0)
    }

    /// Read offset of the current track in samples.
    pub fn tell(&self) -> u64 {
        self.engine.state.lock().queue.current().map_or(0, Track::tell)
    }

    /// Length of the current track in samples.
    pub fn length(&self) -> u64 {
        self.engine.state.lock().queue.current().map_or(0, Track::length)
    }

    /// Mean absolute sample value of the last chunk played; `0.0` when stopped.
    pub fn level(&self) -> f32 {
        self.engine.state.lock().level
    }

    /// RMS of the last chunk handed to the device, if the device tracks one.
    pub fn output_rms(&self) -> Option<f32> {
        self.engine.output.rms()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.engine.state.lock().status
    }

    pub fn is_playing(&self) -> bool {
        self.status().is_playing()
    }

    /// Display name of the current track.
    pub fn current_track(&self) -> Option<String> {
        self.engine.state.lock().queue.current().map(Track::name)
    }

    /// Number of tracks waiting behind the current one.
    pub fn queued(&self) -> usize {
        self.engine.state.lock().queue.len()
    }

    /// Display names of the waiting tracks, in play order.
    pub fn queued_names(&self) -> Vec<String> {
        self.engine.state.lock().queue.pending_names()
    }

    /// Register an event handler. Handlers run on the streaming thread (or the
    /// caller's thread for `seek`) in registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.engine.events.on(kind, handler);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        tracing::debug!(streaming = self.engine.is_streaming(), "shutting down player");
        {
            let mut state = self.engine.state.lock();
            state.shutdown = true;
            if let Err(e) = self.engine.stop_locked(&mut state) {
                tracing::warn!(error = %e, "failed to stop output during shutdown");
            }
        }
        self.engine.wake.notify_all();
        self.engine.output.close();
        self.thread.join_and_clear();

        // Decoders go before the device; the device goes with the last Arc.
        self.engine.state.lock().queue.clear();
        tracing::debug!("player shut down");
    }
}

/// Player errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlayerError {
    #[error("Failed to open track {path}: {reason}")]
    TrackOpen { path: PathBuf, reason: String },

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Seek target {target} is outside the track (length {length})")]
    SeekOutOfRange { target: u64, length: u64 },

    #[error("Audio output initialization failed: {0}")]
    AudioInit(String),

    #[error("Audio device disconnected: {0}")]
    DeviceDisconnected(String),

    #[error("Audio channel closed")]
    ChannelClosed,
}

impl PlayerError {
    /// Create a track-open error.
    pub fn track_open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::TrackOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
