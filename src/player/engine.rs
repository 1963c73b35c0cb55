//! Streaming thread and the state it shares with the control side.
//!
//! # Locking
//!
//! `Engine::state` serializes the playback status and the track queue. The
//! streaming thread holds it only while pulling one chunk (so a `load` or
//! `seek` never observes a half-read track) and releases it before running
//! event handlers, so handlers may call back into the player.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::PlayerError;
use super::events::{EventBus, HandlerError, PlayerEvent};
use super::output::{AudioOutput, PullStatus};
use super::queue::TrackQueue;
use super::state::PlaybackStatus;
use super::track::Track;

/// Consecutive failed reads after which a track is treated as finished.
pub const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 32;

/// State guarded by [`Engine::state`].
#[derive(Debug, Default)]
pub struct EngineState {
    pub status: PlaybackStatus,
    pub queue: TrackQueue,
    /// Level of the last chunk played.
    pub level: f32,
    pub decode_errors: u32,
    pub shutdown: bool,
}

/// Result of one streaming-loop iteration.
#[derive(Debug)]
pub enum StepOutcome {
    /// A chunk was played and its events delivered.
    Played,
    /// Not playing; nothing was done.
    Idle,
    /// The current track ran out; `advanced` is whether a queued track took over.
    TrackEnded { advanced: bool },
    /// The chunk could not be decoded; position did not move.
    DecodeError(PlayerError),
    /// One or more event handlers panicked.
    HandlerError(Vec<HandlerError>),
    /// The output device is gone.
    Fatal(PlayerError),
}

/// Everything the control side and the streaming thread share.
pub struct Engine {
    pub state: Mutex<EngineState>,
    /// Signalled when the status changes or shutdown begins.
    pub wake: Condvar,
    pub output: Box<dyn AudioOutput>,
    pub events: EventBus,
    /// Interleaved samples pulled per iteration.
    pub chunk_samples: usize,
    /// A streaming thread is alive. Cleared under the state lock when the
    /// thread gives up, so a racing `start` always sees it gone.
    streaming: AtomicBool,
}

impl Engine {
    pub fn new(output: Box<dyn AudioOutput>, chunk_samples: usize) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            wake: Condvar::new(),
            output,
            events: EventBus::new(),
            chunk_samples: chunk_samples.max(1),
            streaming: AtomicBool::new(false),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// `Stopped → Playing` if there is something to play.
    ///
    /// With no current track, the head of the queue is promoted first.
    pub fn start_locked(&self, state: &mut EngineState) -> Result<(), PlayerError> {
        if state.status.is_playing() {
            return Ok(());
        }
        if state.queue.current().is_none() && state.queue.advance().is_none() {
            tracing::debug!("start ignored, nothing loaded");
            return Ok(());
        }

        self.output.start()?;
        state.status = PlaybackStatus::Playing;
        self.wake.notify_all();
        tracing::info!(
            track = %state.queue.current().map(Track::name).unwrap_or_default(),
            "playback started"
        );
        Ok(())
    }

    /// `Playing → Stopped`.
    pub fn stop_locked(&self, state: &mut EngineState) -> Result<(), PlayerError> {
        if !state.status.is_playing() {
            return Ok(());
        }
        state.status = PlaybackStatus::Stopped;
        state.level = 0.0;
        self.wake.notify_all();
        self.output.stop()?;
        tracing::info!("playback stopped");
        Ok(())
    }

    /// Park until playing or shutting down. Returns `false` on shutdown.
    fn wait_while_stopped(&self) -> bool {
        let mut state = self.state.lock();
        while !state.status.is_playing() && !state.shutdown {
            self.wake.wait(&mut state);
        }
        !state.shutdown
    }

    /// Run one iteration: pull a chunk into the device and fire its events.
    pub fn step(&self) -> StepOutcome {
        let mut state = self.state.lock();
        if !state.status.is_playing() {
            return StepOutcome::Idle;
        }
        let Some(track) = state.queue.current_mut() else {
            state.status = PlaybackStatus::Stopped;
            return StepOutcome::Idle;
        };

        let pulled = self.output.pull_and_play(track, self.chunk_samples);
        let position = track.position();

        match pulled {
            PullStatus::Played { level } => {
                state.level = level;
                state.decode_errors = 0;
                drop(state);

                let mut failures = self.events.trigger(PlayerEvent::Level(level));
                failures.extend(self.events.trigger(PlayerEvent::PositionChange(position)));
                if failures.is_empty() {
                    StepOutcome::Played
                } else {
                    StepOutcome::HandlerError(failures)
                }
            }
            PullStatus::TrackExhausted => {
                let advanced = self.finish_track(&mut state);
                drop(state);
                self.complete(advanced)
            }
            PullStatus::DecodeError(e) => {
                state.decode_errors += 1;
                if state.decode_errors < MAX_CONSECUTIVE_DECODE_ERRORS {
                    return StepOutcome::DecodeError(e);
                }
                tracing::error!(
                    error = %e,
                    attempts = state.decode_errors,
                    "track keeps failing to decode, skipping it"
                );
                let advanced = self.finish_track(&mut state);
                drop(state);
                self.complete(advanced)
            }
            PullStatus::Disconnected(e) => StepOutcome::Fatal(e),
        }
    }

    /// End-of-track transition. Returns whether a queued track took over.
    fn finish_track(&self, state: &mut EngineState) -> bool {
        let finished = state.queue.current().map(Track::name).unwrap_or_default();
        state.decode_errors = 0;

        match state.queue.advance() {
            Some(next) => {
                tracing::info!(finished = %finished, next = %next.name(), "advancing queue");
                if self.output.is_stopped()
                    && let Err(e) = self.output.start()
                {
                    tracing::warn!(error = %e, "failed to restart output for next track");
                }
                true
            }
            None => {
                tracing::info!(track = %finished, "queue finished");
                if let Err(e) = self.stop_locked(state) {
                    tracing::warn!(error = %e, "failed to stop output");
                }
                false
            }
        }
    }

    fn complete(&self, advanced: bool) -> StepOutcome {
        let failures = self.events.trigger(PlayerEvent::Complete);
        if failures.is_empty() {
            StepOutcome::TrackEnded { advanced }
        } else {
            StepOutcome::HandlerError(failures)
        }
    }

    /// Stop after a fatal error. The calling thread must exit right after.
    fn halt(&self) {
        let mut state = self.state.lock();
        state.status = PlaybackStatus::Stopped;
        state.level = 0.0;
        self.streaming.store(false, Ordering::Release);
        if let Err(e) = self.output.stop() {
            tracing::debug!(error = %e, "output stop after fatal error failed");
        }
    }
}

/// Body of the streaming thread.
fn run(engine: &Engine) {
    tracing::debug!("streaming thread started");
    loop {
        if !engine.wait_while_stopped() {
            break;
        }
        // Device-paced backpressure: the only intended blocking point.
        if !engine.output.wait_until_ready() {
            break;
        }

        match engine.step() {
            StepOutcome::Played | StepOutcome::Idle => {}
            StepOutcome::TrackEnded { advanced } => {
                tracing::debug!(advanced, "track ended");
            }
            StepOutcome::DecodeError(e) => {
                tracing::warn!(error = %e, "decode error, skipping chunk");
            }
            StepOutcome::HandlerError(failures) => {
                tracing::warn!(count = failures.len(), "event handlers failed");
            }
            StepOutcome::Fatal(e) => {
                tracing::error!(error = %e, "streaming stopped");
                engine.halt();
                return;
            }
        }
    }
    let _state = engine.state.lock();
    engine.streaming.store(false, Ordering::Release);
    tracing::debug!("streaming thread exiting");
}

/// Handle to the single streaming thread of a player.
#[derive(Default)]
pub struct StreamThread {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the streaming thread unless one is alive. Returns whether one was spawned.
    pub fn spawn_if_absent(&self, engine: &Arc<Engine>) -> Result<bool, PlayerError> {
        let mut handle = self.handle.lock();
        if engine.is_streaming() {
            return Ok(false);
        }
        // A previous thread that gave up after a fatal error; it takes no locks
        // once `streaming` is cleared.
        if let Some(finished) = handle.take()
            && finished.join().is_err()
        {
            tracing::error!("streaming thread panicked");
        }

        engine.streaming.store(true, Ordering::Release);
        let thread_engine = Arc::clone(engine);
        let spawned = thread::Builder::new()
            .name("audio-stream".to_string())
            .spawn(move || run(&thread_engine));

        match spawned {
            Ok(h) => {
                *handle = Some(h);
                Ok(true)
            }
            Err(e) => {
                engine.streaming.store(false, Ordering::Release);
                Err(PlayerError::AudioInit(format!("failed to spawn streaming thread: {e}")))
            }
        }
    }

    /// Join the thread if there is one. The caller must have signalled shutdown.
    pub fn join_and_clear(&self) {
        if let Some(h) = self.handle.lock().take()
            && h.join().is_err()
        {
            tracing::error!("streaming thread panicked");
        }
    }
}
