//! Test doubles for the playback engine.
//!
//! This module provides a scripted decoder, a path-keyed track source and an
//! output device whose streaming iterations are released one at a time, so
//! engine scenarios run deterministically without audio hardware.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{MockOutput, MockSource, TrackSpec};
//!
//! let source = MockSource::new().with_track("a.mp3", TrackSpec::new(8192));
//! let (output, handle) = MockOutput::gated();
//! let player = Player::new(Box::new(output), Box::new(source), &PlaybackConfig::default());
//! player.load(["a.mp3"]).unwrap();
//! player.start().unwrap();
//! assert!(handle.tick());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, select, unbounded};
use parking_lot::{Condvar, Mutex};

use crate::player::level::{mean_abs, rms};
use crate::player::output::{AudioOutput, PullStatus};
use crate::player::{PlayerError, ReadOutcome, Track, TrackDecoder, TrackSource};

/// How long helpers wait for the streaming thread before giving up.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Decoder
// ============================================================================

/// Every sample a [`MockDecoder`] produces.
pub const MOCK_AMPLITUDE: f32 = 0.5;

/// Shape of a scripted track.
///
/// Defaults describe a stereo 44.1 kHz MP3 (1152 samples per frame) playing a
/// constant signal of [`MOCK_AMPLITUDE`].
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub length: u64,
    pub samples_per_frame: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Reads with index in `fail_from..fail_from + fail_count` return a decode error.
    pub fail_from: usize,
    pub fail_count: usize,
}

impl TrackSpec {
    pub fn new(length: u64) -> Self {
        Self {
            length,
            samples_per_frame: 1152,
            sample_rate: 44_100,
            channels: 2,
            fail_from: 0,
            fail_count: 0,
        }
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Make `count` reads fail, starting with read number `from` (0-based).
    pub fn failing_reads(mut self, from: usize, count: usize) -> Self {
        self.fail_from = from;
        self.fail_count = count;
        self
    }
}

/// Decoder that produces a constant signal described by a [`TrackSpec`].
#[derive(Debug)]
pub struct MockDecoder {
    spec: TrackSpec,
    cursor: u64,
    reads: usize,
}

impl MockDecoder {
    pub fn new(spec: TrackSpec) -> Self {
        Self {
            spec,
            cursor: 0,
            reads: 0,
        }
    }
}

impl TrackDecoder for MockDecoder {
    fn tell(&self) -> u64 {
        self.cursor
    }

    fn length(&self) -> u64 {
        self.spec.length
    }

    fn time_per_frame(&self) -> f64 {
        f64::from(self.spec.samples_per_frame) / f64::from(self.spec.sample_rate)
    }

    fn samples_per_frame(&self) -> u32 {
        self.spec.samples_per_frame
    }

    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn channels(&self) -> u16 {
        self.spec.channels
    }

    fn read(&mut self, max_samples: usize) -> Result<ReadOutcome, PlayerError> {
        let index = self.reads;
        self.reads += 1;
        if index >= self.spec.fail_from && index < self.spec.fail_from + self.spec.fail_count {
            return Err(PlayerError::Decode(format!("corrupt frame in read {index}")));
        }

        let remaining = self.spec.length.saturating_sub(self.cursor);
        if remaining == 0 {
            return Ok(ReadOutcome::Exhausted);
        }
        let channels = usize::from(self.spec.channels.max(1));
        let frames = ((max_samples / channels).max(1) as u64).min(remaining);
        self.cursor += frames;
        Ok(ReadOutcome::Chunk(vec![
            MOCK_AMPLITUDE;
            frames as usize * channels
        ]))
    }

    fn seek(&mut self, sample: u64) -> Result<(), PlayerError> {
        if sample > self.spec.length {
            return Err(PlayerError::SeekOutOfRange {
                target: sample,
                length: self.spec.length,
            });
        }
        self.cursor = sample;
        Ok(())
    }
}

/// Track source that knows a fixed set of paths.
#[derive(Debug, Default)]
pub struct MockSource {
    tracks: HashMap<PathBuf, TrackSpec>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, path: impl Into<PathBuf>, spec: TrackSpec) -> Self {
        self.tracks.insert(path.into(), spec);
        self
    }
}

impl TrackSource for MockSource {
    fn open(&self, path: &Path) -> Result<Box<dyn TrackDecoder>, PlayerError> {
        match self.tracks.get(path) {
            Some(spec) => Ok(Box::new(MockDecoder::new(spec.clone()))),
            None => Err(PlayerError::track_open(path, "No such file or directory")),
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Iterations let through the gate and iterations known to have finished.
#[derive(Debug, Default)]
struct GateProgress {
    passed: u64,
    completed: u64,
}

#[derive(Debug, Default)]
struct MockShared {
    starts: AtomicUsize,
    stops: AtomicUsize,
    flushes: AtomicUsize,
    stopped: AtomicBool,
    disconnected: AtomicBool,
    last_rms: Mutex<f32>,
    progress: Mutex<GateProgress>,
    progressed: Condvar,
}

/// Output device double.
///
/// A gated output holds the streaming thread in `wait_until_ready` until the
/// test releases it through [`MockHandle`]. A free-running output lets it through
/// every millisecond.
pub struct MockOutput {
    shared: Arc<MockShared>,
    ticks: Option<Receiver<()>>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
}

impl MockOutput {
    pub fn gated() -> (Self, MockHandle) {
        let (tick_tx, tick_rx) = unbounded();
        let output = Self::build(Some(tick_rx));
        let handle = MockHandle {
            shared: Arc::clone(&output.shared),
            ticks: tick_tx,
            sent: AtomicU64::new(0),
        };
        (output, handle)
    }

    pub fn free_running() -> (Self, MockHandle) {
        let (tick_tx, _) = unbounded();
        let output = Self::build(None);
        let handle = MockHandle {
            shared: Arc::clone(&output.shared),
            ticks: tick_tx,
            sent: AtomicU64::new(0),
        };
        (output, handle)
    }

    fn build(ticks: Option<Receiver<()>>) -> Self {
        let (close_tx, close_rx) = unbounded();
        let shared = MockShared {
            stopped: AtomicBool::new(true),
            ..MockShared::default()
        };
        Self {
            shared: Arc::new(shared),
            ticks,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
        }
    }
}

impl AudioOutput for MockOutput {
    fn start(&self) -> Result<(), PlayerError> {
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        self.shared.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), PlayerError> {
        self.shared.stops.fetch_add(1, Ordering::SeqCst);
        self.shared.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    fn pull_and_play(&self, track: &mut Track, max_samples: usize) -> PullStatus {
        if self.shared.disconnected.load(Ordering::SeqCst) {
            return PullStatus::Disconnected(PlayerError::DeviceDisconnected("mock".to_string()));
        }
        match track.read(max_samples) {
            Ok(ReadOutcome::Chunk(samples)) => {
                *self.shared.last_rms.lock() = rms(&samples);
                PullStatus::Played {
                    level: mean_abs(&samples),
                }
            }
            Ok(ReadOutcome::Exhausted) => PullStatus::TrackExhausted,
            Err(e) => PullStatus::DecodeError(e),
        }
    }

    fn wait_until_ready(&self) -> bool {
        {
            let mut progress = self.shared.progress.lock();
            progress.completed = progress.passed;
            self.shared.progressed.notify_all();
        }

        let Some(ticks) = &self.ticks else {
            return matches!(
                self.close_rx.recv_timeout(Duration::from_millis(1)),
                Err(RecvTimeoutError::Timeout)
            );
        };

        let closed = &self.close_rx;
        select! {
            recv(ticks) -> tick => {
                if tick.is_err() {
                    return false;
                }
                self.shared.progress.lock().passed += 1;
                true
            }
            recv(closed) -> _ => false,
        }
    }

    fn flush(&self) {
        self.shared.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn rms(&self) -> Option<f32> {
        Some(*self.shared.last_rms.lock())
    }

    fn close(&self) {
        self.close_tx.lock().take();
    }
}

/// Test-side view of a [`MockOutput`].
pub struct MockHandle {
    shared: Arc<MockShared>,
    ticks: Sender<()>,
    sent: AtomicU64,
}

impl MockHandle {
    /// Let one streaming iteration through without waiting for it.
    pub fn release(&self) -> u64 {
        let _ = self.ticks.send(());
        self.sent.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Let one iteration through and wait until the loop is back at the gate.
    ///
    /// Returns `false` if the loop did not come back (it parked or exited).
    pub fn tick(&self) -> bool {
        let target = self.release();
        let mut progress = self.shared.progress.lock();
        while progress.completed < target {
            if self
                .shared
                .progressed
                .wait_for(&mut progress, TEST_TIMEOUT)
                .timed_out()
            {
                return progress.completed >= target;
            }
        }
        true
    }

    pub fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.shared.flushes.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Simulate the device going away.
    pub fn disconnect(&self) {
        self.shared.disconnected.store(true, Ordering::SeqCst);
    }

    /// Simulate the device coming back.
    pub fn reconnect(&self) {
        self.shared.disconnected.store(false, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or [`TEST_TIMEOUT`] elapses.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + TEST_TIMEOUT;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_decoder_reads_whole_frames_then_exhausts() {
        let mut decoder = MockDecoder::new(TrackSpec::new(5));
        assert_eq!(decoder.read(6).unwrap(), ReadOutcome::Chunk(vec![0.5; 6]));
        assert_eq!(decoder.tell(), 3);
        assert_eq!(decoder.read(6).unwrap(), ReadOutcome::Chunk(vec![0.5; 4]));
        assert_eq!(decoder.read(6).unwrap(), ReadOutcome::Exhausted);
    }

    #[test]
    fn test_mock_decoder_scripted_failures() {
        let mut decoder = MockDecoder::new(TrackSpec::new(100).failing_reads(1, 2));
        assert!(decoder.read(2).is_ok());
        assert!(decoder.read(2).is_err());
        assert!(decoder.read(2).is_err());
        assert!(decoder.read(2).is_ok());
        assert_eq!(decoder.tell(), 2);
    }

    #[test]
    fn test_mock_decoder_seek_bounds() {
        let mut decoder = MockDecoder::new(TrackSpec::new(100));
        decoder.seek(100).unwrap();
        assert_eq!(decoder.tell(), 100);
        assert!(matches!(
            decoder.seek(101),
            Err(PlayerError::SeekOutOfRange { target: 101, length: 100 })
        ));
    }
}
