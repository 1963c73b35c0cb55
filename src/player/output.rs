//! Audio output using cpal.
//!
//! The engine talks to the [`AudioOutput`] trait. [`CpalOutput`] implements it:
//! - a dedicated `audio-device` thread owns the cpal stream (streams are not
//!   `Send`) and executes start/stop commands sent over a channel
//! - decoded chunks reach the realtime callback through a small bounded queue
//! - the callback signals a condvar each time it takes a chunk, which is what
//!   [`AudioOutput::wait_until_ready`] blocks on

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use parking_lot::{Condvar, Mutex};

use super::PlayerError;
use super::decoder::ReadOutcome;
use super::level::{map_channels, mean_abs, rms};
use super::track::Track;
use crate::config::AudioConfig;

/// Upper bound on a single readiness wait before flags are re-checked.
const READY_POLL: Duration = Duration::from_millis(20);
/// How long a write may wait for queue space before the chunk is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Outcome of one coupled pull-and-play call.
#[derive(Debug)]
pub enum PullStatus {
    /// A chunk was decoded and handed to the device.
    Played {
        /// Mean absolute sample value of the chunk.
        level: f32,
    },
    /// The decoder has no more audio.
    TrackExhausted,
    /// The decoder failed on this chunk; the track is still usable.
    DecodeError(PlayerError),
    /// The device is gone; playback cannot continue.
    Disconnected(PlayerError),
}

/// An audio output device.
///
/// All methods take `&self`: the streaming thread writes while the control
/// thread starts and stops the device.
pub trait AudioOutput: Send + Sync {
    fn start(&self) -> Result<(), PlayerError>;
    fn stop(&self) -> Result<(), PlayerError>;
    fn is_stopped(&self) -> bool;
    /// Read the next chunk from `track` and hand it to the device.
    fn pull_and_play(&self, track: &mut Track, max_samples: usize) -> PullStatus;
    /// Block until the device can take another chunk.
    ///
    /// Also returns when the device is stopped, so the caller can park. Returns
    /// `false` once the output has been closed.
    fn wait_until_ready(&self) -> bool;
    /// Discard audio handed over but not yet played.
    fn flush(&self);
    /// RMS of the most recent chunk, if the device tracks one.
    fn rms(&self) -> Option<f32> {
        None
    }
    /// Wake all waiters; `wait_until_ready` returns `false` from now on.
    fn close(&self);
}

/// Commands executed by the device thread, each acknowledged with its result.
enum DeviceCommand {
    Start(Sender<Result<(), PlayerError>>),
    Stop(Sender<Result<(), PlayerError>>),
    Shutdown,
}

#[derive(Default)]
struct ReadySignal {
    lock: Mutex<()>,
    cv: Condvar,
}

impl ReadySignal {
    fn notify(&self) {
        self.cv.notify_all();
    }
}

/// State moved into the realtime callback.
struct CallbackContext {
    chunk_rx: Receiver<Vec<f32>>,
    ready: Arc<ReadySignal>,
    stopped: Arc<AtomicBool>,
    disconnected: Arc<AtomicBool>,
    /// Bumped by `flush`; the callback drops its partial chunk when it changes.
    flushes: Arc<AtomicU64>,
}

/// Negotiated device format, reported back by the device thread.
#[derive(Debug, Clone)]
struct DeviceInfo {
    name: String,
    channels: u16,
    sample_rate: u32,
}

/// cpal-backed [`AudioOutput`].
pub struct CpalOutput {
    info: DeviceInfo,
    chunk_tx: Sender<Vec<f32>>,
    /// Second handle on the chunk queue, used to drain it on flush.
    chunk_drain: Receiver<Vec<f32>>,
    command_tx: Sender<DeviceCommand>,
    ready: Arc<ReadySignal>,
    stopped: Arc<AtomicBool>,
    disconnected: Arc<AtomicBool>,
    flushes: Arc<AtomicU64>,
    closed: AtomicBool,
    last_rms: Mutex<f32>,
    device_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalOutput {
    /// Open the configured device. The stream starts out stopped.
    pub fn open(config: &AudioConfig) -> Result<Self, PlayerError> {
        let (chunk_tx, chunk_rx) = bounded::<Vec<f32>>(config.buffered_chunks.max(1));
        let (command_tx, command_rx) = bounded::<DeviceCommand>(4);
        let (init_tx, init_rx) = bounded::<Result<DeviceInfo, PlayerError>>(1);

        let ready = Arc::new(ReadySignal::default());
        let stopped = Arc::new(AtomicBool::new(true));
        let disconnected = Arc::new(AtomicBool::new(false));
        let flushes = Arc::new(AtomicU64::new(0));
        let chunk_drain = chunk_rx.clone();

        let ctx = CallbackContext {
            chunk_rx,
            ready: Arc::clone(&ready),
            stopped: Arc::clone(&stopped),
            disconnected: Arc::clone(&disconnected),
            flushes: Arc::clone(&flushes),
        };
        let thread_config = config.clone();

        let device_thread = thread::Builder::new()
            .name("audio-device".to_string())
            .spawn(move || device_thread_main(thread_config, ctx, command_rx, init_tx))
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

        let info = init_rx
            .recv()
            .map_err(|_| PlayerError::AudioInit("audio device thread exited".to_string()))??;

        tracing::info!(
            device = %info.name,
            sample_rate = info.sample_rate,
            channels = info.channels,
            "audio output opened"
        );

        Ok(Self {
            info,
            chunk_tx,
            chunk_drain,
            command_tx,
            ready,
            stopped,
            disconnected,
            flushes,
            closed: AtomicBool::new(false),
            last_rms: Mutex::new(0.0),
            device_thread: Mutex::new(Some(device_thread)),
        })
    }

    fn command(
        &self,
        make: impl FnOnce(Sender<Result<(), PlayerError>>) -> DeviceCommand,
    ) -> Result<(), PlayerError> {
        let (ack_tx, ack_rx) = bounded(1);
        self.command_tx
            .send(make(ack_tx))
            .map_err(|_| PlayerError::ChannelClosed)?;
        ack_rx.recv().map_err(|_| PlayerError::ChannelClosed)?
    }

    fn disconnected_error(&self) -> PlayerError {
        PlayerError::DeviceDisconnected(self.info.name.clone())
    }
}

impl AudioOutput for CpalOutput {
    fn start(&self) -> Result<(), PlayerError> {
        self.command(DeviceCommand::Start)?;
        self.stopped.store(false, Ordering::Release);
        self.ready.notify();
        tracing::debug!(device = %self.info.name, "audio output started");
        Ok(())
    }

    fn stop(&self) -> Result<(), PlayerError> {
        // Silence the callback first so nothing stale is played while pausing.
        self.stopped.store(true, Ordering::Release);
        self.ready.notify();
        self.command(DeviceCommand::Stop)?;
        tracing::debug!(device = %self.info.name, "audio output stopped");
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn pull_and_play(&self, track: &mut Track, max_samples: usize) -> PullStatus {
        if self.disconnected.load(Ordering::Acquire) {
            return PullStatus::Disconnected(self.disconnected_error());
        }

        let samples = match track.read(max_samples) {
            Ok(ReadOutcome::Chunk(samples)) => samples,
            Ok(ReadOutcome::Exhausted) => return PullStatus::TrackExhausted,
            Err(e) => return PullStatus::DecodeError(e),
        };

        let level = mean_abs(&samples);
        let chunk = map_channels(samples, track.channels(), self.info.channels);
        *self.last_rms.lock() = rms(&chunk);

        match self.chunk_tx.send_timeout(chunk, WRITE_TIMEOUT) {
            Ok(()) => PullStatus::Played { level },
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(device = %self.info.name, "device did not take chunk in time, dropped");
                PullStatus::Played { level }
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                PullStatus::Disconnected(self.disconnected_error())
            }
        }
    }

    fn wait_until_ready(&self) -> bool {
        let mut guard = self.ready.lock.lock();
        while self.chunk_tx.is_full()
            && !self.closed.load(Ordering::Acquire)
            && !self.stopped.load(Ordering::Acquire)
            && !self.disconnected.load(Ordering::Acquire)
        {
            self.ready.cv.wait_for(&mut guard, READY_POLL);
        }
        !self.closed.load(Ordering::Acquire)
    }

    fn flush(&self) {
        // Bump first so a chunk the callback takes mid-drain is dropped too.
        self.flushes.fetch_add(1, Ordering::AcqRel);
        let dropped = self.chunk_drain.try_iter().count();
        self.ready.notify();
        tracing::debug!(device = %self.info.name, dropped, "audio output flushed");
    }

    fn rms(&self) -> Option<f32> {
        Some(*self.last_rms.lock())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify();
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
        let _ = self.command_tx.send(DeviceCommand::Shutdown);
        if let Some(handle) = self.device_thread.lock().take()
            && handle.join().is_err()
        {
            tracing::error!("audio device thread panicked");
        }
    }
}

/// Main loop of the device thread: owns the stream until shutdown.
fn device_thread_main(
    config: AudioConfig,
    ctx: CallbackContext,
    command_rx: Receiver<DeviceCommand>,
    init_tx: Sender<Result<DeviceInfo, PlayerError>>,
) {
    let stream = match open_stream(&config, ctx) {
        Ok((stream, info)) => {
            let _ = init_tx.send(Ok(info));
            stream
        }
        Err(e) => {
            tracing::error!("Failed to open audio output: {}", e);
            let _ = init_tx.send(Err(e));
            return;
        }
    };

    // Some backends start streams on creation.
    if let Err(e) = stream.pause() {
        tracing::debug!("initial pause not supported: {}", e);
    }

    for cmd in command_rx.iter() {
        match cmd {
            DeviceCommand::Start(ack) => {
                let result = stream
                    .play()
                    .map_err(|e| PlayerError::AudioInit(e.to_string()));
                let _ = ack.send(result);
            }
            DeviceCommand::Stop(ack) => {
                let result = stream
                    .pause()
                    .map_err(|e| PlayerError::AudioInit(e.to_string()));
                let _ = ack.send(result);
            }
            DeviceCommand::Shutdown => break,
        }
    }
    tracing::debug!("audio device thread exiting");
}

fn open_stream(
    config: &AudioConfig,
    ctx: CallbackContext,
) -> Result<(Stream, DeviceInfo), PlayerError> {
    let host = cpal::default_host();
    let device = select_device(&host, &config.output_device)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = pick_output_config(&device, config.sample_rate, config.channels)?;
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, ctx),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, ctx),
        SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, ctx),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, ctx),
        format => {
            return Err(PlayerError::AudioInit(format!(
                "Unsupported sample format: {:?}",
                format
            )));
        }
    }
    .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

    let info = DeviceInfo {
        name,
        channels: stream_config.channels,
        sample_rate: stream_config.sample_rate.0,
    };
    Ok((stream, info))
}

/// Pick the device whose name contains `needle` (case-insensitive), or the default device.
fn select_device(host: &cpal::Host, needle: &str) -> Result<Device, PlayerError> {
    let needle = needle.trim();
    if !needle.is_empty() {
        let devices = host
            .output_devices()
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?;
        for device in devices {
            if let Ok(name) = device.name()
                && matches_device_name(&name, needle)
            {
                return Ok(device);
            }
        }
        return Err(PlayerError::AudioInit(format!(
            "No output device matched: {}",
            needle
        )));
    }

    host.default_output_device()
        .ok_or_else(|| PlayerError::AudioInit("No output device found".to_string()))
}

/// Prefer a config with exactly the requested rate and channel count, falling
/// back to the device default.
fn pick_output_config(
    device: &Device,
    sample_rate: u32,
    channels: u16,
) -> Result<SupportedStreamConfig, PlayerError> {
    let rate = cpal::SampleRate(sample_rate);
    if let Ok(ranges) = device.supported_output_configs() {
        let best = ranges
            .filter(|r| {
                r.channels() == channels && r.min_sample_rate() <= rate && rate <= r.max_sample_rate()
            })
            .min_by_key(|r| sample_format_rank(r.sample_format()));
        if let Some(range) = best {
            return Ok(range.with_sample_rate(rate));
        }
    }

    tracing::warn!(
        sample_rate,
        channels,
        "requested format not supported, using device default"
    );
    device
        .default_output_config()
        .map_err(|e| PlayerError::AudioInit(e.to_string()))
}

fn sample_format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::F32 => 0,
        SampleFormat::I32 => 1,
        SampleFormat::I16 => 2,
        SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// Build the output stream; the callback drains queued chunks through a
/// [`CallbackBuffer`] and outputs silence while stopped.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    ctx: CallbackContext,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let CallbackContext {
        chunk_rx,
        ready,
        stopped,
        disconnected,
        flushes,
    } = ctx;
    let ready_on_error = Arc::clone(&ready);
    let silence = T::from_sample(0.0f32);
    let mut buffer = CallbackBuffer::new(flushes.load(Ordering::Acquire));

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            buffer.sync_flush(flushes.load(Ordering::Acquire));
            if stopped.load(Ordering::Acquire) {
                data.fill(silence);
                return;
            }
            buffer.fill(data, &chunk_rx, || ready.notify());
        },
        move |err| {
            tracing::error!("Audio stream error: {}", err);
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                disconnected.store(true, Ordering::Release);
                ready_on_error.notify();
            }
        },
        None,
    )
}

/// The chunk the callback is playing and the offset into it.
struct CallbackBuffer {
    chunk: Option<(Vec<f32>, usize)>,
    seen_flush: u64,
}

impl CallbackBuffer {
    fn new(flush: u64) -> Self {
        Self {
            chunk: None,
            seen_flush: flush,
        }
    }

    /// Drop the partial chunk if a flush happened since the last callback.
    fn sync_flush(&mut self, flush: u64) {
        if flush != self.seen_flush {
            self.seen_flush = flush;
            self.chunk = None;
        }
    }

    /// Copy queued audio into `data`, padding with silence on underrun.
    /// `on_take` runs each time a chunk leaves the queue.
    fn fill<T>(&mut self, data: &mut [T], chunk_rx: &Receiver<Vec<f32>>, mut on_take: impl FnMut())
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let mut output_pos = 0;
        while output_pos < data.len() {
            if self.chunk.is_none() {
                match chunk_rx.try_recv() {
                    Ok(chunk) => {
                        self.chunk = Some((chunk, 0));
                        on_take();
                    }
                    Err(_) => {
                        // Underrun
                        data[output_pos..].fill(T::from_sample(0.0f32));
                        return;
                    }
                }
            }

            if let Some((chunk, chunk_pos)) = self.chunk.as_mut() {
                let to_copy = (chunk.len() - *chunk_pos).min(data.len() - output_pos);
                let src = &chunk[*chunk_pos..*chunk_pos + to_copy];
                for (out, sample) in data[output_pos..output_pos + to_copy].iter_mut().zip(src) {
                    *out = T::from_sample(*sample);
                }
                *chunk_pos += to_copy;
                output_pos += to_copy;

                if *chunk_pos >= chunk.len() {
                    self.chunk = None;
                }
            }
        }
    }
}

/// List available audio output devices.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Get the default audio device name.
pub fn default_output_device() -> String {
    let host = cpal::default_host();
    host.default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_else(|| "Unknown".to_string())
}
