//! Track decoding using symphonia for multi-format support.
//!
//! Supported formats:
//! - MP3
//! - FLAC
//! - OGG Vorbis
//! - WAV/PCM
//! - AAC (in MP4 container)
//!
//! The engine only talks to the [`TrackDecoder`] and [`TrackSource`] traits;
//! [`SymphoniaSource`] is the production implementation.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::PlayerError;
use super::position::FrameGeometry;

/// Frame size assumed when the codec does not report one (MPEG layer III).
pub const DEFAULT_SAMPLES_PER_FRAME: u32 = 1152;

/// Result of a single decoder read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// Interleaved `f32` samples, always a whole number of PCM frames.
    Chunk(Vec<f32>),
    /// No more audio in the track.
    Exhausted,
}

/// A decoder for one open track.
///
/// Positions (`tell`, `length`, `seek`) are in per-channel samples.
pub trait TrackDecoder: Send {
    /// Current read offset.
    fn tell(&self) -> u64;
    /// Total track length, `0` when unknown.
    fn length(&self) -> u64;
    /// Duration of one decoder frame in seconds.
    fn time_per_frame(&self) -> f64;
    /// Samples (per channel) in one decoder frame.
    fn samples_per_frame(&self) -> u32;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    /// Read up to `max_samples` interleaved samples.
    fn read(&mut self, max_samples: usize) -> Result<ReadOutcome, PlayerError>;
    /// Move the read cursor to `sample`.
    fn seek(&mut self, sample: u64) -> Result<(), PlayerError>;
}

/// Opens decoders for paths.
pub trait TrackSource: Send + Sync {
    /// Open `path` eagerly; fails with [`PlayerError::TrackOpen`] if unreadable.
    fn open(&self, path: &Path) -> Result<Box<dyn TrackDecoder>, PlayerError>;
}

/// [`TrackSource`] backed by symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaSource;

impl TrackSource for SymphoniaSource {
    fn open(&self, path: &Path) -> Result<Box<dyn TrackDecoder>, PlayerError> {
        Ok(Box::new(SymphoniaDecoder::open(path)?))
    }
}

/// Audio decoder wrapper for symphonia.
pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    geometry: FrameGeometry,
    length: u64,
    /// Samples handed out by `read`, per channel.
    cursor: u64,
    /// Decoded but not yet read, interleaved.
    pending: Vec<f32>,
    /// Interleaved samples to drop after an accurate seek landed early.
    skip: usize,
    eof: bool,
}

impl SymphoniaDecoder {
    /// Open a file for decoding.
    pub fn open(path: &Path) -> Result<Self, PlayerError> {
        let open_error = |reason: String| PlayerError::track_open(path, reason);

        let file = File::open(path).map_err(|e| open_error(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| open_error(e.to_string()))?;

        let reader = probed.format;

        // Find the first audio track
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| open_error("no audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| open_error("unknown sample rate".to_string()))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);
        let samples_per_frame = codec_params
            .max_frames_per_packet
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SAMPLES_PER_FRAME);
        let geometry = FrameGeometry::from_sample_rate(samples_per_frame, sample_rate)
            .ok_or_else(|| open_error("invalid frame geometry".to_string()))?;
        let length = codec_params.n_frames.unwrap_or(0);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| open_error(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            sample_rate,
            channels,
            samples_per_frame,
            length,
            "opened track"
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            geometry,
            length,
            cursor: 0,
            pending: Vec::new(),
            skip: 0,
            eof: false,
        })
    }

    /// Decode the next packet of this track into `pending`.
    ///
    /// Sets `eof` at end of stream. A corrupt packet is consumed and reported
    /// as [`PlayerError::Decode`]; the next call continues after it.
    fn decode_packet(&mut self) -> Result<(), PlayerError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    return Ok(());
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(PlayerError::Decode(e.to_string())),
            };

            // Skip packets from other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| PlayerError::Decode(e.to_string()))?;

            let mut sample_buf =
                SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
            sample_buf.copy_interleaved_ref(decoded);

            let samples = sample_buf.samples();
            let dropped = self.skip.min(samples.len());
            self.skip -= dropped;
            self.pending.extend_from_slice(&samples[dropped..]);
            return Ok(());
        }
    }
}

impl TrackDecoder for SymphoniaDecoder {
    fn tell(&self) -> u64 {
        self.cursor
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn time_per_frame(&self) -> f64 {
        self.geometry.time_per_frame
    }

    fn samples_per_frame(&self) -> u32 {
        self.geometry.samples_per_frame
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, max_samples: usize) -> Result<ReadOutcome, PlayerError> {
        let channels = usize::from(self.channels.max(1));
        let wanted = (max_samples / channels).max(1) * channels;

        while self.pending.len() < wanted && !self.eof {
            self.decode_packet()?;
        }

        if self.pending.is_empty() {
            return Ok(ReadOutcome::Exhausted);
        }

        let take = self.pending.len().min(wanted) / channels * channels;
        if take == 0 {
            // Trailing partial frame; nothing playable is left.
            self.pending.clear();
            return Ok(ReadOutcome::Exhausted);
        }
        let chunk: Vec<f32> = self.pending.drain(..take).collect();
        self.cursor += (take / channels) as u64;
        Ok(ReadOutcome::Chunk(chunk))
    }

    fn seek(&mut self, sample: u64) -> Result<(), PlayerError> {
        if sample > self.length {
            return Err(PlayerError::SeekOutOfRange {
                target: sample,
                length: self.length,
            });
        }

        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: sample,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| PlayerError::Decode(format!("seek failed: {e}")))?;

        // Reset decoder state after seeking
        self.decoder.reset();
        self.pending.clear();
        self.eof = false;

        let early = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.skip = early as usize * usize::from(self.channels.max(1));
        self.cursor = seeked.required_ts;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAV_RATE: u32 = 44_100;
    const WAV_FRAMES: u32 = 44_100;

    /// 16-bit sample for `frame` on `channel`; right is the inverse of left.
    fn pcm(frame: u32, channel: u16) -> i16 {
        let v = ((frame % 2000) as i16 - 1000) * 16;
        if channel == 0 { v } else { -v }
    }

    fn expected(frame: u32, channel: u16) -> f32 {
        f32::from(pcm(frame, channel)) / 32768.0
    }

    /// Write one second of 16-bit stereo PCM as a canonical WAV file.
    fn write_wav(path: &Path) {
        let channels: u16 = 2;
        let block_align = channels * 2;
        let data_len = WAV_FRAMES * u32::from(block_align);

        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&WAV_RATE.to_le_bytes());
        bytes.extend_from_slice(&(WAV_RATE * u32::from(block_align)).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for frame in 0..WAV_FRAMES {
            for channel in 0..channels {
                bytes.extend_from_slice(&pcm(frame, channel).to_le_bytes());
            }
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn open_wav() -> (tempfile::TempDir, SymphoniaDecoder) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path);
        let decoder = SymphoniaDecoder::open(&path).unwrap();
        (dir, decoder)
    }

    /// Read to the end, returning the number of PCM frames produced.
    fn drain_frames(decoder: &mut SymphoniaDecoder) -> u64 {
        let mut frames = 0;
        while let ReadOutcome::Chunk(chunk) = decoder.read(4096).unwrap() {
            assert_eq!(chunk.len() % 2, 0);
            frames += (chunk.len() / 2) as u64;
        }
        frames
    }

    #[test]
    fn test_wav_reports_stream_parameters() {
        let (_dir, decoder) = open_wav();

        assert_eq!(decoder.sample_rate(), WAV_RATE);
        assert_eq!(decoder.channels(), 2);
        assert_eq!(decoder.length(), u64::from(WAV_FRAMES));
        assert_eq!(decoder.tell(), 0);
        let expected_tpf = f64::from(decoder.samples_per_frame()) / f64::from(WAV_RATE);
        assert!((decoder.time_per_frame() - expected_tpf).abs() < 1e-12);
    }

    #[test]
    fn test_wav_reads_whole_track_then_exhausts() {
        let (_dir, mut decoder) = open_wav();

        let chunk = match decoder.read(WAV_FRAMES as usize * 2).unwrap() {
            ReadOutcome::Chunk(chunk) => chunk,
            ReadOutcome::Exhausted => panic!("track exhausted on first read"),
        };

        assert_eq!(chunk.len(), WAV_FRAMES as usize * 2);
        assert_eq!(decoder.tell(), u64::from(WAV_FRAMES));
        assert!((chunk[0] - expected(0, 0)).abs() < 1e-6);
        assert!((chunk[2 * 777 + 1] - expected(777, 1)).abs() < 1e-6);
        assert_eq!(decoder.read(4096).unwrap(), ReadOutcome::Exhausted);
        assert_eq!(decoder.read(4096).unwrap(), ReadOutcome::Exhausted);
    }

    #[test]
    fn test_wav_seek_to_middle_leaves_remaining_frames() {
        let (_dir, mut decoder) = open_wav();

        decoder.seek(22_050).unwrap();

        assert_eq!(decoder.tell(), 22_050);
        assert_eq!(drain_frames(&mut decoder), 22_050);
        assert_eq!(decoder.tell(), u64::from(WAV_FRAMES));
    }

    #[test]
    fn test_wav_seek_lands_on_exact_sample() {
        let (_dir, mut decoder) = open_wav();
        decoder.read(4096).unwrap();

        decoder.seek(1001).unwrap();

        let chunk = match decoder.read(4).unwrap() {
            ReadOutcome::Chunk(chunk) => chunk,
            ReadOutcome::Exhausted => panic!("exhausted after seek"),
        };
        assert!((chunk[0] - expected(1001, 0)).abs() < 1e-6);
        assert!((chunk[1] - expected(1001, 1)).abs() < 1e-6);
        assert!((chunk[2] - expected(1002, 0)).abs() < 1e-6);
        assert_eq!(decoder.tell(), 1003);
    }

    #[test]
    fn test_wav_seek_to_end_exhausts() {
        let (_dir, mut decoder) = open_wav();

        decoder.seek(u64::from(WAV_FRAMES)).unwrap();

        assert_eq!(decoder.read(4096).unwrap(), ReadOutcome::Exhausted);
    }

    #[test]
    fn test_wav_seek_past_end_is_out_of_range() {
        let (_dir, mut decoder) = open_wav();
        let length = decoder.length();

        let err = decoder.seek(length + 1).unwrap_err();

        assert!(matches!(
            err,
            PlayerError::SeekOutOfRange { target, length: l } if target == length + 1 && l == length
        ));
        assert_eq!(decoder.tell(), 0);
    }

    #[test]
    fn test_decoder_nonexistent_file() {
        let result = SymphoniaDecoder::open(Path::new("/nonexistent/file.mp3"));
        assert!(matches!(result, Err(PlayerError::TrackOpen { .. })));
    }

    #[test]
    fn test_decoder_rejects_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not an mpeg stream").unwrap();

        let err = SymphoniaSource.open(&path).err().unwrap();
        match err {
            PlayerError::TrackOpen { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
