//! Conversions between seconds, decoder frames and raw samples.
//!
//! A "frame" here is the decoder's unit of decode granularity (one MPEG frame is
//! 1152 samples), not an interleaved PCM frame. "Samples" are per-channel sample
//! positions, the unit decoders report `tell`/`length` in.
//!
//! Conversions are done in `f64` and are lossy at frame granularity: seeking to
//! `x` seconds and reading the position back yields `x` within one frame's duration.

/// Frame geometry of a loaded track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    /// Duration of one decoder frame in seconds.
    pub time_per_frame: f64,
    /// Samples (per channel) in one decoder frame.
    pub samples_per_frame: u32,
}

impl FrameGeometry {
    /// Build geometry from a frame size and the track's sample rate.
    ///
    /// Returns `None` for a zero sample rate or zero frame size.
    pub fn from_sample_rate(samples_per_frame: u32, sample_rate: u32) -> Option<Self> {
        if samples_per_frame == 0 || sample_rate == 0 {
            return None;
        }
        Some(Self {
            time_per_frame: f64::from(samples_per_frame) / f64::from(sample_rate),
            samples_per_frame,
        })
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> f64 {
        seconds / self.time_per_frame
    }

    pub fn seconds_to_samples(&self, seconds: f64) -> f64 {
        self.seconds_to_frames(seconds) * f64::from(self.samples_per_frame)
    }

    pub fn samples_to_frames(&self, samples: u64) -> f64 {
        samples as f64 / f64::from(self.samples_per_frame)
    }

    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        self.samples_to_frames(samples) * self.time_per_frame
    }

    /// Resolve a seek target to a sample offset within `[0, length]`.
    ///
    /// Returns `None` when the target falls outside the track; callers treat
    /// that as a no-op rather than an error.
    pub fn seek_target(&self, seconds: f64, length: u64) -> Option<u64> {
        let samples = self.seconds_to_samples(seconds).round();
        if !samples.is_finite() || samples < 0.0 || samples > length as f64 {
            return None;
        }
        Some(samples as u64)
    }
}
