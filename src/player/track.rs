//! A loaded audio source.

use std::fmt;
use std::path::{Path, PathBuf};

use super::PlayerError;
use super::decoder::{ReadOutcome, TrackDecoder, TrackSource};
use super::position::FrameGeometry;

/// One open track: a decoder plus the path it was opened from.
///
/// The decoder is closed when the track is dropped.
pub struct Track {
    path: PathBuf,
    decoder: Box<dyn TrackDecoder>,
}

impl Track {
    /// Open `path` through `source`, failing fast if it cannot be read.
    pub fn open(source: &dyn TrackSource, path: &Path) -> Result<Self, PlayerError> {
        let decoder = source.open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            decoder,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name (file name, falling back to the full path).
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn tell(&self) -> u64 {
        self.decoder.tell()
    }

    pub fn length(&self) -> u64 {
        self.decoder.length()
    }

    pub fn channels(&self) -> u16 {
        self.decoder.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.decoder.sample_rate()
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            time_per_frame: self.decoder.time_per_frame(),
            samples_per_frame: self.decoder.samples_per_frame(),
        }
    }

    /// Current read position in seconds.
    pub fn position(&self) -> f64 {
        self.geometry().samples_to_seconds(self.tell())
    }

    pub fn length_in_seconds(&self) -> f64 {
        self.geometry().samples_to_seconds(self.length())
    }

    pub fn read(&mut self, max_samples: usize) -> Result<ReadOutcome, PlayerError> {
        self.decoder.read(max_samples)
    }

    pub fn seek(&mut self, sample: u64) -> Result<(), PlayerError> {
        self.decoder.seek(sample)
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("path", &self.path)
            .field("tell", &self.tell())
            .field("length", &self.length())
            .finish()
    }
}
