//! Track inspection.

use std::path::Path;

use crate::error::{Result, ResultExt};
use crate::player::{SymphoniaSource, Track, format_seconds};

/// Print length and frame geometry of a track
pub fn cmd_info(path: &Path) -> Result<()> {
    let track = Track::open(&SymphoniaSource, path).with_context("cannot inspect track")?;
    let geometry = track.geometry();

    println!("File:              {}", track.path().display());
    println!("Sample rate:       {} Hz", track.sample_rate());
    println!("Channels:          {}", track.channels());
    println!("Length:            {} samples", track.length());
    println!(
        "Duration:          {} ({:.3}s)",
        format_seconds(track.length_in_seconds()),
        track.length_in_seconds()
    );
    println!("Samples per frame: {}", geometry.samples_per_frame);
    println!("Time per frame:    {:.6}s", geometry.time_per_frame);
    println!(
        "Frames:            {:.1}",
        geometry.samples_to_frames(track.length())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::player::PlayerError;

    #[test]
    fn test_info_reports_unreadable_track_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.flac");

        let err = cmd_info(&path).unwrap_err();

        assert!(err.to_string().starts_with("cannot inspect track"));
        match err {
            Error::WithContext { source, .. } => match *source {
                Error::Player(PlayerError::TrackOpen { path: p, .. }) => assert_eq!(p, path),
                other => panic!("unexpected source: {other}"),
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
