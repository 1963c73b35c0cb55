//! Track queue: pending tracks in play order plus the current track.

use std::collections::VecDeque;

use super::track::Track;

/// Pending tracks (FIFO) and the track currently selected for playback.
///
/// Tracks are only ever appended at the tail or popped from the head; the
/// only way a queued track becomes current is [`TrackQueue::advance`].
#[derive(Debug, Default)]
pub struct TrackQueue {
    pending: VecDeque<Track>,
    current: Option<Track>,
}

impl TrackQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an already opened track to the tail.
    pub fn enqueue(&mut self, track: Track) {
        self.pending.push_back(track);
    }

    /// Pop the head into the current slot and return it.
    ///
    /// Returns `None` when nothing is pending; the current slot is then left
    /// untouched. The replaced track (and its decoder) is dropped.
    pub fn advance(&mut self) -> Option<&mut Track> {
        let next = self.pending.pop_front()?;
        self.current = Some(next);
        self.current.as_mut()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Track> {
        self.current.as_mut()
    }

    /// Number of tracks waiting behind the current one.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Display names of pending tracks, head first.
    pub fn pending_names(&self) -> Vec<String> {
        self.pending.iter().map(Track::name).collect()
    }

    /// Drop every track, current included.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}
