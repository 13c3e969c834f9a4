use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::debug;

use crate::{error::MusicError, sources::TrackDescriptor};

/// Pending tracks of one guild.
///
/// Not synchronized on its own: it lives inside the session state and every
/// access happens while the session lock is held.
#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    items: VecDeque<TrackDescriptor>,
}

impl TrackQueue {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normal enqueue (FIFO).
    pub fn push_back(&mut self, track: TrackDescriptor) {
        self.items.push_back(track);
    }

    /// Loop/retry requeue: plays before anything queued later.
    pub fn push_front(&mut self, track: TrackDescriptor) {
        self.items.push_front(track);
    }

    pub fn pop_front(&mut self) -> Result<TrackDescriptor, MusicError> {
        self.items.pop_front().ok_or(MusicError::EmptyQueue)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Randomizes the order of every pending entry.
    pub fn shuffle_remaining(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        debug!("🔀 Shuffled {} queued tracks", self.items.len());
    }

    /// Point-in-time copy, safe to read after the lock is released.
    pub fn snapshot(&self) -> Vec<TrackDescriptor> {
        self.items.iter().cloned().collect()
    }
}
