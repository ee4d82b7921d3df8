use std::{collections::VecDeque, time::Duration};
use thiserror::Error;
use tracing::debug;

use super::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,
    #[error("position {position} is outside 1..={len}")]
    OutOfRange { position: usize, len: usize },
}

/// Upcoming tracks of one session, in play order.
///
/// Positions exposed to users are 1-indexed; the head of the queue is
/// position 1.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track at the back.
    pub fn enqueue(&mut self, track: Track) {
        debug!("➕ Queued: {}", track.title());
        self.items.push_back(track);
    }

    /// Appends every track in order (playlist results).
    pub fn enqueue_many(&mut self, tracks: impl IntoIterator<Item = Track>) {
        let before = self.items.len();
        self.items.extend(tracks);
        debug!("➕ Queued {} tracks", self.items.len() - before);
    }

    /// Removes and returns the head.
    pub fn dequeue_front(&mut self) -> Result<Track, QueueError> {
        self.items.pop_front().ok_or(QueueError::Empty)
    }

    /// Removes the track at a 1-indexed position, keeping the order of the
    /// rest. The queue is left untouched on error.
    pub fn remove_at(&mut self, position: usize) -> Result<Track, QueueError> {
        let len = self.items.len();
        if position < 1 || position > len {
            return Err(QueueError::OutOfRange { position, len });
        }

        let removed = self
            .items
            .remove(position - 1)
            .ok_or(QueueError::OutOfRange { position, len })?;
        debug!("❌ Removed position {}: {}", position, removed.title());
        Ok(removed)
    }

    /// Owned copy of the queue for display; later mutations are not visible
    /// through it.
    pub fn peek_all(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.items.iter().cloned().collect(),
        }
    }

    /// Empties the queue and returns how many tracks were dropped.
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read-only, detached view of a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    tracks: Vec<Track>,
}

impl QueueSnapshot {
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Sum of known durations; live tracks count as zero.
    pub fn total_duration(&self) -> Duration {
        self.tracks.iter().filter_map(Track::duration).sum()
    }

    /// One page of the snapshot. `page` is 1-based and clamped to
    /// `1..=total_pages`, so a page past the end shows the last one.
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        let len = self.tracks.len();
        let per_page = per_page.max(1);
        let total_pages = len.div_ceil(per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1).saturating_mul(per_page).min(len);
        let end = start.saturating_add(per_page).min(len);

        QueuePage {
            tracks: self.tracks[start..end].to_vec(),
            first_position: start + 1,
            current_page,
            total_pages,
            remaining: len - end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    pub tracks: Vec<Track>,
    /// 1-indexed queue position of `tracks[0]`.
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    /// Tracks after this page.
    pub remaining: usize,
}
