//! Sequencing through the videos of a playlist.

use crate::{Playlist, VideoId};

/// Position within a playlist's video list.
///
/// Advancing past the last video wraps to the first; stepping back from the
/// first video stays put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistCursor {
    video_ids: Vec<VideoId>,
    index: usize,
}

impl PlaylistCursor {
    pub fn new(playlist: &Playlist) -> Self {
        Self {
            video_ids: playlist.video_ids.clone(),
            index: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.video_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.video_ids.is_empty()
    }

    /// The video at the cursor, or `None` for an empty playlist.
    pub fn current(&self) -> Option<&VideoId> {
        self.video_ids.get(self.index)
    }

    pub fn next(&mut self) -> Option<&VideoId> {
        if self.is_empty() {
            return None;
        }
        self.index = if self.index + 1 < self.video_ids.len() {
            self.index + 1
        } else {
            0
        };
        self.current()
    }

    pub fn previous(&mut self) -> Option<&VideoId> {
        self.index = self.index.saturating_sub(1);
        self.current()
    }

    /// Jump to `index`. Out-of-range indices leave the cursor unchanged.
    pub fn select(&mut self, index: usize) -> Option<&VideoId> {
        if index < self.video_ids.len() {
            self.index = index;
        }
        self.current()
    }

    pub fn can_go_previous(&self) -> bool {
        self.index > 0
    }

    /// Whether the "next" control is enabled. At the last video it only is with repeat on.
    pub fn can_go_next(&self, repeat: bool) -> bool {
        !self.is_empty() && (repeat || self.index + 1 < self.video_ids.len())
    }

    /// Reset to the first video when the playlist contents change.
    pub fn reload(&mut self, playlist: &Playlist) {
        self.video_ids = playlist.video_ids.clone();
        self.index = 0;
    }
}
