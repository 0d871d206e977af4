//! Playlist sequencing engine.
//!
//! Tracks the ordered track list, current position, played history, and the
//! shuffle/loop policy for one playlist, and decides which track plays next.
//! The engine is pure state: rendering, persistence, and navigation are
//! applied by the manager on top of the indices computed here.

use rand::{rngs::StdRng, RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

/// Reserved playlist id for the client-assembled ad-hoc playlist.
pub const CUSTOM_PLAYLIST_ID: &str = "customPlaylist";

/// Sentinel title the backend renders for dead links.
pub const DELETED_VIDEO_TITLE: &str = "[Deleted video]";

/// Serialization format version for persisted queue records.
pub const QUEUE_RECORD_VERSION: u32 = 1;

/// One playable entry of a playlist.
///
/// Identity and display metadata are fixed at construction; only the
/// `played` flag changes, and only the sequencing engine changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub duration_display: String,
    #[serde(default)]
    played: bool,
}

impl Track {
    /// Creates a track from a bare video id, with metadata left empty.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            author: String::new(),
            duration_display: String::new(),
            played: false,
        }
    }

    pub fn with_metadata(
        id: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        duration_display: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            duration_display: duration_display.into(),
            played: false,
        }
    }

    pub fn played(&self) -> bool {
        self.played
    }

    /// Track length in seconds parsed from the `m:ss` display string.
    pub fn duration_secs(&self) -> Option<u64> {
        let mut seconds = 0u64;
        for part in self.duration_display.split(':') {
            let value = part.trim().parse::<u64>().ok()?;
            seconds = seconds.checked_mul(60)?.checked_add(value)?;
        }
        if self.duration_display.trim().is_empty() {
            return None;
        }
        Some(seconds)
    }
}

/// One-shot decision consumed by the next `advance()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NextAction {
    /// Follow the shuffle/loop policy.
    #[default]
    Advance,
    /// Land on a specific index once, then revert to policy.
    JumpTo(usize),
}

/// Whole-queue snapshot persisted across page navigations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub version: u32,
    pub playlist_id: String,
    pub tracks: Vec<Track>,
    pub current_index: usize,
    pub played_history: Vec<usize>,
    pub shuffle_enabled: bool,
    pub loop_all_enabled: bool,
    pub is_custom: bool,
    #[serde(default)]
    pub next_action: NextAction,
    #[serde(default)]
    pub fragment_html: Option<String>,
}

/// Sequencing state for one playlist.
pub struct PlaylistQueue {
    playlist_id: String,
    tracks: Vec<Track>,
    current_index: usize,
    played_history: Vec<usize>,
    shuffle_enabled: bool,
    loop_all_enabled: bool,
    next_action: NextAction,
    is_custom: bool,
    was_loaded: bool,
    fragment_html: Option<String>,
    rng_seed: [u8; 32],
}

impl PlaylistQueue {
    /// Creates an empty queue for a playlist id that has no persisted state.
    pub fn new(playlist_id: &str, is_custom: bool) -> Self {
        Self {
            playlist_id: playlist_id.to_string(),
            tracks: Vec::new(),
            current_index: 0,
            played_history: Vec::new(),
            shuffle_enabled: false,
            loop_all_enabled: false,
            next_action: NextAction::Advance,
            is_custom,
            was_loaded: false,
            fragment_html: None,
            rng_seed: fresh_seed(),
        }
    }

    /// Reconstructs a queue from a persisted record.
    ///
    /// Returns `None` for records from another format version or with
    /// out-of-bounds indices; callers treat that as "no prior state".
    pub fn from_record(record: QueueRecord) -> Option<Self> {
        if record.version != QUEUE_RECORD_VERSION {
            return None;
        }
        let len = record.tracks.len();
        if len == 0 && (record.current_index != 0 || !record.played_history.is_empty()) {
            return None;
        }
        if len > 0 && record.current_index >= len {
            return None;
        }
        if record.played_history.iter().any(|&index| index >= len) {
            return None;
        }
        if let NextAction::JumpTo(index) = record.next_action {
            if index >= len {
                return None;
            }
        }
        Some(Self {
            playlist_id: record.playlist_id,
            tracks: record.tracks,
            current_index: record.current_index,
            played_history: record.played_history,
            shuffle_enabled: record.shuffle_enabled,
            loop_all_enabled: record.loop_all_enabled,
            next_action: record.next_action,
            is_custom: record.is_custom,
            was_loaded: true,
            fragment_html: record.fragment_html,
            rng_seed: fresh_seed(),
        })
    }

    pub fn to_record(&self) -> QueueRecord {
        QueueRecord {
            version: QUEUE_RECORD_VERSION,
            playlist_id: self.playlist_id.clone(),
            tracks: self.tracks.clone(),
            current_index: self.current_index,
            played_history: self.played_history.clone(),
            shuffle_enabled: self.shuffle_enabled,
            loop_all_enabled: self.loop_all_enabled,
            is_custom: self.is_custom,
            next_action: self.next_action,
            fragment_html: self.fragment_html.clone(),
        }
    }

    /// Computes the index of the track to play next.
    ///
    /// Does not move `current_index`; the caller applies the decision once
    /// navigation is committed. A pending `JumpTo` wins over everything,
    /// is consumed, and leaves the history untouched.
    pub fn advance(&mut self) -> Option<usize> {
        if let NextAction::JumpTo(index) = self.next_action {
            self.next_action = NextAction::Advance;
            if index < self.tracks.len() {
                return Some(index);
            }
            return None;
        }
        if self.tracks.is_empty() {
            return None;
        }

        self.played_history.push(self.current_index);
        self.tracks[self.current_index].played = true;

        if self.shuffle_enabled {
            return self.pick_unplayed();
        }
        if self.current_index == self.tracks.len() - 1 {
            if self.loop_all_enabled {
                return Some(0);
            }
            return None;
        }
        Some(self.current_index + 1)
    }

    /// Steps back through the played history. No redo stack is kept.
    pub fn previous(&mut self) -> Option<usize> {
        self.played_history.pop()
    }

    /// Inserts a track after the current position (`play_next`) or at the
    /// end. The first track inserted into an empty queue becomes current.
    pub fn insert_track(&mut self, track: Track, play_next: bool) {
        if self.tracks.is_empty() {
            self.tracks.push(track);
            self.current_index = 0;
            return;
        }
        if play_next && self.current_index < self.tracks.len() {
            self.tracks.insert(self.current_index + 1, track);
        } else {
            self.tracks.push(track);
        }
    }

    /// Arms a one-shot jump to `index` and moves the current position there
    /// so scroll sync can reflect it before navigation happens. Out of
    /// bounds indices are ignored.
    pub fn set_pending_override(&mut self, index: usize) {
        if index >= self.tracks.len() {
            return;
        }
        self.next_action = NextAction::JumpTo(index);
        self.current_index = index;
    }

    /// Determines the authoritative current index from URL hints.
    ///
    /// A well-formed in-bounds index parameter wins; otherwise the video id
    /// is looked up; otherwise position 0. Index parameters go stale when
    /// the playlist was mutated client-side after the URL was built.
    pub fn resolve_current_index_from_location(
        &mut self,
        raw_index: Option<&str>,
        raw_video_id: Option<&str>,
    ) -> usize {
        let from_param = raw_index
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|&index| index < self.tracks.len());
        let index = match from_param {
            Some(index) => index,
            None => raw_video_id
                .and_then(|id| self.tracks.iter().position(|track| track.id == id))
                .unwrap_or(0),
        };
        self.current_index = index;
        index
    }

    pub fn toggle_shuffle(&mut self) {
        self.shuffle_enabled = !self.shuffle_enabled;
    }

    pub fn toggle_loop(&mut self) {
        self.loop_all_enabled = !self.loop_all_enabled;
    }

    /// Replaces the track list with entries parsed from a fetched fragment,
    /// keeping the rendered fragment for restore-time re-rendering.
    pub fn set_contents(&mut self, tracks: Vec<Track>, fragment_html: String) {
        self.tracks = tracks;
        self.fragment_html = Some(fragment_html);
        self.current_index = 0;
        self.played_history.clear();
        self.next_action = NextAction::Advance;
    }

    pub fn set_current_index(&mut self, index: usize) {
        if index < self.tracks.len() {
            self.current_index = index;
        }
    }

    pub fn playlist_id(&self) -> &str {
        &self.playlist_id
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Index of the last track, where appended entries land.
    pub fn last_index(&self) -> usize {
        self.tracks.len().saturating_sub(1)
    }

    pub fn is_custom(&self) -> bool {
        self.is_custom
    }

    pub fn was_loaded(&self) -> bool {
        self.was_loaded
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    pub fn loop_all_enabled(&self) -> bool {
        self.loop_all_enabled
    }

    pub fn fragment_html(&self) -> Option<&str> {
        self.fragment_html.as_deref()
    }

    /// Picks uniformly among unplayed tracks. When the pass is exhausted,
    /// loop-all resets the played flags and keeps going; without loop-all
    /// the queue is done.
    fn pick_unplayed(&mut self) -> Option<usize> {
        let mut candidates: Vec<usize> = (0..self.tracks.len())
            .filter(|&index| !self.tracks[index].played)
            .collect();
        if candidates.is_empty() {
            if !self.loop_all_enabled {
                return None;
            }
            for track in &mut self.tracks {
                track.played = false;
            }
            // The track that just finished stays out of the refreshed pool
            // unless it is the only one there is.
            candidates = (0..self.tracks.len())
                .filter(|&index| index != self.current_index)
                .collect();
            if candidates.is_empty() {
                return Some(self.current_index);
            }
        }
        let mut rng = self.next_rng();
        Some(candidates[rng.random_range(0..candidates.len())])
    }

    fn next_rng(&mut self) -> StdRng {
        let rng = StdRng::from_seed(self.rng_seed);
        for byte in self.rng_seed.iter_mut() {
            *byte = byte.wrapping_add(1);
        }
        rng
    }
}

fn fresh_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    // A zero seed still shuffles, just predictably.
    let _ = getrandom::fill(&mut seed);
    seed
}
