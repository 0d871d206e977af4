//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the page
//! session shell, the playlist manager, and the media controls bridge.

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Session(SessionMessage),
    Playlist(PlaylistMessage),
    Playback(PlaybackMessage),
}

/// Page lifecycle events delivered by the embedding shell.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// A watch page finished loading and the manager must (re)initialize
    /// from its URL. Every navigation produces a fresh one of these.
    PageLoaded { url: String },
    /// The manager resolved the next page to visit.
    Navigate { url: String },
    /// The user clicked the manual retry affordance after a failed load.
    ContinueRequested,
    Shutdown,
}

/// Playlist-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum PlaylistMessage {
    /// Add the related video behind this page element id to the active
    /// playlist, creating the ad-hoc custom playlist if none is active.
    AddVideo { element_id: String },
    ToggleShuffle,
    ToggleLoop,
    /// Published whenever the active track changes or the queue is
    /// (re)attached, for the media-session bridge and other observers.
    NowPlayingChanged(Option<NowPlaying>),
}

/// Playback transport commands and notifications.
///
/// `Ended` comes from the host player; the rest are produced by OS media
/// controls or the shell and are consumed by the host player and, where
/// track navigation is concerned, by the playlist manager.
#[derive(Debug, Clone)]
pub enum PlaybackMessage {
    Ended,
    Next,
    Previous,
    Play,
    Pause,
    /// Relative seek request in seconds, already scaled by playback rate.
    SeekBy { seconds: f32 },
}

/// Display state of the currently playing track.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    /// Stable video id of the active track.
    pub track_id: String,
    pub title: String,
    pub author: String,
    /// Track length in seconds, when the display string could be parsed.
    pub duration_secs: Option<u64>,
    /// Playback rate active on the page.
    pub rate: f32,
}
