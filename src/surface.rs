//! Collaborator seams toward the page: rendering and navigation.
//!
//! The queue runtime never touches the document directly. It talks to the
//! playlist widget through [`PageSurface`] and commits navigation decisions
//! through [`Navigator`]; the embedding shell supplies the implementations.

use log::{debug, info};
use tokio::sync::broadcast::Sender;

use crate::playlist::Track;
use crate::protocol::{Message, SessionMessage};

/// Display metadata extracted from one related-video element.
#[derive(Debug, Clone)]
pub struct RelatedVideoInfo {
    pub video_id: String,
    pub title: String,
    pub author: String,
    pub duration_display: String,
}

/// Metadata of the video the current page is playing, read off the page
/// itself rather than the URL.
#[derive(Debug, Clone, Default)]
pub struct PageVideoMetadata {
    pub title: String,
    pub author: String,
    pub length_seconds: Option<u64>,
    /// Video id the page suggests as the next related video.
    pub next_video: Option<String>,
}

/// Watch-page widget surface the queue runtime draws on.
pub trait PageSurface: Send {
    /// Shows the loading placeholder while a fetch is in flight.
    fn show_loading(&self);
    /// Shows the manual retry affordance after a failed load.
    fn show_continue_affordance(&self);
    /// Replaces the widget's list contents with a rendered fragment.
    fn render_fragment(&self, playlist_html: &str);
    /// Appends one entry for a client-added track.
    fn append_track_entry(&self, track: &Track);
    /// Hides the page's native autoplay controls while a custom playlist
    /// substitutes for them.
    fn hide_autoplay_controls(&self);
    fn scroll_to_track(&self, track_id: &str);
    fn set_toggle_states(&self, shuffle: bool, loop_all: bool);
    /// Metadata of a related-video element, when the page has one.
    fn related_video(&self, element_id: &str) -> Option<RelatedVideoInfo>;
    /// Metadata of the video this page is playing.
    fn page_video_metadata(&self) -> Option<PageVideoMetadata>;
}

/// Page navigation collaborator.
pub trait Navigator: Send {
    fn navigate(&self, url: &str);
}

/// Surface for headless operation: widget updates become log lines.
pub struct LogSurface;

impl PageSurface for LogSurface {
    fn show_loading(&self) {
        info!("playlist widget: loading placeholder shown");
    }

    fn show_continue_affordance(&self) {
        info!("playlist widget: continue affordance shown");
    }

    fn render_fragment(&self, playlist_html: &str) {
        debug!("playlist widget: rendered fragment ({} bytes)", playlist_html.len());
    }

    fn append_track_entry(&self, track: &Track) {
        info!("playlist widget: appended entry {} ({})", track.id, track.title);
    }

    fn hide_autoplay_controls(&self) {
        debug!("playlist widget: autoplay controls hidden");
    }

    fn scroll_to_track(&self, track_id: &str) {
        debug!("playlist widget: scrolled to {}", track_id);
    }

    fn set_toggle_states(&self, shuffle: bool, loop_all: bool) {
        debug!("playlist widget: shuffle={} loop={}", shuffle, loop_all);
    }

    fn related_video(&self, _element_id: &str) -> Option<RelatedVideoInfo> {
        None
    }

    fn page_video_metadata(&self) -> Option<PageVideoMetadata> {
        None
    }
}

/// Navigator that republishes targets onto the bus so the shell can turn
/// them into the next page load.
pub struct BusNavigator {
    bus_producer: Sender<Message>,
}

impl BusNavigator {
    pub fn new(bus_producer: Sender<Message>) -> Self {
        Self { bus_producer }
    }
}

impl Navigator for BusNavigator {
    fn navigate(&self, url: &str) {
        let _ = self.bus_producer.send(Message::Session(SessionMessage::Navigate {
            url: url.to_string(),
        }));
    }
}
