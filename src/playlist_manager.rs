//! Playlist orchestration over the event bus.
//!
//! One manager instance owns the sequencing state for the page the viewer
//! is on. It restores or fetches the playlist when a page loads, turns
//! playback events into navigation URLs, grows the ad-hoc custom playlist
//! on user request, and persists every surviving mutation immediately so
//! nothing is lost across the full-page navigation that follows.

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::{
    backends::{PlaylistRequest, PlaylistSource},
    config::Preferences,
    fragment,
    playlist::{PlaylistQueue, Track, CUSTOM_PLAYLIST_ID, DELETED_VIDEO_TITLE},
    protocol::{Message, NowPlaying, PlaybackMessage, PlaylistMessage, SessionMessage},
    storage::StateStore,
    surface::{Navigator, PageSurface},
    watch_page::{self, PlaylistRef, WatchPageContext, RELATED_ELEMENT_PREFIX},
};

/// Load lifecycle of the playlist attached to the current page visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPhase {
    Absent,
    Loading,
    Ready,
    Failed,
}

pub struct PlaylistManager {
    queue: Option<PlaylistQueue>,
    page: Option<WatchPageContext>,
    phase: LoadPhase,
    /// Set once a navigation is committed. Playback events that race in
    /// before the next page load are stale and get dropped.
    navigation_in_flight: bool,
    store: StateStore,
    source: Box<dyn PlaylistSource>,
    surface: Box<dyn PageSurface>,
    navigator: Box<dyn Navigator>,
    preferences: Preferences,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
}

impl PlaylistManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: StateStore,
        source: Box<dyn PlaylistSource>,
        surface: Box<dyn PageSurface>,
        navigator: Box<dyn Navigator>,
        preferences: Preferences,
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
    ) -> Self {
        Self {
            queue: None,
            page: None,
            phase: LoadPhase::Absent,
            navigation_in_flight: false,
            store,
            source,
            surface,
            navigator,
            preferences,
            bus_consumer,
            bus_producer,
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        info!("PlaylistManager: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Session(SessionMessage::Shutdown)) => break,
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("PlaylistManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Session(SessionMessage::PageLoaded { url }) => self.initialize(&url),
            Message::Session(SessionMessage::ContinueRequested) => self.retry_load(),
            Message::Playback(PlaybackMessage::Ended) | Message::Playback(PlaybackMessage::Next) => {
                self.on_playback_ended()
            }
            Message::Playback(PlaybackMessage::Previous) => self.on_previous(),
            Message::Playlist(PlaylistMessage::AddVideo { element_id }) => {
                self.add_video(&element_id)
            }
            Message::Playlist(PlaylistMessage::ToggleShuffle) => self.toggle_shuffle(),
            Message::Playlist(PlaylistMessage::ToggleLoop) => self.toggle_loop(),
            _ => {}
        }
    }

    /// (Re)initializes state for a freshly loaded watch page.
    fn initialize(&mut self, url: &str) {
        self.navigation_in_flight = false;
        self.queue = None;
        self.phase = LoadPhase::Absent;

        let page = match WatchPageContext::from_url(url, &self.preferences) {
            Some(page) => page,
            None => {
                debug!("PlaylistManager: not a watch page, staying idle");
                self.page = None;
                self.publish_now_playing();
                return;
            }
        };
        let page = match self.surface.page_video_metadata() {
            Some(meta) => page.with_video_metadata(
                &meta.title,
                &meta.author,
                meta.length_seconds,
                meta.next_video.as_deref(),
            ),
            None => page,
        };
        debug!(
            "PlaylistManager: page loaded for video {} ({:?})",
            page.video_id, page.playlist_ref
        );
        let playlist_ref = page.playlist_ref.clone();
        self.page = Some(page);

        match playlist_ref {
            PlaylistRef::Server(id) => self.load_or_fetch(&id, false),
            PlaylistRef::Custom(id) => {
                // The custom playlist substitutes for the page's native
                // autoplay-to-related behavior.
                self.surface.hide_autoplay_controls();
                self.load_or_fetch(&id, true);
            }
            PlaylistRef::None => self.try_attach_last_custom_playlist(),
        }
        self.publish_now_playing();
    }

    fn load_or_fetch(&mut self, playlist_id: &str, is_custom: bool) {
        if let Some(record) = self.store.load_queue(playlist_id) {
            match PlaylistQueue::from_record(record) {
                Some(queue) => {
                    debug!("PlaylistManager: restored playlist {}", playlist_id);
                    self.attach_queue(queue);
                    return;
                }
                None => info!(
                    "PlaylistManager: discarding unusable record for {}",
                    playlist_id
                ),
            }
        }
        self.fetch_playlist(playlist_id, is_custom);
    }

    fn fetch_playlist(&mut self, playlist_id: &str, is_custom: bool) {
        let Some(page) = self.page.as_ref() else {
            return;
        };
        self.phase = LoadPhase::Loading;
        self.surface.show_loading();

        let request = PlaylistRequest {
            playlist_id: playlist_id.to_string(),
            continuation_video_id: page.video_id.clone(),
            locale: self.preferences.locale.clone(),
        };
        match self.source.fetch_playlist(&request) {
            Ok(payload) => {
                let tracks = fragment::parse_playlist_fragment(&payload.playlist_html);
                info!(
                    "PlaylistManager: fetched playlist {} with {} tracks",
                    playlist_id,
                    tracks.len()
                );
                let mut queue = PlaylistQueue::new(playlist_id, is_custom);
                queue.set_contents(tracks, payload.playlist_html);
                self.attach_queue(queue);
            }
            Err(err) => {
                warn!(
                    "PlaylistManager: failed to load playlist {}: {}",
                    playlist_id, err
                );
                self.phase = LoadPhase::Failed;
                self.surface.show_continue_affordance();
            }
        }
    }

    /// Renders, resolves the current position, and makes a queue active.
    fn attach_queue(&mut self, mut queue: PlaylistQueue) {
        if let Some(html) = queue.fragment_html() {
            self.surface.render_fragment(html);
        }
        let (raw_index, video_id) = match self.page.as_ref() {
            Some(page) => (page.raw_index.clone(), Some(page.video_id.clone())),
            None => (None, None),
        };
        queue.resolve_current_index_from_location(raw_index.as_deref(), video_id.as_deref());
        if let Some(track) = queue.current_track() {
            self.surface.scroll_to_track(&track.id);
        }
        self.surface
            .set_toggle_states(queue.shuffle_enabled(), queue.loop_all_enabled());
        info!(
            "PlaylistManager: playlist {} active ({} tracks, restored={})",
            queue.playlist_id(),
            queue.num_tracks(),
            queue.was_loaded()
        );
        self.queue = Some(queue);
        self.phase = LoadPhase::Ready;
        self.persist();
    }

    /// Manual retry after a failed load.
    fn retry_load(&mut self) {
        if self.phase != LoadPhase::Failed {
            return;
        }
        let Some(playlist_ref) = self.page.as_ref().map(|page| page.playlist_ref.clone()) else {
            return;
        };
        match playlist_ref {
            PlaylistRef::Server(id) => self.fetch_playlist(&id, false),
            PlaylistRef::Custom(id) => self.fetch_playlist(&id, true),
            PlaylistRef::None => {}
        }
        self.publish_now_playing();
    }

    /// Re-attaches the ad-hoc custom playlist on pages without playlist
    /// context, so it keeps following the viewer around.
    fn try_attach_last_custom_playlist(&mut self) {
        let Some(last_id) = self.store.last_playlist_id() else {
            return;
        };
        if last_id != CUSTOM_PLAYLIST_ID {
            return;
        }
        let Some(queue) = self
            .store
            .load_queue(&last_id)
            .and_then(PlaylistQueue::from_record)
        else {
            return;
        };
        info!("PlaylistManager: re-attaching the custom playlist");
        self.surface.hide_autoplay_controls();
        self.attach_queue(queue);
    }

    fn on_playback_ended(&mut self) {
        if self.navigation_in_flight {
            debug!("PlaylistManager: ignoring playback event while navigation is in flight");
            return;
        }
        if self.queue.is_none() {
            // Single-video page. With autoplay on, the ad-hoc playlist is
            // born here from the current video plus its suggested follow-up.
            let Some(page) = self.page.as_ref() else {
                return;
            };
            if !(page.params.autoplay || page.params.continue_autoplay) {
                return;
            }
            let Some(next_video) = page.next_video.clone() else {
                return;
            };
            self.add_video(&next_video);
        }
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        match queue.advance() {
            Some(index) => self.commit_navigation(index),
            None => self.autoplay_fallback(),
        }
    }

    /// The playlist ran dry. With autoplay on, the page's next related
    /// video is pulled in as a play-next insertion; otherwise playback
    /// simply stops.
    fn autoplay_fallback(&mut self) {
        let Some(page) = self.page.as_ref() else {
            return;
        };
        if !(page.params.autoplay || page.params.continue_autoplay) {
            debug!("PlaylistManager: playlist exhausted, autoplay off");
            return;
        }
        let Some(next_video) = page.next_video.clone() else {
            debug!("PlaylistManager: playlist exhausted and page suggests nothing");
            return;
        };
        let Some(track) = self.related_track(&next_video) else {
            return;
        };
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        let target = if queue.num_tracks() == 0 {
            0
        } else {
            queue.current_index() + 1
        };
        queue.insert_track(track.clone(), true);
        self.surface.append_track_entry(&track);
        queue.set_pending_override(target);
        if let Some(index) = queue.advance() {
            self.commit_navigation(index);
        }
    }

    fn on_previous(&mut self) {
        if self.navigation_in_flight {
            debug!("PlaylistManager: ignoring playback event while navigation is in flight");
            return;
        }
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        match queue.previous() {
            Some(index) => self.commit_navigation(index),
            None => debug!("PlaylistManager: no playback history to rewind"),
        }
    }

    /// Applies a sequencing decision: update position, persist, navigate.
    fn commit_navigation(&mut self, index: usize) {
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        let Some(track) = queue.track(index) else {
            warn!("PlaylistManager: dropping out-of-range advance to {}", index);
            return;
        };
        let track_id = track.id.clone();
        queue.set_current_index(index);
        self.persist();

        let (Some(queue), Some(page)) = (self.queue.as_ref(), self.page.as_ref()) else {
            return;
        };
        let url = watch_page::build_navigation_url(
            &track_id,
            index,
            queue.playlist_id(),
            queue.is_custom(),
            &page.params,
            &self.preferences,
        );
        info!("PlaylistManager: advancing to {} (index {})", track_id, index);
        self.navigation_in_flight = true;
        self.navigator.navigate(&url);
    }

    fn add_video(&mut self, element_id: &str) {
        // Related-video elements are identified as "rv%<videoId>"; a bare
        // video id is accepted too.
        let video_id = element_id
            .strip_prefix(RELATED_ELEMENT_PREFIX)
            .unwrap_or(element_id)
            .to_string();
        if video_id.is_empty() {
            return;
        }
        if self.queue.is_none() {
            self.create_custom_playlist_from_current();
        }
        let Some(track) = self.related_track(&video_id) else {
            return;
        };
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        queue.insert_track(track.clone(), false);
        info!(
            "PlaylistManager: added video {} to playlist {}",
            track.id,
            queue.playlist_id()
        );
        self.surface.append_track_entry(&track);
        self.persist();
    }

    /// Seeds (or re-opens) the ad-hoc custom playlist with the video the
    /// viewer is currently watching.
    fn create_custom_playlist_from_current(&mut self) {
        let Some(page) = self.page.as_ref() else {
            return;
        };
        let mut queue = match self
            .store
            .load_queue(CUSTOM_PLAYLIST_ID)
            .and_then(PlaylistQueue::from_record)
        {
            Some(queue) => queue,
            None => PlaylistQueue::new(CUSTOM_PLAYLIST_ID, true),
        };
        let seed = Track::with_metadata(
            page.video_id.clone(),
            page.title.clone(),
            page.author.clone(),
            format_duration(page.length_seconds),
        );
        queue.insert_track(seed, false);
        queue.set_current_index(queue.last_index());
        info!("PlaylistManager: created custom playlist from the current video");
        self.surface.hide_autoplay_controls();
        self.queue = Some(queue);
        self.phase = LoadPhase::Ready;
        self.persist();
    }

    /// Builds a track for a related video, best effort. Dead links are
    /// dropped; a missing page element still yields an id-only track.
    fn related_track(&self, video_id: &str) -> Option<Track> {
        let element_id = format!("{}{}", RELATED_ELEMENT_PREFIX, video_id);
        let track = match self.surface.related_video(&element_id) {
            Some(info) => Track::with_metadata(
                info.video_id,
                info.title,
                info.author,
                info.duration_display,
            ),
            None => Track::new(video_id),
        };
        if track.title == DELETED_VIDEO_TITLE {
            info!("PlaylistManager: dropping dead link {}", track.id);
            return None;
        }
        Some(track)
    }

    fn toggle_shuffle(&mut self) {
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        queue.toggle_shuffle();
        let (shuffle, loop_all) = (queue.shuffle_enabled(), queue.loop_all_enabled());
        debug!("PlaylistManager: shuffle={}", shuffle);
        self.surface.set_toggle_states(shuffle, loop_all);
        self.persist();
    }

    fn toggle_loop(&mut self) {
        let Some(queue) = self.queue.as_mut() else {
            return;
        };
        queue.toggle_loop();
        let (shuffle, loop_all) = (queue.shuffle_enabled(), queue.loop_all_enabled());
        debug!("PlaylistManager: loop={}", loop_all);
        self.surface.set_toggle_states(shuffle, loop_all);
        self.persist();
    }

    fn persist(&self) {
        let Some(queue) = self.queue.as_ref() else {
            return;
        };
        if let Err(err) = self.store.save_queue(&queue.to_record()) {
            error!("PlaylistManager: failed to persist playlist state: {}", err);
        }
    }

    fn publish_now_playing(&self) {
        let now_playing = match (self.queue.as_ref(), self.page.as_ref()) {
            (Some(queue), Some(page)) => queue.current_track().map(|track| {
                // The widget may only know the id; the page itself has the
                // richer metadata when the track is this page's video.
                let on_page_video = track.id == page.video_id;
                NowPlaying {
                    track_id: track.id.clone(),
                    title: if track.title.is_empty() && on_page_video {
                        page.title.clone()
                    } else {
                        track.title.clone()
                    },
                    author: if track.author.is_empty() && on_page_video {
                        page.author.clone()
                    } else {
                        track.author.clone()
                    },
                    duration_secs: track.duration_secs().or(if on_page_video {
                        page.length_seconds
                    } else {
                        None
                    }),
                    rate: page.playback_rate(&self.preferences),
                }
            }),
            _ => None,
        };
        let _ = self
            .bus_producer
            .send(Message::Playlist(PlaylistMessage::NowPlayingChanged(
                now_playing,
            )));
    }
}

fn format_duration(length_seconds: Option<u64>) -> String {
    match length_seconds {
        Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{FetchError, PlaylistFragment};
    use crate::playlist::QueueRecord;
    use crate::surface::{PageVideoMetadata, RelatedVideoInfo};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::sync::broadcast;

    const FRAGMENT: &str = concat!(
        r#"<li id="vid-one"><p class="length">1:00</p><p>One</p><p><b>Ch</b></p></li>"#,
        r#"<li id="vid-two"><p class="length">2:00</p><p>Two</p><p><b>Ch</b></p></li>"#,
        r#"<li id="vid-three"><p class="length">3:00</p><p>Three</p><p><b>Ch</b></p></li>"#,
    );

    struct FakeSource {
        fragment: Arc<Mutex<Option<String>>>,
        requests: Arc<Mutex<Vec<PlaylistRequest>>>,
    }

    impl PlaylistSource for FakeSource {
        fn fetch_playlist(
            &self,
            request: &PlaylistRequest,
        ) -> Result<PlaylistFragment, FetchError> {
            self.requests.lock().expect("lock").push(request.clone());
            match self.fragment.lock().expect("lock").clone() {
                Some(playlist_html) => Ok(PlaylistFragment { playlist_html }),
                None => Err(FetchError::Status(500)),
            }
        }
    }

    #[derive(Default)]
    struct SurfaceState {
        continue_shown: bool,
        autoplay_hidden: bool,
        rendered_fragments: usize,
        appended: Vec<String>,
        related: HashMap<String, RelatedVideoInfo>,
        page_metadata: Option<PageVideoMetadata>,
    }

    struct FakeSurface(Arc<Mutex<SurfaceState>>);

    impl PageSurface for FakeSurface {
        fn show_loading(&self) {}

        fn show_continue_affordance(&self) {
            self.0.lock().expect("lock").continue_shown = true;
        }

        fn render_fragment(&self, _playlist_html: &str) {
            self.0.lock().expect("lock").rendered_fragments += 1;
        }

        fn append_track_entry(&self, track: &Track) {
            self.0.lock().expect("lock").appended.push(track.id.clone());
        }

        fn hide_autoplay_controls(&self) {
            self.0.lock().expect("lock").autoplay_hidden = true;
        }

        fn scroll_to_track(&self, _track_id: &str) {}

        fn set_toggle_states(&self, _shuffle: bool, _loop_all: bool) {}

        fn related_video(&self, element_id: &str) -> Option<RelatedVideoInfo> {
            self.0.lock().expect("lock").related.get(element_id).cloned()
        }

        fn page_video_metadata(&self) -> Option<PageVideoMetadata> {
            self.0.lock().expect("lock").page_metadata.clone()
        }
    }

    struct FakeNavigator(Arc<Mutex<Vec<String>>>);

    impl Navigator for FakeNavigator {
        fn navigate(&self, url: &str) {
            self.0.lock().expect("lock").push(url.to_string());
        }
    }

    struct Harness {
        manager: PlaylistManager,
        fragment: Arc<Mutex<Option<String>>>,
        requests: Arc<Mutex<Vec<PlaylistRequest>>>,
        surface: Arc<Mutex<SurfaceState>>,
        navigations: Arc<Mutex<Vec<String>>>,
        // Keeps the bus open so publishes do not error out.
        _bus_receiver: broadcast::Receiver<Message>,
    }

    fn harness(fragment: Option<&str>) -> Harness {
        let (bus_sender, bus_receiver) = broadcast::channel(64);
        let fragment = Arc::new(Mutex::new(fragment.map(str::to_string)));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let surface = Arc::new(Mutex::new(SurfaceState::default()));
        let navigations = Arc::new(Mutex::new(Vec::new()));

        let manager = PlaylistManager::new(
            StateStore::new_in_memory().expect("in-memory store"),
            Box::new(FakeSource {
                fragment: Arc::clone(&fragment),
                requests: Arc::clone(&requests),
            }),
            Box::new(FakeSurface(Arc::clone(&surface))),
            Box::new(FakeNavigator(Arc::clone(&navigations))),
            Preferences::default(),
            bus_sender.subscribe(),
            bus_sender,
        );
        Harness {
            manager,
            fragment,
            requests,
            surface,
            navigations,
            _bus_receiver: bus_receiver,
        }
    }

    fn page_loaded(harness: &mut Harness, url: &str) {
        harness
            .manager
            .handle_message(Message::Session(SessionMessage::PageLoaded {
                url: url.to_string(),
            }));
    }

    fn stored_record(harness: &Harness, playlist_id: &str) -> Option<QueueRecord> {
        harness.manager.store.load_queue(playlist_id)
    }

    #[test]
    fn test_fetched_playlist_advances_on_ended() {
        let mut h = harness(Some(FRAGMENT));
        page_loaded(&mut h, "/watch?v=vid-one&list=PL1&index=0");
        h.manager.handle_message(Message::Playback(PlaybackMessage::Ended));

        let navigations = h.navigations.lock().expect("lock");
        assert_eq!(navigations.len(), 1);
        assert_eq!(navigations[0], "/watch?v=vid-two&list=PL1&index=1");
        let record = stored_record(&h, "PL1").expect("persisted");
        assert_eq!(record.current_index, 1);
        assert!(record.tracks[0].played());
    }

    #[test]
    fn test_restored_playlist_skips_the_fetch() {
        let mut h = harness(Some(FRAGMENT));
        page_loaded(&mut h, "/watch?v=vid-one&list=PL1&index=0");
        assert_eq!(h.requests.lock().expect("lock").len(), 1);

        // Second page load for the same playlist restores from storage.
        page_loaded(&mut h, "/watch?v=vid-two&list=PL1&index=1");
        assert_eq!(h.requests.lock().expect("lock").len(), 1);
        assert_eq!(h.surface.lock().expect("lock").rendered_fragments, 2);
        assert_eq!(
            h.manager.queue.as_ref().map(|queue| queue.current_index()),
            Some(1)
        );
    }

    #[test]
    fn test_stale_url_index_recovers_through_video_id() {
        let mut h = harness(Some(FRAGMENT));
        page_loaded(&mut h, "/watch?v=vid-three&list=PL1&index=99");
        assert_eq!(
            h.manager.queue.as_ref().map(|queue| queue.current_index()),
            Some(2)
        );
    }

    #[test]
    fn test_fetch_failure_shows_continue_and_manual_retry_recovers() {
        let mut h = harness(None);
        page_loaded(&mut h, "/watch?v=vid-one&list=PL1");
        assert!(h.surface.lock().expect("lock").continue_shown);
        assert!(h.manager.queue.is_none());
        assert!(h.navigations.lock().expect("lock").is_empty());

        // The backend comes back; the user clicks continue.
        *h.fragment.lock().expect("lock") = Some(FRAGMENT.to_string());
        h.manager
            .handle_message(Message::Session(SessionMessage::ContinueRequested));
        assert!(h.manager.queue.is_some());
        assert_eq!(h.requests.lock().expect("lock").len(), 2);
    }

    #[test]
    fn test_custom_page_without_record_fetches_and_hides_autoplay() {
        let mut h = harness(None);
        page_loaded(&mut h, "/watch?v=vid-one&listCustom=customPlaylist");
        let surface = h.surface.lock().expect("lock");
        assert!(surface.autoplay_hidden);
        assert!(surface.continue_shown);
        assert_eq!(h.requests.lock().expect("lock").len(), 1);
    }

    #[test]
    fn test_exhausted_playlist_without_autoplay_stops() {
        let mut h = harness(Some(r#"<li id="only"><p>Only</p></li>"#));
        page_loaded(&mut h, "/watch?v=only&list=PL1&index=0");
        h.manager.handle_message(Message::Playback(PlaybackMessage::Ended));
        assert!(h.navigations.lock().expect("lock").is_empty());
    }

    #[test]
    fn test_exhausted_playlist_with_autoplay_pulls_in_next_related() {
        let mut h = harness(Some(r#"<li id="only"><p>Only</p></li>"#));
        h.surface.lock().expect("lock").page_metadata = Some(PageVideoMetadata {
            title: "Only".to_string(),
            author: "Ch".to_string(),
            length_seconds: Some(60),
            next_video: Some("vid-next".to_string()),
        });
        page_loaded(&mut h, "/watch?v=only&list=PL1&autoplay=1");
        h.manager.handle_message(Message::Playback(PlaybackMessage::Ended));

        let navigations = h.navigations.lock().expect("lock");
        assert_eq!(navigations.len(), 1);
        assert!(navigations[0].starts_with("/watch?v=vid-next&list=PL1&index=1"));
        let record = stored_record(&h, "PL1").expect("persisted");
        assert_eq!(record.tracks.len(), 2);
        assert_eq!(record.tracks[1].id, "vid-next");
    }

    #[test]
    fn test_ended_on_plain_page_with_autoplay_creates_custom_playlist() {
        let mut h = harness(None);
        h.surface.lock().expect("lock").page_metadata = Some(PageVideoMetadata {
            title: "Current".to_string(),
            author: "Ch".to_string(),
            length_seconds: Some(120),
            next_video: Some("vid-next".to_string()),
        });
        page_loaded(&mut h, "/watch?v=current1&autoplay=1");
        h.manager.handle_message(Message::Playback(PlaybackMessage::Ended));

        let navigations = h.navigations.lock().expect("lock");
        assert_eq!(navigations.len(), 1);
        assert!(navigations[0]
            .starts_with("/watch?v=vid-next&listCustom=customPlaylist&indexCustom=1"));
        let record = stored_record(&h, CUSTOM_PLAYLIST_ID).expect("persisted");
        assert!(record.is_custom);
        assert_eq!(record.tracks[0].id, "current1");
        assert_eq!(record.tracks[0].title, "Current");
        assert_eq!(record.tracks[1].id, "vid-next");
    }

    #[test]
    fn test_ended_on_plain_page_without_autoplay_does_nothing() {
        let mut h = harness(None);
        page_loaded(&mut h, "/watch?v=current1");
        h.manager.handle_message(Message::Playback(PlaybackMessage::Ended));
        assert!(h.navigations.lock().expect("lock").is_empty());
        assert!(stored_record(&h, CUSTOM_PLAYLIST_ID).is_none());
    }

    #[test]
    fn test_add_video_appends_with_element_metadata() {
        let mut h = harness(Some(FRAGMENT));
        h.surface.lock().expect("lock").related.insert(
            "rv%vid-new".to_string(),
            RelatedVideoInfo {
                video_id: "vid-new".to_string(),
                title: "New One".to_string(),
                author: "Other".to_string(),
                duration_display: "4:04".to_string(),
            },
        );
        page_loaded(&mut h, "/watch?v=vid-one&list=PL1&index=0");
        h.manager
            .handle_message(Message::Playlist(PlaylistMessage::AddVideo {
                element_id: "rv%vid-new".to_string(),
            }));

        let record = stored_record(&h, "PL1").expect("persisted");
        assert_eq!(record.tracks.len(), 4);
        assert_eq!(record.tracks[3].id, "vid-new");
        assert_eq!(record.tracks[3].title, "New One");
        assert_eq!(h.surface.lock().expect("lock").appended, ["vid-new"]);
    }

    #[test]
    fn test_add_video_drops_deleted_entries() {
        let mut h = harness(Some(FRAGMENT));
        h.surface.lock().expect("lock").related.insert(
            "rv%vid-gone".to_string(),
            RelatedVideoInfo {
                video_id: "vid-gone".to_string(),
                title: DELETED_VIDEO_TITLE.to_string(),
                author: String::new(),
                duration_display: String::new(),
            },
        );
        page_loaded(&mut h, "/watch?v=vid-one&list=PL1&index=0");
        h.manager
            .handle_message(Message::Playlist(PlaylistMessage::AddVideo {
                element_id: "rv%vid-gone".to_string(),
            }));
        let record = stored_record(&h, "PL1").expect("persisted");
        assert_eq!(record.tracks.len(), 3);
    }

    #[test]
    fn test_toggles_flip_and_persist() {
        let mut h = harness(Some(FRAGMENT));
        page_loaded(&mut h, "/watch?v=vid-one&list=PL1&index=0");
        h.manager
            .handle_message(Message::Playlist(PlaylistMessage::ToggleShuffle));
        h.manager
            .handle_message(Message::Playlist(PlaylistMessage::ToggleLoop));
        let record = stored_record(&h, "PL1").expect("persisted");
        assert!(record.shuffle_enabled);
        assert!(record.loop_all_enabled);
    }

    #[test]
    fn test_rapid_ended_events_commit_only_one_navigation() {
        let mut h = harness(Some(FRAGMENT));
        page_loaded(&mut h, "/watch?v=vid-one&list=PL1&index=0");
        h.manager.handle_message(Message::Playback(PlaybackMessage::Ended));
        h.manager.handle_message(Message::Playback(PlaybackMessage::Ended));
        assert_eq!(h.navigations.lock().expect("lock").len(), 1);
    }

    #[test]
    fn test_previous_rewinds_through_history() {
        let mut h = harness(Some(FRAGMENT));
        page_loaded(&mut h, "/watch?v=vid-one&list=PL1&index=0");
        h.manager.handle_message(Message::Playback(PlaybackMessage::Ended));
        // Simulate arriving on the advanced-to page, then going back.
        page_loaded(&mut h, "/watch?v=vid-two&list=PL1&index=1");
        h.manager
            .handle_message(Message::Playback(PlaybackMessage::Previous));

        let navigations = h.navigations.lock().expect("lock");
        assert_eq!(navigations.len(), 2);
        assert_eq!(navigations[1], "/watch?v=vid-one&list=PL1&index=0");
    }

    #[test]
    fn test_custom_playlist_reattaches_on_plain_pages() {
        let mut h = harness(None);
        h.surface.lock().expect("lock").page_metadata = Some(PageVideoMetadata {
            title: "Current".to_string(),
            author: "Ch".to_string(),
            length_seconds: None,
            next_video: None,
        });
        page_loaded(&mut h, "/watch?v=current1");
        h.manager
            .handle_message(Message::Playlist(PlaylistMessage::AddVideo {
                element_id: "rv%vid-new".to_string(),
            }));
        assert!(stored_record(&h, CUSTOM_PLAYLIST_ID).is_some());

        // A later plain watch page picks the custom playlist back up.
        page_loaded(&mut h, "/watch?v=vid-new");
        assert!(h.manager.queue.is_some());
        assert_eq!(
            h.manager
                .queue
                .as_ref()
                .map(|queue| queue.playlist_id().to_string()),
            Some(CUSTOM_PLAYLIST_ID.to_string())
        );
        assert_eq!(
            h.manager.queue.as_ref().map(|queue| queue.current_index()),
            Some(1)
        );
    }
}
