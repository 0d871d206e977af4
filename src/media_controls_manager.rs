//! OS media controls bridge (MPRIS/SMTC/Now Playing).
//!
//! Connects the runtime event bus to platform media-session integrations
//! via `souvlaki`: transport events from the OS become playback messages,
//! and the active track's display metadata is published back.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, PlatformConfig, SeekDirection,
};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::protocol::{Message, NowPlaying, PlaybackMessage, PlaylistMessage};

const MEDIA_CONTROLS_DISPLAY_NAME: &str = "Vidqueue";
const MEDIA_CONTROLS_DBUS_NAME: &str = "vidqueue";
/// Base transport seek step, scaled by the page's playback rate.
const SEEK_STEP_SECS: f32 = 5.0;

#[derive(Debug, Clone, Copy)]
struct ControlState {
    is_playing: bool,
    rate: f32,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            is_playing: false,
            rate: 1.0,
        }
    }
}

/// Handles OS media control events and publishes now-playing state.
pub struct MediaControlsManager {
    bus_consumer: Receiver<Message>,
    control_state: Arc<Mutex<ControlState>>,
    controls: Option<MediaControls>,
    now_playing: Option<NowPlaying>,
    last_published_track_id: Option<String>,
    last_published_playing: Option<bool>,
}

impl MediaControlsManager {
    /// Creates a manager and attempts to initialize platform media controls.
    pub fn new(bus_consumer: Receiver<Message>, bus_producer: Sender<Message>) -> Self {
        let control_state = Arc::new(Mutex::new(ControlState::default()));
        let controls = Self::create_controls(bus_producer, Arc::clone(&control_state));

        Self {
            bus_consumer,
            control_state,
            controls,
            now_playing: None,
            last_published_track_id: None,
            last_published_playing: None,
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn create_controls(
        bus_producer: Sender<Message>,
        control_state: Arc<Mutex<ControlState>>,
    ) -> Option<MediaControls> {
        let mut controls = match MediaControls::new(PlatformConfig {
            display_name: MEDIA_CONTROLS_DISPLAY_NAME,
            dbus_name: MEDIA_CONTROLS_DBUS_NAME,
            hwnd: None,
        }) {
            Ok(controls) => controls,
            Err(err) => {
                warn!(
                    "MediaControlsManager: failed to create media controls backend: {}",
                    err
                );
                return None;
            }
        };

        if let Err(err) = controls.attach(move |event| {
            let snapshot = match control_state.lock() {
                Ok(state) => *state,
                Err(poisoned) => *poisoned.into_inner(),
            };

            if let Some(playback_message) = Self::map_control_event(event, snapshot) {
                let _ = bus_producer.send(Message::Playback(playback_message));
            }
        }) {
            warn!(
                "MediaControlsManager: failed to attach media controls handler: {}",
                err
            );
            return None;
        }

        Some(controls)
    }

    #[cfg(target_os = "windows")]
    fn create_controls(
        _bus_producer: Sender<Message>,
        _control_state: Arc<Mutex<ControlState>>,
    ) -> Option<MediaControls> {
        // Souvlaki requires an HWND on Windows, which a headless shell
        // cannot provide.
        warn!("MediaControlsManager: Windows media controls are disabled without an HWND");
        None
    }

    fn map_control_event(event: MediaControlEvent, state: ControlState) -> Option<PlaybackMessage> {
        match event {
            MediaControlEvent::Play => Some(PlaybackMessage::Play),
            MediaControlEvent::Pause | MediaControlEvent::Stop => Some(PlaybackMessage::Pause),
            MediaControlEvent::Toggle => {
                if state.is_playing {
                    Some(PlaybackMessage::Pause)
                } else {
                    Some(PlaybackMessage::Play)
                }
            }
            MediaControlEvent::Next => Some(PlaybackMessage::Next),
            MediaControlEvent::Previous => Some(PlaybackMessage::Previous),
            MediaControlEvent::Seek(direction) => {
                let step = SEEK_STEP_SECS * state.rate;
                Some(PlaybackMessage::SeekBy {
                    seconds: directed(step, direction),
                })
            }
            MediaControlEvent::SeekBy(direction, delta) => Some(PlaybackMessage::SeekBy {
                seconds: directed(delta.as_secs_f32(), direction),
            }),
            // Absolute position changes stay with the host player's own
            // progress bar.
            MediaControlEvent::SetPosition(_)
            | MediaControlEvent::SetVolume(_)
            | MediaControlEvent::OpenUri(_)
            | MediaControlEvent::Raise
            | MediaControlEvent::Quit => None,
        }
    }

    fn update_control_state<F>(&self, update: F)
    where
        F: FnOnce(&mut ControlState),
    {
        match self.control_state.lock() {
            Ok(mut state) => update(&mut state),
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                update(&mut state);
            }
        }
    }

    fn control_state_snapshot(&self) -> ControlState {
        match self.control_state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn publish_playback_if_needed(&mut self) {
        let playing = self.now_playing.is_some() && self.control_state_snapshot().is_playing;
        if self.last_published_playing == Some(playing) {
            return;
        }
        let Some(controls) = self.controls.as_mut() else {
            return;
        };

        let playback = if self.now_playing.is_none() {
            MediaPlayback::Stopped
        } else if playing {
            MediaPlayback::Playing { progress: None }
        } else {
            MediaPlayback::Paused { progress: None }
        };

        if let Err(err) = controls.set_playback(playback) {
            warn!("MediaControlsManager: failed to publish playback state: {}", err);
            return;
        }
        self.last_published_playing = Some(playing);
    }

    fn publish_metadata_if_needed(&mut self) {
        let track_id = self.now_playing.as_ref().map(|now| now.track_id.clone());
        if self.last_published_track_id == track_id {
            return;
        }
        let Some(controls) = self.controls.as_mut() else {
            return;
        };

        let publish_result = if let Some(now) = self.now_playing.as_ref() {
            controls.set_metadata(MediaMetadata {
                title: Some(now.title.as_str()),
                artist: Some(now.author.as_str()),
                album: None,
                cover_url: None,
                duration: now.duration_secs.map(Duration::from_secs),
            })
        } else {
            controls.set_metadata(MediaMetadata::default())
        };

        if let Err(err) = publish_result {
            warn!("MediaControlsManager: failed to publish metadata: {}", err);
            return;
        }
        self.last_published_track_id = track_id;
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Playback(PlaybackMessage::Play) => {
                self.update_control_state(|state| state.is_playing = true);
                self.publish_playback_if_needed();
            }
            Message::Playback(PlaybackMessage::Pause) => {
                self.update_control_state(|state| state.is_playing = false);
                self.publish_playback_if_needed();
            }
            Message::Playlist(PlaylistMessage::NowPlayingChanged(now_playing)) => {
                self.update_control_state(|state| {
                    state.is_playing = now_playing.is_some();
                    if let Some(now) = now_playing.as_ref() {
                        state.rate = now.rate;
                    }
                });
                self.now_playing = now_playing;
                self.publish_playback_if_needed();
                self.publish_metadata_if_needed();
            }
            _ => {}
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        info!("MediaControlsManager: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("MediaControlsManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn directed(step: f32, direction: SeekDirection) -> f32 {
    match direction {
        SeekDirection::Forward => step,
        SeekDirection::Backward => -step,
    }
}
