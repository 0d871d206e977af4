mod backends;
mod config;
mod fragment;
mod media_controls_manager;
mod playlist;
mod playlist_manager;
mod protocol;
mod storage;
mod surface;
mod watch_page;

use std::io::BufRead;
use std::thread;

use backends::invidious::InvidiousSource;
use log::{error, info};
use media_controls_manager::MediaControlsManager;
use playlist_manager::PlaylistManager;
use protocol::{Message, PlaybackMessage, PlaylistMessage, SessionMessage};
use storage::StateStore;
use surface::{BusNavigator, LogSurface};
use tokio::sync::broadcast;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = config::load_config(&config::config_file_path());
    let (bus_sender, _) = broadcast::channel::<Message>(1024);

    // Playlist manager
    let manager_bus_receiver = bus_sender.subscribe();
    let manager_bus_sender = bus_sender.clone();
    let store = StateStore::open_default()?;
    let source = InvidiousSource::new(&config.api.base_url, config.api.fetch_retries);
    let preferences = config.preferences.clone();
    thread::spawn(move || {
        let navigator = BusNavigator::new(manager_bus_sender.clone());
        let mut playlist_manager = PlaylistManager::new(
            store,
            Box::new(source),
            Box::new(LogSurface),
            Box::new(navigator),
            preferences,
            manager_bus_receiver,
            manager_bus_sender,
        );
        playlist_manager.run();
    });

    // OS media controls
    let controls_bus_receiver = bus_sender.subscribe();
    let controls_bus_sender = bus_sender.clone();
    thread::spawn(move || {
        let mut media_controls_manager =
            MediaControlsManager::new(controls_bus_receiver, controls_bus_sender);
        media_controls_manager.run();
    });

    // Navigation consumer: every resolved target becomes the next page load,
    // the way a browser would follow it.
    let navigation_bus_sender = bus_sender.clone();
    let mut navigation_bus_receiver = bus_sender.subscribe();
    thread::spawn(move || loop {
        match navigation_bus_receiver.blocking_recv() {
            Ok(Message::Session(SessionMessage::Navigate { url })) => {
                println!("-> {}", url);
                let _ = navigation_bus_sender.send(Message::Session(SessionMessage::PageLoaded {
                    url,
                }));
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    });

    if let Some(url) = std::env::args().nth(1) {
        let _ = bus_sender.send(Message::Session(SessionMessage::PageLoaded { url }));
    } else {
        info!("No watch URL given. Start with: url /watch?v=<id>&list=<playlist>");
    }

    run_shell(&bus_sender);

    let _ = bus_sender.send(Message::Session(SessionMessage::Shutdown));
    info!("Application exiting");
    Ok(())
}

/// Reads page/player events from stdin and feeds them onto the bus.
fn run_shell(bus_sender: &broadcast::Sender<Message>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                error!("stdin closed: {}", err);
                break;
            }
        };
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let argument = parts.next();

        let message = match (command, argument) {
            ("url", Some(url)) => Some(Message::Session(SessionMessage::PageLoaded {
                url: url.to_string(),
            })),
            ("ended", _) => Some(Message::Playback(PlaybackMessage::Ended)),
            ("next", _) => Some(Message::Playback(PlaybackMessage::Next)),
            ("prev", _) => Some(Message::Playback(PlaybackMessage::Previous)),
            ("play", _) => Some(Message::Playback(PlaybackMessage::Play)),
            ("pause", _) => Some(Message::Playback(PlaybackMessage::Pause)),
            ("add", Some(element_id)) => Some(Message::Playlist(PlaylistMessage::AddVideo {
                element_id: element_id.to_string(),
            })),
            ("shuffle", _) => Some(Message::Playlist(PlaylistMessage::ToggleShuffle)),
            ("loop", _) => Some(Message::Playlist(PlaylistMessage::ToggleLoop)),
            ("continue", _) => Some(Message::Session(SessionMessage::ContinueRequested)),
            ("quit", _) | ("exit", _) => break,
            ("", _) => None,
            _ => {
                println!(
                    "commands: url <watch-url> | ended | next | prev | play | pause | \
                     add <element-id> | shuffle | loop | continue | quit"
                );
                None
            }
        };
        if let Some(message) = message {
            let _ = bus_sender.send(message);
        }
    }
}
