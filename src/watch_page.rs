//! Watch-page context: query-parameter parsing and navigation URL building.
//!
//! A watch page URL carries the playlist identity (`list` for server
//! playlists, `listCustom` for client-assembled ones), a position hint
//! (`index`/`indexCustom`), the video id, and per-visit playback parameter
//! overrides. Navigation URLs mirror the same scheme, forwarding playback
//! parameters only when they differ from the viewer's stored preferences so
//! links stay minimal.

use crate::config::Preferences;

/// Element-id prefix carried by related-video nodes on the page.
pub const RELATED_ELEMENT_PREFIX: &str = "rv%";

/// Playlist identity referenced by a watch page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistRef {
    /// Single-video page, no playlist context.
    None,
    /// Server-side playlist fetched by id.
    Server(String),
    /// Client-assembled playlist restored from persistence.
    Custom(String),
}

/// Per-visit playback parameter overrides read from the URL.
#[derive(Debug, Clone, Default)]
pub struct PlaybackParams {
    pub autoplay: bool,
    pub continue_autoplay: bool,
    pub listen: Option<String>,
    pub speed: Option<String>,
    pub local: Option<String>,
}

/// Everything the queue runtime needs to know about the current page.
#[derive(Debug, Clone)]
pub struct WatchPageContext {
    pub video_id: String,
    pub playlist_ref: PlaylistRef,
    /// Raw `index` or `indexCustom` parameter, unvalidated.
    pub raw_index: Option<String>,
    pub params: PlaybackParams,
    /// Title of the video on this page, when the embedder supplied it.
    pub title: String,
    /// Channel name of the video on this page.
    pub author: String,
    pub length_seconds: Option<u64>,
    /// Video id the page suggests as the next related video.
    pub next_video: Option<String>,
}

impl WatchPageContext {
    /// Parses a watch URL. Returns `None` when the URL has no video id,
    /// which means there is nothing for the queue runtime to do.
    pub fn from_url(url: &str, preferences: &Preferences) -> Option<Self> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        let pairs = parse_query(query);
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        let video_id = get("v")?;
        if video_id.is_empty() {
            return None;
        }

        // A URL naming both playlist kinds is ambiguous and treated as
        // having no playlist context at all.
        let playlist_ref = match (get("list"), get("listCustom")) {
            (Some(id), None) if !id.is_empty() => PlaylistRef::Server(id),
            (None, Some(id)) if !id.is_empty() => PlaylistRef::Custom(id),
            _ => PlaylistRef::None,
        };
        let raw_index = match playlist_ref {
            PlaylistRef::Custom(_) => get("indexCustom"),
            _ => get("index"),
        };

        let params = PlaybackParams {
            autoplay: get("autoplay").map(|v| v == "1").unwrap_or(preferences.autoplay),
            continue_autoplay: preferences.continue_autoplay,
            listen: get("listen"),
            speed: get("speed"),
            local: get("local"),
        };

        Some(Self {
            video_id,
            playlist_ref,
            raw_index,
            params,
            title: String::new(),
            author: String::new(),
            length_seconds: None,
            next_video: None,
        })
    }

    /// Attaches the page video metadata the embedder extracted from the
    /// document (the URL alone does not carry it).
    pub fn with_video_metadata(
        mut self,
        title: &str,
        author: &str,
        length_seconds: Option<u64>,
        next_video: Option<&str>,
    ) -> Self {
        self.title = title.to_string();
        self.author = author.to_string();
        self.length_seconds = length_seconds;
        self.next_video = next_video.map(str::to_string);
        self
    }

    /// Playback rate for this visit, from the URL override or preferences.
    pub fn playback_rate(&self, preferences: &Preferences) -> f32 {
        self.params
            .speed
            .as_deref()
            .unwrap_or(&preferences.speed)
            .parse()
            .unwrap_or(1.0)
    }
}

/// Builds the URL of the next page to visit for a track of the active
/// playlist. The index parameter name depends on the playlist kind, and
/// playback parameters are forwarded only on divergence from preferences.
pub fn build_navigation_url(
    track_id: &str,
    index: usize,
    playlist_id: &str,
    is_custom: bool,
    params: &PlaybackParams,
    preferences: &Preferences,
) -> String {
    let mut pairs: Vec<(&str, String)> = vec![("v", track_id.to_string())];
    if is_custom {
        pairs.push(("listCustom", playlist_id.to_string()));
        pairs.push(("indexCustom", index.to_string()));
    } else {
        pairs.push(("list", playlist_id.to_string()));
        pairs.push(("index", index.to_string()));
    }
    if params.autoplay || params.continue_autoplay {
        pairs.push(("autoplay", "1".to_string()));
    }
    forward_if_diverged(&mut pairs, "listen", params.listen.as_deref(), &preferences.listen);
    forward_if_diverged(&mut pairs, "speed", params.speed.as_deref(), &preferences.speed);
    forward_if_diverged(&mut pairs, "local", params.local.as_deref(), &preferences.local);

    let query: Vec<String> = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();
    format!("/watch?{}", query.join("&"))
}

fn forward_if_diverged(
    pairs: &mut Vec<(&str, String)>,
    name: &'static str,
    value: Option<&str>,
    stored_default: &str,
) {
    if let Some(value) = value {
        if value != stored_default {
            pairs.push((name, value.to_string()));
        }
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |raw: &str| {
                urlencoding::decode(raw)
                    .map(|cow| cow.into_owned())
                    .unwrap_or_else(|_| raw.to_string())
            };
            (decode(key), decode(value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Preferences {
        Preferences::default()
    }

    #[test]
    fn test_parses_server_playlist_page() {
        let page = WatchPageContext::from_url("/watch?v=abc&list=PL123&index=4", &prefs())
            .expect("valid watch url");
        assert_eq!(page.video_id, "abc");
        assert_eq!(page.playlist_ref, PlaylistRef::Server("PL123".to_string()));
        assert_eq!(page.raw_index.as_deref(), Some("4"));
    }

    #[test]
    fn test_parses_custom_playlist_page_with_custom_index() {
        let page = WatchPageContext::from_url(
            "/watch?v=abc&listCustom=customPlaylist&indexCustom=2&index=9",
            &prefs(),
        )
        .expect("valid watch url");
        assert_eq!(
            page.playlist_ref,
            PlaylistRef::Custom("customPlaylist".to_string())
        );
        assert_eq!(page.raw_index.as_deref(), Some("2"));
    }

    #[test]
    fn test_both_playlist_kinds_mean_no_playlist() {
        let page = WatchPageContext::from_url("/watch?v=abc&list=PL1&listCustom=c", &prefs())
            .expect("valid watch url");
        assert_eq!(page.playlist_ref, PlaylistRef::None);
    }

    #[test]
    fn test_url_without_video_id_is_not_a_watch_page() {
        assert!(WatchPageContext::from_url("/watch?list=PL123", &prefs()).is_none());
        assert!(WatchPageContext::from_url("/feed/popular", &prefs()).is_none());
    }

    #[test]
    fn test_autoplay_param_overrides_preference() {
        let mut preferences = prefs();
        preferences.autoplay = true;
        let page = WatchPageContext::from_url("/watch?v=abc&autoplay=0", &preferences)
            .expect("valid watch url");
        assert!(!page.params.autoplay);
    }

    #[test]
    fn test_navigation_url_uses_plain_index_names_for_server_playlists() {
        let url = build_navigation_url("abc", 3, "PL123", false, &PlaybackParams::default(), &prefs());
        assert_eq!(url, "/watch?v=abc&list=PL123&index=3");
    }

    #[test]
    fn test_navigation_url_uses_custom_index_names_for_custom_playlists() {
        let url = build_navigation_url(
            "abc",
            0,
            "customPlaylist",
            true,
            &PlaybackParams::default(),
            &prefs(),
        );
        assert_eq!(url, "/watch?v=abc&listCustom=customPlaylist&indexCustom=0");
    }

    #[test]
    fn test_navigation_url_forwards_only_diverging_params() {
        let params = PlaybackParams {
            autoplay: true,
            continue_autoplay: false,
            listen: Some("1".to_string()),
            speed: Some(prefs().speed.clone()),
            local: None,
        };
        let url = build_navigation_url("abc", 1, "PL1", false, &params, &prefs());
        assert!(url.contains("autoplay=1"));
        assert!(url.contains("listen=1"));
        assert!(!url.contains("speed="));
        assert!(!url.contains("local="));
    }

    #[test]
    fn test_query_values_are_url_encoded() {
        let url = build_navigation_url("a b", 0, "PL/1", false, &PlaybackParams::default(), &prefs());
        assert!(url.contains("v=a%20b"));
        assert!(url.contains("list=PL%2F1"));
    }
}
