//! Invidious-compatible playlist source backed by `ureq`.

use std::error::Error as _;
use std::time::Duration;

use log::warn;
use serde_json::Value;

use crate::backends::{FetchError, PlaylistFragment, PlaylistRequest, PlaylistSource};

/// Auto-generated mix playlists carry this id prefix and are served by a
/// dedicated endpoint that needs a continuation video to seed the mix.
pub const MIX_PLAYLIST_PREFIX: &str = "RD";

pub struct InvidiousSource {
    http_client: ureq::Agent,
    api_base: String,
    max_retries: u32,
}

impl InvidiousSource {
    pub fn new(api_base: &str, max_retries: u32) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            max_retries,
        }
    }

    fn playlist_url(&self, request: &PlaylistRequest) -> String {
        if request.playlist_id.starts_with(MIX_PLAYLIST_PREFIX) {
            format!(
                "{}/api/v1/mixes/{}?continuation={}&format=html&hl={}",
                self.api_base,
                urlencoding::encode(&request.playlist_id),
                urlencoding::encode(&request.continuation_video_id),
                urlencoding::encode(&request.locale)
            )
        } else {
            // index=0 asks the backend for the whole playlist instead of a
            // window around the continuation video.
            format!(
                "{}/api/v1/playlists/{}?index=0&continuation={}&format=html&hl={}",
                self.api_base,
                urlencoding::encode(&request.playlist_id),
                urlencoding::encode(&request.continuation_video_id),
                urlencoding::encode(&request.locale)
            )
        }
    }

    fn fetch_once(&self, url: &str) -> Result<PlaylistFragment, FetchError> {
        let response = self.http_client.get(url).call().map_err(classify_error)?;
        let payload: Value = response
            .into_json()
            .map_err(|err| FetchError::MalformedPayload(err.to_string()))?;
        let playlist_html = payload
            .get("playlistHtml")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                FetchError::MalformedPayload("response carries no playlistHtml".to_string())
            })?
            .to_string();
        Ok(PlaylistFragment { playlist_html })
    }
}

impl PlaylistSource for InvidiousSource {
    fn fetch_playlist(&self, request: &PlaylistRequest) -> Result<PlaylistFragment, FetchError> {
        let url = self.playlist_url(request);
        let mut attempt = 0;
        loop {
            match self.fetch_once(&url) {
                Ok(fragment) => return Ok(fragment),
                Err(err) => {
                    attempt += 1;
                    if is_terminal(&err) || attempt > self.max_retries {
                        return Err(err);
                    }
                    warn!(
                        "Playlist fetch attempt {}/{} failed for {}: {}",
                        attempt, self.max_retries, request.playlist_id, err
                    );
                }
            }
        }
    }
}

/// Client errors and malformed payloads will not improve on retry.
fn is_terminal(err: &FetchError) -> bool {
    match err {
        FetchError::Status(code) => *code < 500,
        FetchError::MalformedPayload(_) => true,
        FetchError::Network(_) | FetchError::Timeout => false,
    }
}

fn classify_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(code, _) => FetchError::Status(code),
        ureq::Error::Transport(transport) => {
            let mut source = transport.source();
            while let Some(inner) = source {
                if let Some(io_err) = inner.downcast_ref::<std::io::Error>() {
                    if matches!(
                        io_err.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) {
                        return FetchError::Timeout;
                    }
                }
                source = inner.source();
            }
            FetchError::Network(transport.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(playlist_id: &str) -> PlaylistRequest {
        PlaylistRequest {
            playlist_id: playlist_id.to_string(),
            continuation_video_id: "vid123".to_string(),
            locale: "en-US".to_string(),
        }
    }

    #[test]
    fn test_plain_playlists_use_the_playlists_endpoint_from_index_zero() {
        let source = InvidiousSource::new("https://api.example.com/", 5);
        assert_eq!(
            source.playlist_url(&request("PL42")),
            "https://api.example.com/api/v1/playlists/PL42?index=0&continuation=vid123&format=html&hl=en-US"
        );
    }

    #[test]
    fn test_mix_playlists_use_the_mixes_endpoint() {
        let source = InvidiousSource::new("https://api.example.com", 5);
        assert_eq!(
            source.playlist_url(&request("RDvid123")),
            "https://api.example.com/api/v1/mixes/RDvid123?continuation=vid123&format=html&hl=en-US"
        );
    }

    #[test]
    fn test_url_components_are_encoded() {
        let source = InvidiousSource::new("https://api.example.com", 5);
        let mut req = request("PL 42");
        req.locale = "pt-BR".to_string();
        let url = source.playlist_url(&req);
        assert!(url.contains("/playlists/PL%2042?"));
        assert!(url.contains("hl=pt-BR"));
    }

    #[test]
    fn test_client_errors_are_terminal_and_server_errors_retry() {
        assert!(is_terminal(&FetchError::Status(404)));
        assert!(is_terminal(&FetchError::MalformedPayload("x".to_string())));
        assert!(!is_terminal(&FetchError::Status(503)));
        assert!(!is_terminal(&FetchError::Timeout));
        assert!(!is_terminal(&FetchError::Network("reset".to_string())));
    }
}
