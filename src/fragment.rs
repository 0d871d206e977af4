//! Tolerant parser for playlist HTML fragments.
//!
//! The backend renders a playlist as an ordered list of `<li id="videoId">`
//! entries. Only the pieces the sequencing engine needs are extracted: the
//! video id, the visible title, the channel name, and the length badge.
//! Anything structurally surprising is skipped rather than reported; a
//! malformed fragment degrades to a partial or empty track list.

use crate::playlist::{Track, DELETED_VIDEO_TITLE};

/// Parses tracks out of a playlist fragment, dropping dead-link entries.
pub fn parse_playlist_fragment(playlist_html: &str) -> Vec<Track> {
    let mut tracks = Vec::new();
    let mut rest = playlist_html;
    while let Some(start) = find_ci(rest, "<li") {
        let after_tag = &rest[start..];
        let Some(tag_end) = after_tag.find('>') else {
            break;
        };
        let open_tag = &after_tag[..tag_end + 1];
        let body_and_rest = &after_tag[tag_end + 1..];
        let (body, remainder) = match find_ci(body_and_rest, "</li>") {
            Some(close) => (&body_and_rest[..close], &body_and_rest[close + 5..]),
            None => (body_and_rest, ""),
        };

        if let Some(track) = parse_entry(open_tag, body) {
            tracks.push(track);
        }
        rest = remainder;
    }
    tracks
}

fn parse_entry(open_tag: &str, body: &str) -> Option<Track> {
    let id = attr_value(open_tag, "id")?;
    if id.is_empty() {
        return None;
    }
    let duration = first_paragraph(body, ParagraphKind::Length).unwrap_or_default();
    let title = first_paragraph(body, ParagraphKind::Plain).unwrap_or_default();
    let author = tag_text(body, "b").unwrap_or_default();
    if title == DELETED_VIDEO_TITLE {
        return None;
    }
    Some(Track::with_metadata(id, title, author, duration))
}

#[derive(Clone, Copy, PartialEq)]
enum ParagraphKind {
    /// A `<p>` carrying the `length` class, used for the duration badge.
    Length,
    /// The first `<p>` without the `length` class, used for the title.
    Plain,
}

fn first_paragraph(body: &str, kind: ParagraphKind) -> Option<String> {
    let mut rest = body;
    while let Some(start) = find_ci(rest, "<p") {
        let after = &rest[start..];
        let tag_end = after.find('>')?;
        let open_tag = &after[..tag_end + 1];
        let inner_and_rest = &after[tag_end + 1..];
        let close = find_ci(inner_and_rest, "</p>")?;
        let inner = &inner_and_rest[..close];

        let is_length = attr_value(open_tag, "class")
            .map(|class| class.split_whitespace().any(|name| name == "length"))
            .unwrap_or(false);
        let matches = match kind {
            ParagraphKind::Length => is_length,
            ParagraphKind::Plain => !is_length,
        };
        if matches {
            let text = strip_tags(inner);
            if !text.is_empty() {
                return Some(text);
            }
        }
        rest = &inner_and_rest[close + 4..];
    }
    None
}

/// Text content of the first `<name …>…</name>` element in `body`.
fn tag_text(body: &str, name: &str) -> Option<String> {
    let open_marker = format!("<{}", name);
    let close_marker = format!("</{}>", name);
    let start = find_ci(body, &open_marker)?;
    let after = &body[start..];
    let tag_end = after.find('>')?;
    let inner_and_rest = &after[tag_end + 1..];
    let close = find_ci(inner_and_rest, &close_marker)?;
    let text = strip_tags(&inner_and_rest[..close]);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Value of an attribute inside one opening tag, entity-decoded.
fn attr_value(open_tag: &str, name: &str) -> Option<String> {
    let lower = open_tag.to_ascii_lowercase();
    let mut search_from = 0;
    loop {
        let found = lower[search_from..].find(name)?;
        let at = search_from + found;
        // Reject substring hits like "data-id" when looking for "id".
        let preceded_ok = at == 0
            || lower[..at]
                .chars()
                .next_back()
                .map(|c| c.is_whitespace())
                .unwrap_or(false);
        let after = &open_tag[at + name.len()..];
        let after_trimmed = after.trim_start();
        if preceded_ok && after_trimmed.starts_with('=') {
            let value_part = after_trimmed[1..].trim_start();
            let quote = value_part.chars().next()?;
            if quote == '"' || quote == '\'' {
                let inner = &value_part[1..];
                let end = inner.find(quote)?;
                return Some(unescape_entities(&inner[..end]));
            }
            let end = value_part
                .find(|c: char| c.is_whitespace() || c == '>')
                .unwrap_or(value_part.len());
            return Some(unescape_entities(&value_part[..end]));
        }
        search_from = at + name.len();
    }
}

/// Case-insensitive substring search. ASCII lowercasing keeps byte offsets
/// stable, so the returned index is valid for the original string.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Drops markup and collapses the remaining text.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    unescape_entities(text.trim())
}

fn unescape_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        r#"<ol class="pure-menu-list">"#,
        r#"<li class="pure-menu-item" id="vid-one"><a href="/watch?v=vid-one">"#,
        r#"<div class="thumbnail"><img src="x.jpg"><p class="length">3:25</p></div>"#,
        r#"<p style="width:100%">First Song</p>"#,
        r#"<p><b style="width:100%">Channel One</b></p></a></li>"#,
        r#"<li class="pure-menu-item" id="vid-two"><a href="/watch?v=vid-two">"#,
        r#"<div class="thumbnail"><p class="length">10:01</p></div>"#,
        r#"<p>Second &amp; Third</p>"#,
        r#"<p><b>Channel Two</b></p></a></li>"#,
        r#"</ol>"#,
    );

    #[test]
    fn test_parses_entries_with_metadata() {
        let tracks = parse_playlist_fragment(SAMPLE);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "vid-one");
        assert_eq!(tracks[0].title, "First Song");
        assert_eq!(tracks[0].author, "Channel One");
        assert_eq!(tracks[0].duration_display, "3:25");
        assert_eq!(tracks[1].title, "Second & Third");
    }

    #[test]
    fn test_drops_deleted_video_entries() {
        let html = concat!(
            r#"<li id="gone"><p class="length">0:00</p><p>[Deleted video]</p></li>"#,
            r#"<li id="kept"><p class="length">1:00</p><p>Still Here</p></li>"#,
        );
        let tracks = parse_playlist_fragment(html);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "kept");
    }

    #[test]
    fn test_skips_entries_without_an_id() {
        let html = r#"<li class="pure-menu-item"><p>No id here</p></li><li id="ok"><p>T</p></li>"#;
        let tracks = parse_playlist_fragment(html);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "ok");
    }

    #[test]
    fn test_entry_with_missing_metadata_keeps_the_id() {
        let tracks = parse_playlist_fragment(r#"<li id="bare"></li>"#);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "bare");
        assert!(tracks[0].title.is_empty());
        assert!(tracks[0].duration_display.is_empty());
    }

    #[test]
    fn test_garbage_input_yields_empty_list() {
        assert!(parse_playlist_fragment("").is_empty());
        assert!(parse_playlist_fragment("<div>nothing here</div>").is_empty());
        assert!(parse_playlist_fragment("<li id=").is_empty());
    }

    #[test]
    fn test_unterminated_entry_is_still_parsed() {
        let tracks = parse_playlist_fragment(r#"<li id="tail"><p>Cut Off"#);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "tail");
    }
}
