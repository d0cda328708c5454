//! YouTube gameplay footage: keyed Data API search with an unauthenticated
//! feed search as fallback. Both normalize to watch/thumbnail urls built
//! from the video id so the cache key is stable across sources.

use regex::Regex;
use std::sync::OnceLock;

pub mod api;
pub mod feed;

pub use api::YoutubeApi;
pub use feed::YoutubeFeed;

/// Canonical watch url for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

/// Ids are at least six URL-safe characters; anything else is upstream noise.
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() >= 6
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Video id from any common YouTube url shape (`watch?v=`, `youtu.be/`,
/// `embed/`). `None` for urls that carry no recognizable id.
pub fn video_id_from_url(url: &str) -> Option<String> {
    static ID_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = ID_RE
        .get_or_init(|| Regex::new(r"(?:youtu\.be/|[?&]v=|embed/)([A-Za-z0-9_\-]{6,})").ok())
        .as_ref()?;
    re.captures(url).map(|c| c[1].to_string())
}
