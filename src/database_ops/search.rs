use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;

use crate::config::MediaConfig;
use crate::database_ops::media_cache::MediaSource;

/// One usable result from an external search, already normalized to a
/// canonical url. Upstream entries without an id/url never become a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub source: MediaSource,
    pub title: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// An external free-text media search (keyed API, feed, image search).
#[async_trait]
pub trait MediaSearch: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Sources missing their credentials report `false` and are skipped.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// Shared HTTP client for all outbound searches.
pub fn http_client(cfg: &MediaConfig) -> Result<Client> {
    Ok(Client::builder()
        .user_agent("PlayerPathBot/1.0")
        .timeout(cfg.http_timeout())
        .redirect(reqwest::redirect::Policy::limited(3))
        .build()?)
}

/// Lenient timestamp parsing for upstream payloads: RFC 3339 first, then a
/// naive `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS` read as UTC.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Empty strings become `None`.
pub(crate) fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
