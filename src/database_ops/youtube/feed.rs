use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use tracing::{debug, instrument};

use super::{thumbnail_url, watch_url};
use crate::config::MediaConfig;
use crate::database_ops::media_cache::MediaSource;
use crate::database_ops::search::{parse_published, MediaSearch, SearchHit};

/// Keyless search through the public Atom feed endpoint.
#[derive(Debug, Clone)]
pub struct YoutubeFeed {
    base_url: String,
    http: Client,
}

impl YoutubeFeed {
    pub fn new(cfg: &MediaConfig, http: Client) -> Self {
        Self {
            base_url: cfg.youtube_feed_base.clone(),
            http,
        }
    }
}

#[async_trait]
impl MediaSearch for YoutubeFeed {
    fn name(&self) -> &'static str {
        "youtube-feed"
    }

    #[instrument(skip(self), fields(source = "youtube-feed"))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("search_query", query)])
            .send()
            .await
            .context("youtube feed request")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("youtube feed returned {}", status));
        }
        let raw = resp.text().await.context("youtube feed body")?;
        parse_feed(&raw, limit)
    }
}

fn unescape_xml(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Extract up to `limit` videos from an Atom feed document.
///
/// Entries are read structurally (id, title, published); when the document
/// has no parseable entries, bare `yt:video:<id>` markers are scraped instead
/// with a placeholder title.
pub fn parse_feed(raw: &str, limit: usize) -> Result<Vec<SearchHit>> {
    if raw.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let entry_re = Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>")?;
    let video_id_re = Regex::new(r"<yt:videoId>\s*([A-Za-z0-9_\-]{6,})\s*</yt:videoId>")?;
    let atom_id_re = Regex::new(r"<id>\s*yt:video:([A-Za-z0-9_\-]{6,})\s*</id>")?;
    let title_re = Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>")?;
    let published_re = Regex::new(r"<published>\s*([^<]+?)\s*</published>")?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut skipped = 0usize;
    for entry in entry_re.captures_iter(raw) {
        let body = &entry[1];
        let id = video_id_re
            .captures(body)
            .or_else(|| atom_id_re.captures(body))
            .map(|c| c[1].to_string());
        let Some(id) = id else {
            skipped += 1;
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        let title = title_re
            .captures(body)
            .map(|c| unescape_xml(&c[1]))
            .unwrap_or_default();
        let published_at = published_re
            .captures(body)
            .and_then(|c| parse_published(&c[1]));
        out.push(SearchHit {
            source: MediaSource::Rss,
            title,
            url: watch_url(&id),
            thumbnail_url: Some(thumbnail_url(&id)),
            published_at,
        });
        if out.len() >= limit {
            break;
        }
    }
    if skipped > 0 {
        debug!(skipped, "feed entries without a video id");
    }
    if !out.is_empty() {
        return Ok(out);
    }

    let marker_re = Regex::new(r"yt:video:([A-Za-z0-9_\-]{6,})")?;
    for cap in marker_re.captures_iter(raw) {
        let id = cap[1].to_string();
        if !seen.insert(id.clone()) {
            continue;
        }
        out.push(SearchHit {
            source: MediaSource::Rss,
            title: String::new(),
            url: watch_url(&id),
            thumbnail_url: Some(thumbnail_url(&id)),
            published_at: None,
        });
        if out.len() >= limit {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
 <title>YouTube</title>
 <entry>
  <id>yt:video:AAAAAA111</id>
  <yt:videoId>AAAAAA111</yt:videoId>
  <title>Hades &amp; Zagreus: full run</title>
  <published>2024-03-10T18:00:00+00:00</published>
  <media:group><media:title>ignored</media:title></media:group>
 </entry>
 <entry>
  <title>entry without id</title>
 </entry>
 <entry>
  <id>yt:video:BBBBBB222</id>
  <title><![CDATA[Boss <fight>]]></title>
 </entry>
 <entry>
  <id>yt:video:AAAAAA111</id>
  <title>duplicate</title>
 </entry>
</feed>"#;

    #[test]
    fn parses_entries_and_skips_broken_ones() {
        let hits = parse_feed(FEED, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.youtube.com/watch?v=AAAAAA111");
        assert_eq!(hits[0].title, "Hades & Zagreus: full run");
        assert!(hits[0].published_at.is_some());
        assert_eq!(hits[0].source, MediaSource::Rss);
        assert_eq!(hits[1].title, "Boss <fight>");
        assert_eq!(hits[1].published_at, None);
    }

    #[test]
    fn respects_limit() {
        let hits = parse_feed(FEED, 1).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn falls_back_to_bare_markers() {
        let raw = "garbage yt:video:CCCCCC333 more yt:video:CCCCCC333 yt:video:DDDDDD444";
        let hits = parse_feed(raw, 5).unwrap();
        let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.youtube.com/watch?v=CCCCCC333",
                "https://www.youtube.com/watch?v=DDDDDD444"
            ]
        );
        assert!(hits.iter().all(|h| h.title.is_empty()));
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(parse_feed("", 5).unwrap().is_empty());
        assert!(parse_feed("<feed></feed>", 5).unwrap().is_empty());
    }
}
