use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{is_valid_video_id, thumbnail_url, watch_url};
use crate::config::MediaConfig;
use crate::database_ops::media_cache::MediaSource;
use crate::database_ops::search::{non_empty, parse_published, MediaSearch, SearchHit};

/// Result orderings tried per query, most popular first.
const ORDERS: [&str; 2] = ["viewCount", "relevance"];

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: Option<SearchItemId>,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: Option<String>,
    published_at: Option<String>,
}

/// YouTube Data API v3 `search` endpoint. Requires a key; without one the
/// source reports itself disabled.
#[derive(Debug, Clone)]
pub struct YoutubeApi {
    base_url: String,
    http: Client,
    api_key: Option<String>,
}

impl YoutubeApi {
    pub fn new(cfg: &MediaConfig, http: Client) -> Self {
        Self {
            base_url: cfg.youtube_api_base.trim_end_matches('/').to_string(),
            http,
            api_key: cfg.youtube_api_key.clone(),
        }
    }

    async fn search_ordered(
        &self,
        key: &str,
        query: &str,
        order: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let url = format!("{}/search", self.base_url);
        let max_results = limit.clamp(1, 50).to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("order", order),
                ("maxResults", max_results.as_str()),
                ("q", query),
                ("regionCode", "US"),
                ("key", key),
            ])
            .send()
            .await
            .context("youtube search request")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("youtube search returned {}", status));
        }
        let body: SearchResponse = resp.json().await.context("youtube search body")?;
        Ok(parse_search_response(body))
    }
}

fn parse_search_response(body: SearchResponse) -> Vec<SearchHit> {
    let total = body.items.len();
    let hits: Vec<SearchHit> = body
        .items
        .into_iter()
        .filter_map(|item| {
            let id = item.id.and_then(|i| i.video_id)?;
            if !is_valid_video_id(&id) {
                return None;
            }
            let (title, published) = match item.snippet {
                Some(s) => (non_empty(s.title), s.published_at),
                None => (None, None),
            };
            Some(SearchHit {
                source: MediaSource::Api,
                title: title.unwrap_or_default(),
                url: watch_url(&id),
                thumbnail_url: Some(thumbnail_url(&id)),
                published_at: published.as_deref().and_then(parse_published),
            })
        })
        .collect();
    if hits.len() < total {
        debug!(skipped = total - hits.len(), "youtube items without a usable videoId");
    }
    hits
}

#[async_trait]
impl MediaSearch for YoutubeApi {
    fn name(&self) -> &'static str {
        "youtube-api"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Tries each ordering and returns the first non-empty page. An error is
    /// returned only when nothing was found and some ordering failed.
    #[instrument(skip(self), fields(source = "youtube-api"))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(key) = self.api_key.as_deref() else {
            return Ok(Vec::new());
        };
        let mut last_err = None;
        for order in ORDERS {
            match self.search_ordered(key, query, order, limit).await {
                Ok(hits) if !hits.is_empty() => return Ok(hits),
                Ok(_) => {}
                Err(e) => {
                    warn!(order, error = %e, "youtube search attempt failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_items_and_skips_missing_ids() {
        let body: SearchResponse = serde_json::from_value(json!({
            "kind": "youtube#searchListResponse",
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "AbCdEf123"},
                 "snippet": {"title": "Elden Ring - Malenia no hit", "publishedAt": "2023-02-01T10:00:00Z"}},
                {"id": {"kind": "youtube#channel", "channelId": "UC123"},
                 "snippet": {"title": "A channel"}},
                {"id": {"videoId": "xyz"}, "snippet": {"title": "too short"}},
                {"id": {"videoId": "ZZZZZZ99"}}
            ]
        }))
        .unwrap();

        let hits = parse_search_response(body);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.youtube.com/watch?v=AbCdEf123");
        assert_eq!(hits[0].title, "Elden Ring - Malenia no hit");
        assert!(hits[0].published_at.is_some());
        assert_eq!(hits[0].source, MediaSource::Api);
        assert_eq!(hits[1].title, "");
        assert_eq!(
            hits[1].thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/ZZZZZZ99/hqdefault.jpg")
        );
    }

    #[test]
    fn empty_payload_is_not_an_error() {
        let body: SearchResponse = serde_json::from_value(json!({})).unwrap();
        assert!(parse_search_response(body).is_empty());
    }

    #[tokio::test]
    async fn disabled_without_key_and_never_calls_out() {
        let cfg = MediaConfig {
            youtube_api_base: "http://127.0.0.1:9".into(),
            ..MediaConfig::default()
        };
        let api = YoutubeApi::new(&cfg, Client::new());
        assert!(!api.is_enabled());
        assert!(api.search("anything", 5).await.unwrap().is_empty());
    }
}
