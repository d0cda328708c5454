//! Bing v7 image search for per-game photos. Optional: no key, no photos.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::MediaConfig;
use crate::database_ops::media_cache::MediaSource;
use crate::database_ops::search::{non_empty, parse_published, MediaSearch, SearchHit};

#[derive(Debug, Deserialize, Default)]
struct ImagesResponse {
    #[serde(default)]
    value: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageEntry {
    content_url: Option<String>,
    thumbnail_url: Option<String>,
    name: Option<String>,
    date_published: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BingImages {
    base_url: String,
    http: Client,
    api_key: Option<String>,
}

impl BingImages {
    pub fn new(cfg: &MediaConfig, http: Client) -> Self {
        Self {
            base_url: cfg.bing_api_base.trim_end_matches('/').to_string(),
            http,
            api_key: cfg.bing_api_key.clone(),
        }
    }
}

fn parse_images_response(body: ImagesResponse) -> Vec<SearchHit> {
    let total = body.value.len();
    let hits: Vec<SearchHit> = body
        .value
        .into_iter()
        .filter_map(|v| {
            let url = non_empty(v.content_url)?;
            Some(SearchHit {
                source: MediaSource::Api,
                title: non_empty(v.name).unwrap_or_default(),
                url,
                thumbnail_url: non_empty(v.thumbnail_url),
                published_at: v.date_published.as_deref().and_then(parse_published),
            })
        })
        .collect();
    if hits.len() < total {
        debug!(skipped = total - hits.len(), "image results without contentUrl");
    }
    hits
}

#[async_trait]
impl MediaSearch for BingImages {
    fn name(&self) -> &'static str {
        "bing-images"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self), fields(source = "bing-images"))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(key) = self.api_key.as_deref() else {
            return Ok(Vec::new());
        };
        let count = limit.clamp(1, 150).to_string();
        let resp = self
            .http
            .get(format!("{}/images/search", self.base_url))
            .header("Ocp-Apim-Subscription-Key", key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("safeSearch", "Moderate"),
                ("freshness", "Week"),
                ("imageType", "Photo"),
            ])
            .send()
            .await
            .context("bing image search request")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("bing image search returned {}", status));
        }
        let body: ImagesResponse = resp.json().await.context("bing image search body")?;
        Ok(parse_images_response(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_only_entries_with_content_url() {
        let body: ImagesResponse = serde_json::from_value(json!({
            "_type": "Images",
            "value": [
                {"contentUrl": "https://img.example/elden1.jpg",
                 "thumbnailUrl": "https://tse.example/th1",
                 "name": "Elden Ring Limgrave",
                 "datePublished": "2024-02-11T09:15:00.0000000Z"},
                {"thumbnailUrl": "https://tse.example/th2", "name": "no content url"},
                {"contentUrl": "https://img.example/elden3.jpg", "thumbnailUrl": ""}
            ]
        }))
        .unwrap();
        let hits = parse_images_response(body);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Elden Ring Limgrave");
        assert_eq!(hits[0].thumbnail_url.as_deref(), Some("https://tse.example/th1"));
        assert!(hits[0].published_at.is_some());
        assert_eq!(hits[1].thumbnail_url, None);
        assert_eq!(hits[1].title, "");
    }

    #[test]
    fn disabled_without_key() {
        let images = BingImages::new(&MediaConfig::default(), Client::new());
        assert!(!images.is_enabled());
    }
}
