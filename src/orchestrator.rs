//! Refresh-if-stale for the per-user media cache.
//!
//! Video refresh walks a ladder of sources (keyed API, then the keyless feed,
//! repeated for a configurable number of rounds) until something is stored.
//! Every failure along the way is logged and swallowed: the worst outcome of
//! a refresh is an unchanged cache.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::MediaConfig;
use crate::database_ops::bing::BingImages;
use crate::database_ops::db::Db;
use crate::database_ops::media_cache::{
    last_fetched_at, purge_older_than, upsert_media, CacheKey, MediaItem, MediaKind,
};
use crate::database_ops::search::{http_client, MediaSearch, SearchHit};
use crate::database_ops::youtube::{YoutubeApi, YoutubeFeed};
use crate::normalization::title::search_queries;

/// Who is asking and when. `now` drives freshness, purge and the daily pick.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub user_id: i64,
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(user_id: i64) -> Self {
        Self::at(user_id, Utc::now())
    }

    pub fn at(user_id: i64, now: DateTime<Utc>) -> Self {
        Self { user_id, now }
    }

    /// UTC calendar day of the request.
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// What a refresh did. Informational only; callers never branch on errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Cache younger than the staleness window; nothing fetched.
    Fresh,
    /// Outbound fetching switched off by config.
    Disabled,
    Refreshed {
        added: usize,
        purged: u64,
        timed_out: bool,
    },
    /// Store unavailable; see the warning logged alongside.
    Failed,
}

/// Single query used for the photo strip.
fn photo_query(game_name: &str) -> String {
    format!("{} screenshot gameplay", game_name.trim())
}

#[derive(Clone)]
pub struct MediaRefresher {
    db: Db,
    cfg: Arc<MediaConfig>,
    primary: Arc<dyn MediaSearch>,
    fallback: Arc<dyn MediaSearch>,
    photos: Arc<dyn MediaSearch>,
}

impl MediaRefresher {
    /// Wire up the real providers over one shared HTTP client.
    pub fn new(db: Db, cfg: MediaConfig) -> Result<Self> {
        let http = http_client(&cfg)?;
        let primary: Arc<dyn MediaSearch> = Arc::new(YoutubeApi::new(&cfg, http.clone()));
        let fallback: Arc<dyn MediaSearch> = Arc::new(YoutubeFeed::new(&cfg, http.clone()));
        let photos: Arc<dyn MediaSearch> = Arc::new(BingImages::new(&cfg, http));
        Ok(Self::with_sources(db, cfg, primary, fallback, photos))
    }

    pub fn with_sources(
        db: Db,
        cfg: MediaConfig,
        primary: Arc<dyn MediaSearch>,
        fallback: Arc<dyn MediaSearch>,
        photos: Arc<dyn MediaSearch>,
    ) -> Self {
        Self {
            db,
            cfg: Arc::new(cfg),
            primary,
            fallback,
            photos,
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn config(&self) -> &MediaConfig {
        &self.cfg
    }

    /// Refresh cached videos for (user, game) unless fetched within the
    /// staleness window; `force` skips that check.
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn refresh_if_stale(
        &self,
        ctx: &RequestContext,
        game_id: i64,
        game_name: &str,
        force: bool,
    ) -> RefreshOutcome {
        match self
            .refresh_kind(MediaKind::Video, ctx, game_id, game_name, force)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(game_id, error = ?e, "video refresh failed");
                RefreshOutcome::Failed
            }
        }
    }

    /// Same freshness rule against the photo table, one image search attempt.
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn refresh_photos_if_stale(
        &self,
        ctx: &RequestContext,
        game_id: i64,
        game_name: &str,
        force: bool,
    ) -> RefreshOutcome {
        match self
            .refresh_kind(MediaKind::Photo, ctx, game_id, game_name, force)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(game_id, error = ?e, "photo refresh failed");
                RefreshOutcome::Failed
            }
        }
    }

    async fn is_fresh(&self, kind: MediaKind, ctx: &RequestContext, game_id: i64) -> Result<bool> {
        let last = last_fetched_at(&self.db, kind, ctx.user_id, game_id).await?;
        Ok(matches!(last, Some(at) if ctx.now - at < self.cfg.stale_after()))
    }

    async fn refresh_kind(
        &self,
        kind: MediaKind,
        ctx: &RequestContext,
        game_id: i64,
        game_name: &str,
        force: bool,
    ) -> Result<RefreshOutcome> {
        if !force && self.is_fresh(kind, ctx, game_id).await? {
            debug!(kind = kind.as_str(), game_id, "cache fresh; skipping fetch");
            return Ok(RefreshOutcome::Fresh);
        }
        if self.cfg.net_disabled {
            debug!(kind = kind.as_str(), game_id, "network disabled; skipping fetch");
            return Ok(RefreshOutcome::Disabled);
        }

        let key = CacheKey {
            user_id: ctx.user_id,
            game_id,
            game_name,
        };
        let mut added = 0usize;
        let work = async {
            match kind {
                MediaKind::Video => self.video_ladder(key, ctx.now, &mut added).await,
                MediaKind::Photo => {
                    if self.photos.is_enabled() {
                        let queries = [photo_query(game_name)];
                        added += self
                            .store_first_batch(self.photos.as_ref(), kind, key, &queries, ctx.now)
                            .await;
                    } else {
                        debug!(source = self.photos.name(), "photo search not configured");
                    }
                }
            }
        };
        let timed_out = tokio::time::timeout(self.cfg.refresh_budget(), work)
            .await
            .is_err();
        if timed_out {
            warn!(
                kind = kind.as_str(),
                game_id,
                budget_secs = self.cfg.refresh_budget_secs,
                added,
                "refresh budget exhausted"
            );
        }

        let cutoff = ctx.now - self.cfg.retention();
        let purged = purge_older_than(&self.db, kind, ctx.user_id, game_id, cutoff).await?;
        info!(kind = kind.as_str(), game_id, added, purged, timed_out, "media refreshed");
        Ok(RefreshOutcome::Refreshed {
            added,
            purged,
            timed_out,
        })
    }

    /// API, feed, API, feed... until a step stores something.
    async fn video_ladder(&self, key: CacheKey<'_>, now: DateTime<Utc>, added: &mut usize) {
        let queries: Vec<String> = search_queries(key.game_name)
            .into_iter()
            .take(self.cfg.max_queries)
            .collect();
        if queries.is_empty() {
            debug!(game_id = key.game_id, "no searchable name");
            return;
        }
        let steps: [&dyn MediaSearch; 2] = [self.primary.as_ref(), self.fallback.as_ref()];
        for round in 1..=self.cfg.ladder_rounds {
            for source in steps {
                if !source.is_enabled() {
                    debug!(source = source.name(), "source disabled; skipped");
                    continue;
                }
                *added += self
                    .store_first_batch(source, MediaKind::Video, key, &queries, now)
                    .await;
                if *added > 0 {
                    debug!(source = source.name(), round, added = *added, "ladder satisfied");
                    return;
                }
            }
        }
    }

    /// Try queries in order; store the first non-empty batch and stop.
    async fn store_first_batch(
        &self,
        source: &dyn MediaSearch,
        kind: MediaKind,
        key: CacheKey<'_>,
        queries: &[String],
        now: DateTime<Utc>,
    ) -> usize {
        for query in queries {
            match source.search(query, self.cfg.page_size as usize).await {
                Ok(hits) if hits.is_empty() => continue,
                Ok(hits) => {
                    let stored = self.store_hits(kind, key, &hits, now).await;
                    if stored > 0 {
                        return stored;
                    }
                }
                Err(e) => {
                    warn!(source = source.name(), query = %query, error = %e, "media search failed");
                }
            }
        }
        0
    }

    async fn store_hits(
        &self,
        kind: MediaKind,
        key: CacheKey<'_>,
        hits: &[SearchHit],
        now: DateTime<Utc>,
    ) -> usize {
        let mut stored = 0usize;
        for hit in hits.iter().filter(|h| !h.url.trim().is_empty()) {
            let item = self.item_from_hit(kind, key, hit, now);
            match upsert_media(&self.db, kind, &item).await {
                Ok(()) => stored += 1,
                Err(e) => warn!(url = %item.canonical_url, error = ?e, "cache write failed"),
            }
        }
        stored
    }

    fn item_from_hit(
        &self,
        kind: MediaKind,
        key: CacheKey<'_>,
        hit: &SearchHit,
        now: DateTime<Utc>,
    ) -> MediaItem {
        let mut item = MediaItem::from_hit(key, hit, now);
        if item.title.trim().is_empty() {
            item.title = match kind {
                MediaKind::Video => "Watch".to_string(),
                MediaKind::Photo => key.game_name.to_string(),
            };
        }
        item
    }

    /// Last-ditch single video straight from the feed, stored and returned
    /// so the caller can feature it even before the next read-back.
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn fetch_one_from_feed(
        &self,
        ctx: &RequestContext,
        game_id: i64,
        game_name: &str,
    ) -> Option<MediaItem> {
        if self.cfg.net_disabled || !self.fallback.is_enabled() {
            return None;
        }
        let key = CacheKey {
            user_id: ctx.user_id,
            game_id,
            game_name,
        };
        let work = async {
            for query in search_queries(game_name).iter().take(self.cfg.max_queries) {
                let hits = match self.fallback.search(query, 1).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        warn!(source = self.fallback.name(), query = %query, error = %e, "feed lookup failed");
                        continue;
                    }
                };
                let Some(hit) = hits.into_iter().find(|h| !h.url.trim().is_empty()) else {
                    continue;
                };
                let item = self.item_from_hit(MediaKind::Video, key, &hit, ctx.now);
                if let Err(e) = upsert_media(&self.db, MediaKind::Video, &item).await {
                    warn!(url = %item.canonical_url, error = ?e, "cache write failed");
                }
                return Some(item);
            }
            None
        };
        match tokio::time::timeout(self.cfg.refresh_budget(), work).await {
            Ok(found) => found,
            Err(_) => {
                warn!(game_id, "feed lookup exceeded refresh budget");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database_ops::media_cache::{count_media, recent_media, MediaSource};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned search source that counts how often it is asked.
    pub(crate) struct FakeSearch {
        pub name: &'static str,
        pub enabled: bool,
        pub fail: bool,
        pub delay: Option<std::time::Duration>,
        pub hits: Vec<SearchHit>,
        pub calls: AtomicUsize,
    }

    impl FakeSearch {
        pub fn new(name: &'static str, source: MediaSource, urls: &[&str]) -> Self {
            Self {
                name,
                enabled: true,
                fail: false,
                delay: None,
                hits: urls
                    .iter()
                    .map(|u| SearchHit {
                        source,
                        title: String::new(),
                        url: u.to_string(),
                        thumbnail_url: None,
                        published_at: None,
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_hits(name: &'static str, source: MediaSource, urls: &[&str]) -> Arc<Self> {
            Arc::new(Self::new(name, source, urls))
        }

        pub fn empty(name: &'static str) -> Arc<Self> {
            Self::with_hits(name, MediaSource::Api, &[])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaSearch for FakeSearch {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("{} unavailable", self.name);
            }
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    pub(crate) fn test_config() -> MediaConfig {
        MediaConfig {
            max_queries: 2,
            ..MediaConfig::default()
        }
    }

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn refresher(
        db: &Db,
        cfg: MediaConfig,
        primary: &Arc<FakeSearch>,
        fallback: &Arc<FakeSearch>,
        photos: &Arc<FakeSearch>,
    ) -> MediaRefresher {
        MediaRefresher::with_sources(
            db.clone(),
            cfg,
            primary.clone(),
            fallback.clone(),
            photos.clone(),
        )
    }

    #[tokio::test]
    async fn second_call_within_window_makes_no_network_calls() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = FakeSearch::with_hits("api", MediaSource::Api, &["https://v/1", "https://v/2"]);
        let feed = FakeSearch::empty("feed");
        let photos = FakeSearch::empty("photos");
        let r = refresher(&db, test_config(), &api, &feed, &photos);

        let first = r.refresh_if_stale(&RequestContext::at(7, t0()), 42, "Hades", false).await;
        assert_eq!(
            first,
            RefreshOutcome::Refreshed { added: 2, purged: 0, timed_out: false }
        );
        assert_eq!(api.calls(), 1);

        let later = RequestContext::at(7, t0() + Duration::hours(23));
        let second = r.refresh_if_stale(&later, 42, "Hades", false).await;
        assert_eq!(second, RefreshOutcome::Fresh);
        assert_eq!(api.calls(), 1);
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn stale_or_forced_refresh_hits_the_network() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = FakeSearch::with_hits("api", MediaSource::Api, &["https://v/1"]);
        let feed = FakeSearch::empty("feed");
        let photos = FakeSearch::empty("photos");
        let r = refresher(&db, test_config(), &api, &feed, &photos);
        let ctx = RequestContext::at(7, t0());

        r.refresh_if_stale(&ctx, 42, "Hades", false).await;
        r.refresh_if_stale(&ctx, 42, "Hades", true).await;
        assert_eq!(api.calls(), 2);

        let next_day = RequestContext::at(7, t0() + Duration::hours(25));
        r.refresh_if_stale(&next_day, 42, "Hades", false).await;
        assert_eq!(api.calls(), 3);
        assert_eq!(count_media(&db, MediaKind::Video, 7, 42).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn primary_results_short_circuit_the_feed() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = FakeSearch::with_hits("api", MediaSource::Api, &["https://v/1"]);
        let feed = FakeSearch::with_hits("feed", MediaSource::Rss, &["https://v/rss"]);
        let photos = FakeSearch::empty("photos");
        let r = refresher(&db, test_config(), &api, &feed, &photos);

        r.refresh_if_stale(&RequestContext::at(7, t0()), 42, "Hades", false).await;
        assert_eq!(feed.calls(), 0);
        let rows = recent_media(&db, MediaKind::Video, 7, 42, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, MediaSource::Api);
        assert_eq!(rows[0].title, "Watch");
    }

    #[tokio::test]
    async fn empty_primary_falls_back_to_feed() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = FakeSearch::empty("api");
        let feed = FakeSearch::with_hits("feed", MediaSource::Rss, &["https://v/rss"]);
        let photos = FakeSearch::empty("photos");
        let r = refresher(&db, test_config(), &api, &feed, &photos);

        let out = r.refresh_if_stale(&RequestContext::at(7, t0()), 42, "Hades", false).await;
        assert_eq!(out, RefreshOutcome::Refreshed { added: 1, purged: 0, timed_out: false });
        // every query variant tried against the api before the feed
        assert_eq!(api.calls(), 2);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_ladder_is_a_valid_empty_state() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = Arc::new(FakeSearch {
            fail: true,
            ..FakeSearch::new("api", MediaSource::Api, &[])
        });
        let feed = FakeSearch::empty("feed");
        let photos = FakeSearch::empty("photos");
        let r = refresher(&db, test_config(), &api, &feed, &photos);

        let out = r.refresh_if_stale(&RequestContext::at(7, t0()), 42, "Hades", false).await;
        assert_eq!(out, RefreshOutcome::Refreshed { added: 0, purged: 0, timed_out: false });
        // two rounds of two queries per source
        assert_eq!(api.calls(), 4);
        assert_eq!(feed.calls(), 4);
        assert_eq!(count_media(&db, MediaKind::Video, 7, 42).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_primary_is_never_called() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = Arc::new(FakeSearch {
            enabled: false,
            ..FakeSearch::new("api", MediaSource::Api, &["https://v/1"])
        });
        let feed = FakeSearch::with_hits("feed", MediaSource::Rss, &["https://v/rss"]);
        let photos = FakeSearch::empty("photos");
        let r = refresher(&db, test_config(), &api, &feed, &photos);

        r.refresh_if_stale(&RequestContext::at(7, t0()), 42, "Hades", false).await;
        assert_eq!(api.calls(), 0);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn net_disabled_is_a_noop() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = FakeSearch::with_hits("api", MediaSource::Api, &["https://v/1"]);
        let feed = FakeSearch::empty("feed");
        let photos = FakeSearch::empty("photos");
        let cfg = MediaConfig {
            net_disabled: true,
            ..test_config()
        };
        let r = refresher(&db, cfg, &api, &feed, &photos);
        let ctx = RequestContext::at(7, t0());

        assert_eq!(r.refresh_if_stale(&ctx, 42, "Hades", true).await, RefreshOutcome::Disabled);
        assert!(r.fetch_one_from_feed(&ctx, 42, "Hades").await.is_none());
        assert_eq!(api.calls() + feed.calls(), 0);
    }

    #[tokio::test]
    async fn refresh_purges_rows_past_retention() {
        let db = Db::connect_in_memory().await.unwrap();
        let old = MediaItem {
            owner_user_id: 7,
            game_id: 42,
            game_name: "Hades".into(),
            source: MediaSource::Api,
            title: "ancient".into(),
            canonical_url: "https://v/ancient".into(),
            thumbnail_url: None,
            published_at: None,
            fetched_at: t0() - Duration::days(120),
        };
        upsert_media(&db, MediaKind::Video, &old).await.unwrap();

        let api = FakeSearch::with_hits("api", MediaSource::Api, &["https://v/new"]);
        let feed = FakeSearch::empty("feed");
        let photos = FakeSearch::empty("photos");
        let r = refresher(&db, test_config(), &api, &feed, &photos);

        let out = r.refresh_if_stale(&RequestContext::at(7, t0()), 42, "Hades", false).await;
        assert_eq!(out, RefreshOutcome::Refreshed { added: 1, purged: 1, timed_out: false });
        let rows = recent_media(&db, MediaKind::Video, 7, 42, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].canonical_url, "https://v/new");
    }

    #[tokio::test]
    async fn budget_expiry_stops_the_ladder() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = Arc::new(FakeSearch {
            delay: Some(std::time::Duration::from_secs(5)),
            ..FakeSearch::new("api", MediaSource::Api, &["https://v/1"])
        });
        let feed = FakeSearch::empty("feed");
        let photos = FakeSearch::empty("photos");
        let cfg = MediaConfig {
            refresh_budget_secs: 1,
            ..test_config()
        };
        let r = refresher(&db, cfg, &api, &feed, &photos);

        let out = r.refresh_if_stale(&RequestContext::at(7, t0()), 42, "Hades", false).await;
        assert_eq!(out, RefreshOutcome::Refreshed { added: 0, purged: 0, timed_out: true });
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn photos_use_game_name_as_default_caption() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = FakeSearch::empty("api");
        let feed = FakeSearch::empty("feed");
        let photos = FakeSearch::with_hits("photos", MediaSource::Api, &["https://img/1.jpg", "https://img/2.jpg"]);
        let r = refresher(&db, test_config(), &api, &feed, &photos);
        let ctx = RequestContext::at(7, t0());

        let out = r.refresh_photos_if_stale(&ctx, 42, "Celeste", false).await;
        assert_eq!(out, RefreshOutcome::Refreshed { added: 2, purged: 0, timed_out: false });
        assert_eq!(photos.calls(), 1);
        let rows = recent_media(&db, MediaKind::Photo, 7, 42, 10).await.unwrap();
        assert!(rows.iter().all(|p| p.title == "Celeste"));

        assert_eq!(r.refresh_photos_if_stale(&ctx, 42, "Celeste", false).await, RefreshOutcome::Fresh);
        assert_eq!(photos.calls(), 1);
        // videos table has its own freshness
        assert_eq!(count_media(&db, MediaKind::Video, 7, 42).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn single_feed_fetch_is_persisted() {
        let db = Db::connect_in_memory().await.unwrap();
        let api = FakeSearch::empty("api");
        let feed = FakeSearch::with_hits("feed", MediaSource::Rss, &["", "https://v/rss1", "https://v/rss2"]);
        let photos = FakeSearch::empty("photos");
        let r = refresher(&db, test_config(), &api, &feed, &photos);

        // limit 1 returns only the blank url for every query
        assert!(r.fetch_one_from_feed(&RequestContext::at(7, t0()), 42, "Hades").await.is_none());
        assert_eq!(feed.calls(), 2);

        let feed = FakeSearch::with_hits("feed", MediaSource::Rss, &["https://v/rss1"]);
        let r = refresher(&db, test_config(), &api, &feed, &photos);
        let item = r
            .fetch_one_from_feed(&RequestContext::at(7, t0()), 42, "Hades")
            .await
            .unwrap();
        assert_eq!(item.source, MediaSource::Rss);
        assert_eq!(count_media(&db, MediaKind::Video, 7, 42).await.unwrap(), 1);
    }

    #[test]
    fn context_day_is_utc() {
        let ctx = RequestContext::at(1, Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap());
        assert_eq!(ctx.today(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}
