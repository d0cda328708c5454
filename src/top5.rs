//! Per-user Top-5 showcase: ranked favourites, each with a featured video of
//! the day and a daily photo strip, plus cross-game daily mixes and an
//! optional platform ribbon.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::database_ops::db::Capabilities;
use crate::database_ops::local_media::{local_fallback_videos, system_photos, SystemPhoto};
use crate::database_ops::media_cache::{
    recent_media, recent_media_for_games, MediaItem, MediaKind,
};
use crate::database_ops::media_filter::{
    pick_daily, PHOTO_DAILY, PHOTO_MIX, SYSTEM_RIBBON, VIDEO_DAILY, VIDEO_MIX,
};
use crate::database_ops::top_games::{load_top_games, seed_top_games_if_missing, TopGame};
use crate::database_ops::youtube::video_id_from_url;
use crate::orchestrator::{MediaRefresher, RefreshOutcome, RequestContext};

/// Cached videos considered for the featured pick.
const VIDEO_POOL: i64 = 80;
/// Latest cached photos considered for the strip.
const PHOTO_POOL: i64 = 18;
const PHOTOS_SHOWN: usize = 6;
const RIBBON_SHOWN: usize = 5;
const PHOTO_MIX_POOL: i64 = 80;
const PHOTO_MIX_SHOWN: usize = 8;
const VIDEO_MIX_POOL: i64 = 60;
const VIDEO_MIX_SHOWN: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct GameShowcase {
    pub rank: i64,
    pub game_id: i64,
    pub name: String,
    pub slug: String,
    pub featured: Option<MediaItem>,
    pub video_count: usize,
    pub photos: Vec<MediaItem>,
    pub refresh: RefreshOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct Top5Page {
    pub user_id: i64,
    pub day: NaiveDate,
    pub games: Vec<GameShowcase>,
    /// Daily photos drawn from every ranked game.
    pub photo_mix: Vec<MediaItem>,
    /// Daily videos drawn from every ranked game, one per distinct video.
    pub video_mix: Vec<MediaItem>,
    pub platform: Option<String>,
    pub system_photos: Vec<SystemPhoto>,
}

/// Refresh result for one ranked game.
#[derive(Debug, Clone, Serialize)]
pub struct GameRefresh {
    pub rank: i64,
    pub game_id: i64,
    pub name: String,
    pub videos: RefreshOutcome,
    pub photos: RefreshOutcome,
}

/// Newest-first pool collapsed to one row per YouTube video (urls without
/// an id count as their own video), capped at `cap`.
fn distinct_videos(pool: Vec<MediaItem>, cap: usize) -> Vec<MediaItem> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in pool {
        if out.len() >= cap {
            break;
        }
        let url = item.canonical_url.trim();
        if url.is_empty() {
            continue;
        }
        let key = video_id_from_url(url).unwrap_or_else(|| url.to_string());
        if seen.insert(key) {
            out.push(item);
        }
    }
    out
}

#[derive(Clone)]
pub struct Top5Service {
    refresher: MediaRefresher,
    caps: Capabilities,
}

impl Top5Service {
    pub fn new(refresher: MediaRefresher, caps: Capabilities) -> Self {
        Self { refresher, caps }
    }

    /// Seed the ranked list from `favorites` if the user has none yet, then
    /// assemble every ranked game in order.
    #[instrument(skip(self, ctx, favorites), fields(user_id = ctx.user_id))]
    pub async fn build_showcase<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        favorites: &[S],
        platform: Option<&str>,
    ) -> Result<Top5Page> {
        let db = self.refresher.db();
        match seed_top_games_if_missing(db, ctx.user_id, favorites).await {
            Ok(true) => info!(user_id = ctx.user_id, "seeded top games from favourites"),
            Ok(false) => {}
            Err(e) => warn!(user_id = ctx.user_id, error = ?e, "seeding top games failed"),
        }

        let tops = load_top_games(db, ctx.user_id).await?;
        let mut games = Vec::with_capacity(tops.len());
        for top in &tops {
            games.push(self.showcase_game(ctx, top).await?);
        }
        let game_ids: Vec<i64> = tops.iter().map(|t| t.game_id).collect();
        let photo_mix = self.photo_mix(ctx, &game_ids).await;
        let video_mix = self.video_mix(ctx, &game_ids).await;

        let platform = platform.map(str::trim).filter(|p| !p.is_empty());
        let ribbon = match platform {
            Some(p) => match system_photos(db, &self.caps, p).await {
                Ok(pool) => {
                    pick_daily(pool, ctx.today(), ctx.user_id, 0, SYSTEM_RIBBON, RIBBON_SHOWN)
                }
                Err(e) => {
                    warn!(platform = p, error = ?e, "system photos unavailable");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(Top5Page {
            user_id: ctx.user_id,
            day: ctx.today(),
            games,
            photo_mix,
            video_mix,
            platform: platform.map(str::to_string),
            system_photos: ribbon,
        })
    }

    async fn photo_mix(&self, ctx: &RequestContext, game_ids: &[i64]) -> Vec<MediaItem> {
        let db = self.refresher.db();
        match recent_media_for_games(db, MediaKind::Photo, ctx.user_id, game_ids, PHOTO_MIX_POOL)
            .await
        {
            Ok(pool) => pick_daily(pool, ctx.today(), ctx.user_id, 0, PHOTO_MIX, PHOTO_MIX_SHOWN),
            Err(e) => {
                warn!(error = ?e, "photo mix unavailable");
                Vec::new()
            }
        }
    }

    async fn video_mix(&self, ctx: &RequestContext, game_ids: &[i64]) -> Vec<MediaItem> {
        let db = self.refresher.db();
        match recent_media_for_games(db, MediaKind::Video, ctx.user_id, game_ids, VIDEO_MIX_POOL)
            .await
        {
            Ok(pool) => {
                let picks = distinct_videos(pool, VIDEO_MIX_SHOWN);
                let n = picks.len();
                pick_daily(picks, ctx.today(), ctx.user_id, 0, VIDEO_MIX, n)
            }
            Err(e) => {
                warn!(error = ?e, "video mix unavailable");
                Vec::new()
            }
        }
    }

    /// One game card. Falls through cache, a forced refresh (only when the
    /// first pass did not already run the ladder), a single feed lookup and
    /// finally the site's own videos. The network steps share one deadline.
    pub async fn showcase_game(
        &self,
        ctx: &RequestContext,
        top: &TopGame,
    ) -> Result<GameShowcase> {
        let db = self.refresher.db();
        let (game_id, name) = (top.game_id, top.name.as_str());
        let deadline = Instant::now() + self.refresher.config().refresh_budget();

        let mut refresh = self.refresher.refresh_if_stale(ctx, game_id, name, false).await;
        let mut videos =
            recent_media(db, MediaKind::Video, ctx.user_id, game_id, VIDEO_POOL).await?;

        let mut on_the_fly = None;
        if videos.is_empty() {
            let rescue = async {
                if matches!(refresh, RefreshOutcome::Fresh | RefreshOutcome::Failed) {
                    debug!(game_id, "no cached videos; forcing refresh");
                    refresh = self.refresher.refresh_if_stale(ctx, game_id, name, true).await;
                    let reread =
                        recent_media(db, MediaKind::Video, ctx.user_id, game_id, VIDEO_POOL)
                            .await?;
                    if !reread.is_empty() {
                        return Ok::<_, anyhow::Error>((reread, None));
                    }
                }
                let found = self.refresher.fetch_one_from_feed(ctx, game_id, name).await;
                Ok::<_, anyhow::Error>((found.iter().cloned().collect(), found))
            };
            match timeout_at(deadline, rescue).await {
                Ok(res) => {
                    (videos, on_the_fly) = res?;
                }
                Err(_) => warn!(game_id, "video lookup deadline reached"),
            }
        }
        if videos.is_empty() {
            videos = local_fallback_videos(db, &self.caps, ctx, game_id, name)
                .await
                .unwrap_or_else(|e| {
                    warn!(game_id, error = ?e, "local video fallback failed");
                    Vec::new()
                });
        }

        self.refresher
            .refresh_photos_if_stale(ctx, game_id, name, false)
            .await;

        let video_count = videos.len();
        let featured = match on_the_fly {
            Some(item) => Some(item),
            None => pick_daily(videos, ctx.today(), ctx.user_id, game_id, VIDEO_DAILY, 1)
                .into_iter()
                .next(),
        };

        let photo_pool =
            recent_media(db, MediaKind::Photo, ctx.user_id, game_id, PHOTO_POOL).await?;
        let photos = pick_daily(
            photo_pool,
            ctx.today(),
            ctx.user_id,
            game_id,
            PHOTO_DAILY,
            PHOTOS_SHOWN,
        );

        debug!(
            game_id,
            video_count,
            photos = photos.len(),
            featured = featured.is_some(),
            "game showcase ready"
        );
        Ok(GameShowcase {
            rank: top.rank,
            game_id,
            name: top.name.clone(),
            slug: top.slug.clone(),
            featured,
            video_count,
            photos,
            refresh,
        })
    }

    /// Refresh videos and photos for every ranked game, one after another.
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id))]
    pub async fn refresh_all(
        &self,
        ctx: &RequestContext,
        force: bool,
    ) -> Result<Vec<GameRefresh>> {
        let mut out = Vec::new();
        for top in load_top_games(self.refresher.db(), ctx.user_id).await? {
            let videos = self
                .refresher
                .refresh_if_stale(ctx, top.game_id, &top.name, force)
                .await;
            let photos = self
                .refresher
                .refresh_photos_if_stale(ctx, top.game_id, &top.name, force)
                .await;
            out.push(GameRefresh {
                rank: top.rank,
                game_id: top.game_id,
                name: top.name,
                videos,
                photos,
            });
        }
        Ok(out)
    }
}
