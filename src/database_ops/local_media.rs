//! Read-only access to optional site tables: the local `videos` library used
//! as last-resort fallback, and per-platform `system_photos`.

use anyhow::Result;
use serde::Serialize;
use std::borrow::Cow;
use tracing::debug;

use crate::database_ops::db::{Capabilities, Db};
use crate::database_ops::media_cache::{MediaItem, MediaSource};
use crate::database_ops::media_filter::DailyPick;
use crate::database_ops::search::parse_published;
use crate::normalization::title::{like_patterns, slugify};
use crate::orchestrator::RequestContext;

/// Most rows either fallback reads.
pub const LOCAL_VIDEO_LIMIT: i64 = 10;
pub const SYSTEM_PHOTO_LIMIT: i64 = 40;

#[derive(sqlx::FromRow)]
struct LocalVideoRow {
    title: Option<String>,
    url: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SystemPhoto {
    pub url: String,
    pub caption: Option<String>,
}

impl DailyPick for SystemPhoto {
    fn pick_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.url.as_str())
    }
}

/// Site-local videos for a game: by `game_id` when the column exists, else by
/// name LIKE patterns; gameplay-only when the flag column exists. Rows are
/// shaped as `fallback-local` media items and never written to the cache.
pub async fn local_fallback_videos(
    db: &Db,
    caps: &Capabilities,
    ctx: &RequestContext,
    game_id: i64,
    game_name: &str,
) -> Result<Vec<MediaItem>> {
    if !caps.local_videos {
        return Ok(Vec::new());
    }
    let gameplay = if caps.videos_have_gameplay_flag {
        "AND is_gameplay = 1"
    } else {
        ""
    };

    let mut rows: Vec<LocalVideoRow> = Vec::new();
    if caps.videos_have_game_id {
        let sql = format!(
            "SELECT title, url, created_at FROM videos WHERE game_id = ? {gameplay} ORDER BY created_at DESC LIMIT ?"
        );
        rows = sqlx::query_as(&sql)
            .bind(game_id)
            .bind(LOCAL_VIDEO_LIMIT)
            .fetch_all(&db.pool)
            .await?;
    }
    if rows.is_empty() {
        let [p1, p2, p3] = like_patterns(game_name, &slugify(game_name));
        let sql = format!(
            "SELECT title, url, created_at FROM videos WHERE (title LIKE ? OR title LIKE ? OR title LIKE ?) {gameplay} ORDER BY created_at DESC LIMIT ?"
        );
        rows = sqlx::query_as(&sql)
            .bind(p1)
            .bind(p2)
            .bind(p3)
            .bind(LOCAL_VIDEO_LIMIT)
            .fetch_all(&db.pool)
            .await?;
    }

    let total = rows.len();
    let items: Vec<MediaItem> = rows
        .into_iter()
        .filter_map(|row| {
            let url = row.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
            Some(MediaItem {
                owner_user_id: ctx.user_id,
                game_id,
                game_name: game_name.to_string(),
                source: MediaSource::FallbackLocal,
                title: row
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "Watch".to_string()),
                canonical_url: url,
                thumbnail_url: None,
                published_at: row.created_at.as_deref().and_then(parse_published),
                fetched_at: ctx.now,
            })
        })
        .collect();
    debug!(game_id, rows = total, usable = items.len(), "local fallback videos");
    Ok(items)
}

/// Latest photos for a platform (by slug of the free-text platform name).
pub async fn system_photos(db: &Db, caps: &Capabilities, platform: &str) -> Result<Vec<SystemPhoto>> {
    let platform_slug = slugify(platform);
    if !caps.system_photos || platform_slug.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<SystemPhoto> = sqlx::query_as(
        "SELECT url, caption FROM system_photos WHERE platform_slug = ? AND url IS NOT NULL AND url <> '' ORDER BY created_at DESC LIMIT ?",
    )
    .bind(platform_slug)
    .bind(SYSTEM_PHOTO_LIMIT)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows)
}
