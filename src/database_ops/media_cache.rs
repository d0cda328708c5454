//! Per-user external media cache.
//!
//! Rows are keyed by (user, game, url); every write is an upsert so repeated or
//! concurrent refreshes of the same pair converge on one row per url.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::database_ops::db::Db;
use crate::database_ops::search::SearchHit;

/// Which cache table a row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Photo,
}

impl MediaKind {
    fn table(self) -> &'static str {
        match self {
            MediaKind::Video => "external_media_videos",
            MediaKind::Photo => "external_media_photos",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Photo => "photo",
        }
    }
}

/// Where a media reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaSource {
    /// Keyed search API (video or image search).
    Api,
    /// Unauthenticated feed search.
    Rss,
    /// Site-local table, never persisted in the cache.
    FallbackLocal,
}

impl MediaSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaSource::Api => "api",
            MediaSource::Rss => "rss",
            MediaSource::FallbackLocal => "fallback-local",
        }
    }

    /// Accepts the canonical labels plus the provider names older rows carry.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "api" | "youtube" | "bing" => Some(MediaSource::Api),
            "rss" | "youtube-rss" => Some(MediaSource::Rss),
            "fallback-local" | "local" => Some(MediaSource::FallbackLocal),
            _ => None,
        }
    }
}

/// A cached external video/photo reference tied to one user and one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub owner_user_id: i64,
    pub game_id: i64,
    pub game_name: String,
    pub source: MediaSource,
    /// Video title or photo caption.
    pub title: String,
    pub canonical_url: String,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

/// Owner of a batch of cache writes.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey<'a> {
    pub user_id: i64,
    pub game_id: i64,
    pub game_name: &'a str,
}

impl MediaItem {
    pub fn from_hit(key: CacheKey<'_>, hit: &SearchHit, fetched_at: DateTime<Utc>) -> Self {
        Self {
            owner_user_id: key.user_id,
            game_id: key.game_id,
            game_name: key.game_name.to_string(),
            source: hit.source,
            title: hit.title.clone(),
            canonical_url: hit.url.clone(),
            thumbnail_url: hit.thumbnail_url.clone(),
            published_at: hit.published_at,
            fetched_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MediaRow {
    user_id: i64,
    game_id: i64,
    game_name: String,
    source: String,
    title: String,
    url: String,
    thumb: Option<String>,
    published_at: Option<i64>,
    fetched_at: i64,
}

impl MediaRow {
    fn into_item(self) -> MediaItem {
        let source = MediaSource::parse(&self.source).unwrap_or_else(|| {
            debug!(source = %self.source, "unknown media source label; treating as api");
            MediaSource::Api
        });
        MediaItem {
            owner_user_id: self.user_id,
            game_id: self.game_id,
            game_name: self.game_name,
            source,
            title: self.title,
            canonical_url: self.url,
            thumbnail_url: self.thumb,
            published_at: self.published_at.and_then(from_unix),
            fetched_at: from_unix(self.fetched_at).unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Insert or refresh one cached reference. On conflict the title, thumbnail,
/// publish time and fetch time are replaced; the row count never grows.
pub async fn upsert_media(db: &Db, kind: MediaKind, item: &MediaItem) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO {table}
            (user_id, game_id, game_name, source, title, url, thumb, published_at, fetched_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, game_id, url) DO UPDATE SET
            title = excluded.title,
            thumb = excluded.thumb,
            published_at = excluded.published_at,
            fetched_at = excluded.fetched_at
        "#,
        table = kind.table()
    );
    sqlx::query(&sql)
        .bind(item.owner_user_id)
        .bind(item.game_id)
        .bind(&item.game_name)
        .bind(item.source.as_str())
        .bind(&item.title)
        .bind(&item.canonical_url)
        .bind(&item.thumbnail_url)
        .bind(item.published_at.map(|t| t.timestamp()))
        .bind(item.fetched_at.timestamp())
        .execute(&db.pool)
        .await
        .with_context(|| format!("upsert {} {}", kind.as_str(), item.canonical_url))?;
    Ok(())
}

/// Most recent fetch time for (user, game), if anything is cached.
pub async fn last_fetched_at(
    db: &Db,
    kind: MediaKind,
    user_id: i64,
    game_id: i64,
) -> Result<Option<DateTime<Utc>>> {
    let sql = format!(
        "SELECT MAX(fetched_at) FROM {} WHERE user_id = ? AND game_id = ?",
        kind.table()
    );
    let last: Option<i64> = sqlx::query_scalar(&sql)
        .bind(user_id)
        .bind(game_id)
        .fetch_one(&db.pool)
        .await?;
    Ok(last.and_then(from_unix))
}

/// Delete rows for (user, game) fetched strictly before `cutoff`.
#[instrument(skip(db))]
pub async fn purge_older_than(
    db: &Db,
    kind: MediaKind,
    user_id: i64,
    game_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<u64> {
    let sql = format!(
        "DELETE FROM {} WHERE user_id = ? AND game_id = ? AND fetched_at < ?",
        kind.table()
    );
    let res = sqlx::query(&sql)
        .bind(user_id)
        .bind(game_id)
        .bind(cutoff.timestamp())
        .execute(&db.pool)
        .await?;
    Ok(res.rows_affected())
}

/// Cached rows for (user, game), newest fetch first.
pub async fn recent_media(
    db: &Db,
    kind: MediaKind,
    user_id: i64,
    game_id: i64,
    limit: i64,
) -> Result<Vec<MediaItem>> {
    let sql = format!(
        r#"
        SELECT user_id, game_id, game_name, source, title, url, thumb, published_at, fetched_at
        FROM {}
        WHERE user_id = ? AND game_id = ?
        ORDER BY fetched_at DESC, published_at DESC, id DESC
        LIMIT ?
        "#,
        kind.table()
    );
    let rows: Vec<MediaRow> = sqlx::query_as(&sql)
        .bind(user_id)
        .bind(game_id)
        .bind(limit)
        .fetch_all(&db.pool)
        .await?;
    Ok(rows.into_iter().map(MediaRow::into_item).collect())
}

/// Cached rows for one user across several games, newest fetch first.
pub async fn recent_media_for_games(
    db: &Db,
    kind: MediaKind,
    user_id: i64,
    game_ids: &[i64],
    limit: i64,
) -> Result<Vec<MediaItem>> {
    if game_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; game_ids.len()].join(", ");
    let sql = format!(
        r#"
        SELECT user_id, game_id, game_name, source, title, url, thumb, published_at, fetched_at
        FROM {}
        WHERE user_id = ? AND game_id IN ({})
        ORDER BY fetched_at DESC, published_at DESC, id DESC
        LIMIT ?
        "#,
        kind.table(),
        placeholders
    );
    let mut query = sqlx::query_as::<_, MediaRow>(&sql).bind(user_id);
    for game_id in game_ids {
        query = query.bind(*game_id);
    }
    let rows = query.bind(limit).fetch_all(&db.pool).await?;
    Ok(rows.into_iter().map(MediaRow::into_item).collect())
}

pub async fn count_media(db: &Db, kind: MediaKind, user_id: i64, game_id: i64) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE user_id = ? AND game_id = ?",
        kind.table()
    );
    let n: i64 = sqlx::query_scalar(&sql)
        .bind(user_id)
        .bind(game_id)
        .fetch_one(&db.pool)
        .await?;
    Ok(n)
}
