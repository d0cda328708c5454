use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::MediaConfig;

/// Tables owned by this crate. Everything else (users, profiles, local
/// `videos`, `system_photos`) belongs to the wider site and is only read.
const SCHEMA: [&str; 7] = [
    r#"
    CREATE TABLE IF NOT EXISTS games (
        id    INTEGER PRIMARY KEY AUTOINCREMENT,
        slug  TEXT NOT NULL UNIQUE,
        name  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_top_games (
        user_id  INTEGER NOT NULL,
        game_id  INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
        rank     INTEGER NOT NULL CHECK (rank BETWEEN 1 AND 5),
        PRIMARY KEY (user_id, rank),
        UNIQUE (user_id, game_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS external_media_videos (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id       INTEGER NOT NULL,
        game_id       INTEGER NOT NULL,
        game_name     TEXT NOT NULL,
        source        TEXT NOT NULL,
        title         TEXT NOT NULL,
        url           TEXT NOT NULL,
        thumb         TEXT,
        published_at  INTEGER,
        fetched_at    INTEGER NOT NULL,
        UNIQUE (user_id, game_id, url)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_emv_user_game_time ON external_media_videos (user_id, game_id, fetched_at)",
    r#"
    CREATE TABLE IF NOT EXISTS external_media_photos (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id       INTEGER NOT NULL,
        game_id       INTEGER NOT NULL,
        game_name     TEXT NOT NULL,
        source        TEXT NOT NULL,
        title         TEXT NOT NULL,
        url           TEXT NOT NULL,
        thumb         TEXT,
        published_at  INTEGER,
        fetched_at    INTEGER NOT NULL,
        UNIQUE (user_id, game_id, url)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_emp_user_game_time ON external_media_photos (user_id, game_id, fetched_at)",
    "CREATE INDEX IF NOT EXISTS idx_utg_user ON user_top_games (user_id, rank)",
];

/// Single shared handle to the store; clone it freely, the pool is reference counted.
#[derive(Clone, Debug)]
pub struct Db {
    pub pool: SqlitePool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid database url")?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .context("connect to media store")?;
        info!("connected to db");

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Private in-memory store. One connection that never expires, since every
    /// SQLite `:memory:` connection is its own database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .with_context(|| format!("schema statement failed: {}", stmt.trim()))?;
        }
        debug!(statements = SCHEMA.len(), "schema ensured");
        Ok(())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}

/// Optional site tables, resolved once at startup and handed to whoever needs them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Site-local `videos` table usable as last-resort fallback.
    pub local_videos: bool,
    pub videos_have_game_id: bool,
    pub videos_have_gameplay_flag: bool,
    /// Per-platform `system_photos` ribbon.
    pub system_photos: bool,
}

impl Capabilities {
    /// Probe the schema, honoring explicit config overrides.
    #[instrument(skip_all)]
    pub async fn resolve(db: &Db, cfg: &MediaConfig) -> Result<Self> {
        let local_videos = match cfg.local_videos {
            Some(forced) => forced && db.table_exists("videos").await?,
            None => db.table_exists("videos").await?,
        };
        let (videos_have_game_id, videos_have_gameplay_flag) = if local_videos {
            (
                db.column_exists("videos", "game_id").await?,
                db.column_exists("videos", "is_gameplay").await?,
            )
        } else {
            (false, false)
        };
        let system_photos = match cfg.system_photos {
            Some(forced) => forced && db.table_exists("system_photos").await?,
            None => db.table_exists("system_photos").await?,
        };

        let caps = Self {
            local_videos,
            videos_have_game_id,
            videos_have_gameplay_flag,
            system_photos,
        };
        info!(capabilities = ?caps, "resolved schema capabilities");
        Ok(caps)
    }
}
