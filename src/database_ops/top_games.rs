use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::database_ops::db::Db;
use crate::normalization::title::slugify;

/// Ranked slots per user.
pub const MAX_TOP_GAMES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Game {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

/// One ranked favourite joined with its game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TopGame {
    pub rank: i64,
    pub game_id: i64,
    pub name: String,
    pub slug: String,
}

async fn upsert_game(conn: &mut SqliteConnection, slug: &str, name: &str) -> Result<Game> {
    let game: Game = sqlx::query_as(
        r#"
        INSERT INTO games (slug, name) VALUES (?, ?)
        ON CONFLICT (slug) DO UPDATE SET name = excluded.name
        RETURNING id, slug, name
        "#,
    )
    .bind(slug)
    .bind(name)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("upsert game {slug}"))?;
    Ok(game)
}

/// Look up or lazily create the game for a display name. `None` when the
/// name has no sluggable characters.
pub async fn ensure_game(db: &Db, name: &str) -> Result<Option<Game>> {
    let name = name.trim();
    let slug = slugify(name);
    if slug.is_empty() {
        return Ok(None);
    }
    let mut conn = db.pool.acquire().await?;
    Ok(Some(upsert_game(&mut *conn, &slug, name).await?))
}

/// Replace the user's ranked list wholesale. Blank names and names that
/// slug to an already listed game are skipped; at most five rows are kept
/// and ranks stay contiguous from 1.
#[instrument(skip(db, names))]
pub async fn replace_top_games<S: AsRef<str>>(
    db: &Db,
    user_id: i64,
    names: &[S],
) -> Result<Vec<TopGame>> {
    let mut tx = db.pool.begin().await?;
    sqlx::query("DELETE FROM user_top_games WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let mut seen = HashSet::new();
    let mut rank: i64 = 1;
    for raw in names {
        if rank as usize > MAX_TOP_GAMES {
            break;
        }
        let name = raw.as_ref().trim();
        let slug = slugify(name);
        if slug.is_empty() || !seen.insert(slug.clone()) {
            continue;
        }
        let game = upsert_game(&mut *tx, &slug, name).await?;
        sqlx::query("INSERT INTO user_top_games (user_id, game_id, rank) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(game.id)
            .bind(rank)
            .execute(&mut *tx)
            .await?;
        rank += 1;
    }
    tx.commit().await?;
    info!(user_id, stored = rank - 1, "top games replaced");

    load_top_games(db, user_id).await
}

/// Seed from profile favourites, but only for users with no ranked rows yet.
/// Returns whether anything was written.
pub async fn seed_top_games_if_missing<S: AsRef<str>>(
    db: &Db,
    user_id: i64,
    favorites: &[S],
) -> Result<bool> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_top_games WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&db.pool)
        .await?;
    if existing > 0 || favorites.iter().all(|f| slugify(f.as_ref()).is_empty()) {
        return Ok(false);
    }
    let stored = replace_top_games(db, user_id, favorites).await?;
    Ok(!stored.is_empty())
}

pub async fn load_top_games(db: &Db, user_id: i64) -> Result<Vec<TopGame>> {
    let rows: Vec<TopGame> = sqlx::query_as(
        r#"
        SELECT utg.rank AS rank, g.id AS game_id, g.name AS name, g.slug AS slug
        FROM user_top_games utg
        JOIN games g ON g.id = utg.game_id
        WHERE utg.user_id = ?
        ORDER BY utg.rank
        "#,
    )
    .bind(user_id)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows)
}
