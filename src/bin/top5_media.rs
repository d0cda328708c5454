use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use playerpath_media::config::MediaConfig;
use playerpath_media::database_ops::db::{Capabilities, Db};
use playerpath_media::database_ops::top_games::replace_top_games;
use playerpath_media::logging::{init_tracing, DEFAULT_FILTER};
use playerpath_media::orchestrator::{MediaRefresher, RequestContext};
use playerpath_media::top5::Top5Service;
use playerpath_media::util::env;
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "top5_media", version, about = "PlayerPath top-5 media cache CLI")]
struct Cli {
    /// Optional override for the database URL
    #[arg(long, global = true)]
    db_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Replace a user's ranked top-5 list
    Seed {
        #[arg(long)]
        user: i64,
        /// Game names in rank order (repeat the flag; extras past five are ignored)
        #[arg(long = "game", required = true)]
        games: Vec<String>,
    },
    /// Refresh cached videos and photos for every ranked game
    Refresh {
        #[arg(long)]
        user: i64,
        /// Ignore the staleness window
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print today's showcase as JSON
    Show {
        #[arg(long)]
        user: i64,
        /// Favourites used to seed an empty list
        #[arg(long = "favorite")]
        favorites: Vec<String>,
        /// Platform name for the system photo ribbon
        #[arg(long)]
        platform: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;
    env::preflight_check("top5_media", &MediaConfig::LOGGED_KEYS);

    let cli = Cli::parse();
    let db_url = cli.db_url.clone().unwrap_or_else(env::db_url);
    let max_connections: u32 = env::env_parse("DB_MAX_CONNECTIONS", 5);
    let db = Db::connect(&db_url, max_connections)
        .await
        .context("open media store")?;

    let cfg = MediaConfig::from_env();
    let caps = Capabilities::resolve(&db, &cfg).await?;
    let refresher = MediaRefresher::new(db.clone(), cfg)?;
    let service = Top5Service::new(refresher, caps);

    match cli.command {
        Commands::Seed { user, games } => {
            let stored = replace_top_games(&db, user, &games).await?;
            info!(user_id = user, stored = stored.len(), "top games seeded");
            print_json(&stored)
        }
        Commands::Refresh { user, force } => {
            let report = service
                .refresh_all(&RequestContext::new(user), force)
                .await?;
            print_json(&report)
        }
        Commands::Show {
            user,
            favorites,
            platform,
        } => {
            let page = service
                .build_showcase(&RequestContext::new(user), &favorites, platform.as_deref())
                .await?;
            print_json(&page)
        }
    }
}
