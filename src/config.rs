use chrono::Duration as ChronoDuration;
use std::time::Duration;

use crate::util::env::{env_flag, env_flag_opt, env_opt, env_parse};

/// Runtime settings for the external media cache, resolved once at startup.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub youtube_api_key: Option<String>,
    pub bing_api_key: Option<String>,
    pub youtube_api_base: String,
    pub youtube_feed_base: String,
    pub bing_api_base: String,
    /// Hard switch for every outbound fetch.
    pub net_disabled: bool,
    pub http_timeout_secs: u64,
    /// Total wall-clock allowance for one (user, game) refresh ladder.
    pub refresh_budget_secs: u64,
    pub ladder_rounds: usize,
    pub max_queries: usize,
    pub stale_after_hours: i64,
    pub retention_days: i64,
    /// Results requested per API call.
    pub page_size: u32,
    /// `Some(..)` forces the `videos` capability, `None` probes the schema.
    pub local_videos: Option<bool>,
    pub system_photos: Option<bool>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            youtube_api_key: None,
            bing_api_key: None,
            youtube_api_base: "https://www.googleapis.com/youtube/v3".into(),
            youtube_feed_base: "https://www.youtube.com/feeds/videos.xml".into(),
            bing_api_base: "https://api.bing.microsoft.com/v7.0".into(),
            net_disabled: false,
            http_timeout_secs: 20,
            refresh_budget_secs: 30,
            ladder_rounds: 2,
            max_queries: 6,
            stale_after_hours: 24,
            retention_days: 90,
            page_size: 25,
            local_videos: None,
            system_photos: None,
        }
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            youtube_api_key: env_opt("YT_API_KEY"),
            bing_api_key: env_opt("BING_API_KEY"),
            youtube_api_base: env_opt("YT_API_BASE").unwrap_or(d.youtube_api_base),
            youtube_feed_base: env_opt("YT_FEED_BASE").unwrap_or(d.youtube_feed_base),
            bing_api_base: env_opt("BING_API_BASE").unwrap_or(d.bing_api_base),
            net_disabled: env_flag("MEDIA_NET_DISABLED", d.net_disabled),
            http_timeout_secs: env_parse("MEDIA_HTTP_TIMEOUT_SECS", d.http_timeout_secs).max(1),
            refresh_budget_secs: env_parse("MEDIA_REFRESH_BUDGET_SECS", d.refresh_budget_secs)
                .max(1),
            ladder_rounds: env_parse("MEDIA_REFRESH_ROUNDS", d.ladder_rounds).max(1),
            max_queries: env_parse("MEDIA_MAX_QUERIES", d.max_queries).max(1),
            stale_after_hours: env_parse("MEDIA_STALE_HOURS", d.stale_after_hours).max(0),
            retention_days: env_parse("MEDIA_RETENTION_DAYS", d.retention_days).max(1),
            page_size: env_parse("MEDIA_PAGE_SIZE", d.page_size).clamp(1, 50),
            local_videos: env_flag_opt("MEDIA_LOCAL_VIDEOS"),
            system_photos: env_flag_opt("MEDIA_SYSTEM_PHOTOS"),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn refresh_budget(&self) -> Duration {
        Duration::from_secs(self.refresh_budget_secs)
    }

    pub fn stale_after(&self) -> ChronoDuration {
        ChronoDuration::hours(self.stale_after_hours)
    }

    pub fn retention(&self) -> ChronoDuration {
        ChronoDuration::days(self.retention_days)
    }

    /// Env keys worth echoing at startup (values are redacted by the logger).
    pub const LOGGED_KEYS: [&'static str; 10] = [
        "PLAYERPATH_DB_URL",
        "DATABASE_URL",
        "YT_API_KEY",
        "BING_API_KEY",
        "MEDIA_NET_DISABLED",
        "MEDIA_HTTP_TIMEOUT_SECS",
        "MEDIA_REFRESH_BUDGET_SECS",
        "MEDIA_REFRESH_ROUNDS",
        "MEDIA_STALE_HOURS",
        "MEDIA_RETENTION_DAYS",
    ];
}
