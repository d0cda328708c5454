//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

/// Fallback store when no database URL is configured.
pub const DEFAULT_DB_URL: &str = "sqlite:playerpath.db?mode=rwc";

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            // Fallback to the crate root so `cargo run --bin` works from anywhere.
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    env_flag_opt(key).unwrap_or(default)
}

/// Tri-state flag: `None` when unset, so callers can fall back to probing.
pub fn env_flag_opt(key: &str) -> Option<bool> {
    init_env();
    std::env::var(key).ok().map(|raw| {
        let v = raw.trim().to_ascii_lowercase();
        matches!(v.as_str(), "1" | "true" | "on" | "yes")
    })
}

/// Database URL (specific -> generic), defaulting to a local SQLite file.
pub fn db_url() -> String {
    for k in ["PLAYERPATH_DB_URL", "DATABASE_URL"] {
        if let Some(v) = env_opt(k) {
            return v;
        }
    }
    info!(target = "env", default = DEFAULT_DB_URL, "no database URL set; using default");
    DEFAULT_DB_URL.to_string()
}

fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD") || k.contains("SECRET") || k.contains("KEY") || k.contains("TOKEN")
    {
        return if val.is_empty() {
            String::new()
        } else {
            "***".to_string()
        };
    }

    let val_trim = val.trim();
    if k.contains("URL") {
        if let Ok(mut u) = url::Url::parse(val_trim) {
            if u.password().is_some() {
                let _ = u.set_password(Some("***"));
                return u.to_string();
            }
        }
    }
    val_trim.to_string()
}

/// Log a consolidated, redacted snapshot of the given keys.
pub fn preflight_check(title: &str, also_log: &[&str]) {
    init_env();
    let snapshot: Vec<(String, String)> = also_log
        .iter()
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
}
