use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use crate::util::env::env_opt;

/// Filter used by the binaries when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,playerpath_media=debug,sqlx=warn";

/// Line layout for log output, picked with `MEDIA_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Target, file line and span context on every event.
    #[default]
    Full,
    /// One short line per event; handy for cron output.
    Compact,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" | "pretty" => Some(LogFormat::Full),
            "compact" | "short" => Some(LogFormat::Compact),
            _ => None,
        }
    }

    pub fn from_env() -> Self {
        env_opt("MEDIA_LOG_FORMAT")
            .and_then(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

/// Installs the global subscriber. Events go to stderr so stdout stays free
/// for the JSON the CLI prints; `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match LogFormat::from_env() {
        LogFormat::Full => builder
            .with_target(true)
            .with_line_number(true)
            .try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
