//! Structured logging setup for the rekey controller

use std::str::FromStr;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line (for production)
    Json,
    /// Human-readable output (for development)
    #[default]
    Console,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "console" | "pretty" | "text" => Ok(LogFormat::Console),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// `RUST_LOG` wins over the configured default level
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber
///
/// Fails if a subscriber is already installed, which callers embedding
/// the controller in a larger process may ignore.
pub fn try_init(
    service_name: &str,
    default_level: &str,
    format: LogFormat,
) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(default_level));

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init()?,
        LogFormat::Console => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
    }

    tracing::info!(service = service_name, format = ?format, "Logging initialized");
    Ok(())
}

/// Initialize JSON logging, keeping any subscriber that is already set
pub fn init_logging(service_name: &str, default_level: &str) {
    let _ = try_init(service_name, default_level, LogFormat::Json);
}

/// Initialize console logging, keeping any subscriber that is already set
pub fn init_console_logging(service_name: &str, default_level: &str) {
    let _ = try_init(service_name, default_level, LogFormat::Console);
}
