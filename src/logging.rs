//! Tracing subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Installs the global subscriber at `[log] level` (default `info`).
/// `RUST_LOG` takes precedence when set.
pub fn init(config: &Config) -> Result<(), LogError> {
    let level = config
        .get_option("log", "level", Some("info"))
        .unwrap_or_default();
    init_with_level(&level)
}

pub fn init_with_level(level: &str) -> Result<(), LogError> {
    let filter = build_filter(level)?;
    let fmt_layer = fmt::layer().with_target(true).compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}

fn build_filter(level: &str) -> Result<EnvFilter, LogError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = level.trim().to_ascii_lowercase();
    EnvFilter::try_new(&directive).map_err(|e| LogError::InvalidFilter {
        filter: directive,
        reason: e.to_string(),
    })
}
