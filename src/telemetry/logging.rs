//! `tracing` initialization.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to install global tracing subscriber: {0}")]
    Install(String),
}

/// Install a global `tracing` subscriber. `RUST_LOG` overrides
/// `settings.level` when set, matching the env-filter convention used
/// throughout the teacher's own logging.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LogError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if settings.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    result.map_err(|e| LogError::Install(e.to_string()))
}
