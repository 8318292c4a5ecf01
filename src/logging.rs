//! Logging setup.
//!
//! `RUST_LOG` takes precedence over the configured filter. When a log
//! directory is configured, a daily-rolling file is written next to the
//! console output.

use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of the rolling log files
pub const LOG_FILE_PREFIX: &str = "datavis-core.log";

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for as long as file logging should be
/// flushed. Calling this more than once leaves the first subscriber active.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
    if let Err(e) = result {
        tracing::debug!("Logging already initialized: {}", e);
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_falls_back() {
        let config = LoggingConfig {
            filter: "[not a filter".to_string(),
            directory: None,
        };
        // Only checks that building the filter does not panic.
        let _ = env_filter(&config);
        assert!(init(&config).is_none());
    }
}
