//! Logging setup
//!
//! Everything goes to `gpoctl.log` in the configured directory (the
//! executable's directory by default). Warnings and errors are also echoed
//! to stderr.

use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{executable_dir, LoggingConfig};

pub const LOG_FILE_NAME: &str = "gpoctl.log";

fn log_dir(config: &LoggingConfig) -> PathBuf {
    config.directory.clone().unwrap_or_else(executable_dir)
}

/// `RUST_LOG` when set, else the configured level, else `info`.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns a guard that must be kept alive for the duration of the program
/// to ensure all logs are flushed to disk.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(log_dir(config), LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter(config));

    let stderr_layer = fmt::layer()
        .compact()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_prefers_config() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            directory: Some(PathBuf::from("/var/log/gpoctl")),
        };
        assert_eq!(log_dir(&config), PathBuf::from("/var/log/gpoctl"));
        assert_eq!(log_dir(&LoggingConfig::default()), executable_dir());
    }
}
