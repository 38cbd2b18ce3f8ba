use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{EtlError, Result};

/// Initializes console logging (stderr, so progress lines on stdout stay
/// readable) and, when `log_dir` is set, a daily-rolled JSON log file.
///
/// The returned guard must be held until exit so buffered file logs flush.
/// An unusable `log_dir` is a configuration error.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| {
                EtlError::Config(format!("Failed to create log directory '{dir}': {e}"))
            })?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("disaster_etl.log")
                .build(dir)
                .map_err(|e| {
                    EtlError::Config(format!("Failed to open log file in '{dir}': {e}"))
                })?;
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            (
                Some(fmt::layer().json().with_writer(non_blocking_writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    // RUST_LOG wins; otherwise the configured level for this crate, warn for dependencies
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("disaster_etl={},warn", config.level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(guard)
}
