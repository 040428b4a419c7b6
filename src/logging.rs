//! File logging for the runner.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "HOMEDECK_LOG";
const LOG_FILE_PREFIX: &str = "homedeck.log";

pub fn default_log_dir() -> Result<PathBuf> {
  Ok(crate::config::data_dir()?.join("logs"))
}

/// Install the global subscriber writing to a daily rolling file in `dir`.
///
/// Keep the returned guard alive for as long as logs should be written.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
