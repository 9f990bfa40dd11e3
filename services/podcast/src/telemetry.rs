//! services/podcast/src/telemetry.rs
//!
//! Logging setup: console output plus a plain-text daily log file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::AppError;

/// `LOG_DIR/podcast_YYYYMMDD.log` for the given local date.
pub fn log_file_path(log_dir: &Path, date: chrono::NaiveDate) -> PathBuf {
    log_dir.join(format!("podcast_{}.log", date.format("%Y%m%d")))
}

/// Installs the global subscriber and returns the log file in use.
pub fn init(level: Level, log_dir: &Path) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir, chrono::Local::now().date_naive());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(level.to_string()))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .map_err(|e| AppError::Internal(format!("Failed to install the log subscriber: {}", e)))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_files_are_named_by_day() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            log_file_path(Path::new("logs"), date),
            PathBuf::from("logs/podcast_20240307.log")
        );
    }
}
