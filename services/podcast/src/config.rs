//! services/podcast/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Command-line flags are applied on top
//! by the binary.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bidirection_protocol::{DEFAULT_ENDPOINT, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_RECEIVE_TIMEOUT};
use podcast_core::{AudioFormat, AudioParams};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub app_id: String,
    pub access_token: String,
    pub endpoint: String,
    pub audio: AudioParams,
    pub receive_timeout: Duration,
    pub max_frame_bytes: usize,
    pub log_level: Level,
    pub log_dir: PathBuf,
    pub voice_map_path: Option<PathBuf>,
    pub concurrency: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app_id", &self.app_id)
            .field("access_token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("audio", &self.audio)
            .field("receive_timeout", &self.receive_timeout)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .field("log_level", &self.log_level)
            .field("log_dir", &self.log_dir)
            .field("voice_map_path", &self.voice_map_path)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        // --- Service credentials and endpoint ---
        let app_id = required("TTS_APP_ID")?;
        let access_token = required("TTS_ACCESS_TOKEN")?;
        let endpoint = lookup("TTS_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        // --- Audio output ---
        let format = match lookup("TTS_AUDIO_FORMAT") {
            Some(raw) => raw
                .parse::<AudioFormat>()
                .map_err(|e| ConfigError::InvalidValue("TTS_AUDIO_FORMAT".to_string(), e))?,
            None => AudioFormat::Mp3,
        };
        let sample_rate = parse_or(&lookup, "TTS_SAMPLE_RATE", 24_000u32)?;

        // --- Protocol limits ---
        let timeout_secs = parse_or(&lookup, "TTS_RECEIVE_TIMEOUT_SECS", DEFAULT_RECEIVE_TIMEOUT.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "TTS_RECEIVE_TIMEOUT_SECS".to_string(),
                "must be at least 1 second".to_string(),
            ));
        }
        let max_frame_bytes = parse_or(&lookup, "TTS_MAX_FRAME_BYTES", DEFAULT_MAX_MESSAGE_SIZE)?;

        // --- Logging ---
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;
        let log_dir = lookup("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));

        // --- Batch settings ---
        let voice_map_path = lookup("VOICE_MAP_PATH").map(PathBuf::from);
        let concurrency = parse_or(&lookup, "BATCH_CONCURRENCY", 1usize)?;
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "BATCH_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            app_id,
            access_token,
            endpoint,
            audio: AudioParams { format, sample_rate },
            receive_timeout: Duration::from_secs(timeout_secs),
            max_frame_bytes,
            log_level,
            log_dir,
            voice_map_path,
            concurrency,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
