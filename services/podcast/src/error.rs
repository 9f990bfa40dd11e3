//! services/podcast/src/error.rs
//!
//! Defines the primary error type for the podcast service.

use crate::config::ConfigError;
use crate::voices::VoiceBookError;
use podcast_core::ports::PortError;

/// The primary error type for the `podcast` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The speaker-to-voice mapping could not be loaded.
    #[error("Voice book error: {0}")]
    VoiceBook(#[from] VoiceBookError),

    /// Represents a standard Input/Output error (e.g., creating the output directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
