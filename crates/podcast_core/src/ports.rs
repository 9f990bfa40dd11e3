//! crates/podcast_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the podcast pipeline.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the TTS wire protocol, document formats and audio codecs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use crate::domain::{DialogueLine, SynthesisRequest};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (network, files, codecs).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unsupported input: {0}")]
    Unsupported(String),
    #[error("Rejected by the service: {0}")]
    Rejected(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Synthesizes the request's text into encoded audio bytes.
    async fn synthesize(&self, request: &SynthesisRequest) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait DialogueSource: Send + Sync {
    /// Reads a script document and returns its spoken lines in order.
    async fn load_dialogue(&self, path: &Path) -> PortResult<Vec<DialogueLine>>;
}

#[async_trait]
pub trait AudioMerger: Send + Sync {
    /// Concatenates the given segment files, in order, into `output`.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> PortResult<()>;
}
