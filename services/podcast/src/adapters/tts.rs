//! services/podcast/src/adapters/tts.rs
//!
//! This module contains the adapter for the bidirectional TTS service.
//! It implements the `TextToSpeechService` port from the `core` crate.

use async_trait::async_trait;
use bidirection_protocol::{BidirectionClient, TtsError};
use podcast_core::ports::{PortError, PortResult, TextToSpeechService};
use podcast_core::SynthesisRequest;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port over the bidirectional protocol.
#[derive(Clone)]
pub struct BidirectionTtsAdapter {
    client: BidirectionClient,
}

impl BidirectionTtsAdapter {
    /// Creates a new `BidirectionTtsAdapter`.
    pub fn new(client: BidirectionClient) -> Self {
        Self { client }
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for BidirectionTtsAdapter {
    async fn synthesize(&self, request: &SynthesisRequest) -> PortResult<Vec<u8>> {
        self.client.synthesize(request).await.map_err(to_port_error)
    }
}

fn to_port_error(error: TtsError) -> PortError {
    match error {
        TtsError::ServerRejected { .. } | TtsError::EmptyResult => PortError::Rejected(error.to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}
