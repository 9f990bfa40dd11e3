//! crates/bidirection_protocol/src/error.rs
//!
//! Error taxonomy of one synthesis call. None of these are retried by the client.

use crate::events::EventType;
use crate::frame::FrameError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// The transport could not be established.
    #[error("Could not connect to {endpoint}: {source}")]
    ConnectFailure {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    /// The awaited event never arrived: the wait timed out, the stream closed,
    /// or the transport failed while reading.
    #[error("Gave up waiting for {expected:?}: {reason}")]
    ProtocolTimeout { expected: EventType, reason: String },

    /// The service answered with an error frame or a failure event.
    #[error("Synthesis rejected by the server (code {code:?}): {payload}")]
    ServerRejected { code: Option<u32>, payload: String },

    /// The session finished without a single audio chunk.
    #[error("The session finished without producing audio")]
    EmptyResult,

    /// An inbound frame could not be decoded.
    #[error("Malformed frame: {0}")]
    FrameDecode(#[from] FrameError),

    /// An outbound frame could not be written.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Could not serialize the request body: {0}")]
    Serialize(#[from] serde_json::Error),
}
