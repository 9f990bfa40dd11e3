//! crates/bidirection_protocol/src/transport.rs
//!
//! The byte-stream collaborator the session client drives. The production
//! implementation is a WebSocket; tests script one in memory.

use async_trait::async_trait;
use bytes::Bytes;

/// Failure reported by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("Unexpected message on the stream: {0}")]
    UnexpectedMessage(String),
    #[error("Close failed: {0}")]
    Close(String),
}

/// Everything a connector needs to open one streaming connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub endpoint: String,
    /// Upgrade request headers, in the order they should be sent.
    pub headers: Vec<(&'static str, String)>,
    /// Upper bound for a single inbound message.
    pub max_message_size: usize,
}

impl ConnectRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A full-duplex, message-oriented connection.
#[async_trait]
pub trait Transport: Send {
    /// Sends one complete binary message.
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError>;

    /// Receives the next binary message; `Ok(None)` once the peer has closed the stream.
    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Closes the connection. Called exactly once per connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports. Shared across concurrent synthesis calls.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Transport>, TransportError>;
}
