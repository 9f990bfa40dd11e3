//! services/podcast/src/adapters/ws_transport.rs
//!
//! WebSocket implementation of the protocol client's `Connector`/`Transport` seam.

use async_trait::async_trait;
use bidirection_protocol::{ConnectRequest, Connector, Transport, TransportError};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// Response header the service uses to identify a connection in its own logs.
const LOG_ID_HEADER: &str = "x-tt-logid";

//=========================================================================================
// Connector
//=========================================================================================

/// Opens TLS (or plain, for `ws://`) WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Transport>, TransportError> {
        let mut upgrade = request
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("invalid endpoint: {}", e)))?;

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Connect(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Connect(format!("invalid value for {}: {}", name, e)))?;
            upgrade.headers_mut().insert(name, value);
        }

        let config = WebSocketConfig::default()
            .max_message_size(Some(request.max_message_size))
            .max_frame_size(Some(request.max_message_size));

        let (stream, response) = connect_async_with_config(upgrade, Some(config), false)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let log_id = response
            .headers()
            .get(LOG_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        info!(status = %response.status(), log_id, "WebSocket connected");

        Ok(Box::new(WebSocketTransport { stream }))
    }
}

//=========================================================================================
// Transport
//=========================================================================================

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError> {
        self.stream
            .send(Message::Binary(message))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn receive(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                // Keep-alives are answered by tungstenite itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Text(text))) => {
                    return Err(TransportError::UnexpectedMessage(text.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Peer closed the WebSocket");
                    return Ok(None);
                }
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Close(e.to_string())),
        }
    }
}
