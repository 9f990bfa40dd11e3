//! crates/bidirection_protocol/src/client.rs
//!
//! The session protocol client: one connection, one session and one synthesis
//! task per call, with the connection always finished and closed on the way out.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use podcast_core::SynthesisRequest;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TtsError;
use crate::events::{EventType, MsgType};
use crate::frame::Frame;
use crate::message::Message;
use crate::request::{RequestBuilder, SessionFeatures};
use crate::transport::{ConnectRequest, Connector, Transport, TransportError};

//=========================================================================================
// Constants
//=========================================================================================

pub const DEFAULT_ENDPOINT: &str = "wss://openspeech.bytedance.com/api/v3/tts/bidirection";

/// Largest inbound message accepted by default (10 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long a single receive may stay silent before the wait is abandoned.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

pub const HEADER_APP_KEY: &str = "X-Api-App-Key";
pub const HEADER_ACCESS_KEY: &str = "X-Api-Access-Key";
pub const HEADER_RESOURCE_ID: &str = "X-Api-Resource-Id";
pub const HEADER_CONNECT_ID: &str = "X-Api-Connect-Id";

//=========================================================================================
// Client Configuration
//=========================================================================================

#[derive(Clone)]
pub struct Credentials {
    pub app_id: String,
    pub access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub endpoint: String,
    pub max_message_size: usize,
    pub receive_timeout: Duration,
    pub features: SessionFeatures,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            features: SessionFeatures::default(),
        }
    }
}

//=========================================================================================
// The Client
//=========================================================================================

/// Drives the bidirectional TTS protocol over transports opened by a [`Connector`].
///
/// Holds no per-call state, so one client can serve many concurrent calls.
#[derive(Clone)]
pub struct BidirectionClient {
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    options: ClientOptions,
    cleanups: TaskTracker,
}

impl BidirectionClient {
    pub fn new(connector: Arc<dyn Connector>, credentials: Credentials, options: ClientOptions) -> Self {
        Self {
            connector,
            credentials,
            options,
            cleanups: TaskTracker::new(),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Waits until every connection cleanup started by this client (or its clones) has finished.
    ///
    /// Call before shutting the runtime down after cancelling in-flight calls.
    pub async fn wait_for_cleanup(&self) {
        self.cleanups.close();
        self.cleanups.wait().await;
        self.cleanups.reopen();
    }

    /// Synthesizes `request.text` and returns the concatenated audio.
    ///
    /// The connection is finished and closed on every exit path, including
    /// when the returned future is dropped before completion.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, TtsError> {
        let connect = self.connect_request(&request.resource_id);
        info!(
            endpoint = %connect.endpoint,
            speaker = %request.voice_type,
            resource_id = %request.resource_id,
            connect_id = connect.header(HEADER_CONNECT_ID).unwrap_or_default(),
            "Connecting to TTS endpoint"
        );

        let transport = self
            .connector
            .connect(&connect)
            .await
            .map_err(|source| TtsError::ConnectFailure {
                endpoint: connect.endpoint.clone(),
                source,
            })?;

        let mut connection =
            Connection::new(transport, self.options.receive_timeout).tracked_by(self.cleanups.clone());
        let outcome = self.run_session(&mut connection, request).await;
        connection.release().await;

        let audio = outcome?;
        info!(
            bytes = audio.len(),
            speaker = %request.voice_type,
            resource_id = %request.resource_id,
            "Synthesis complete"
        );
        Ok(audio)
    }

    fn connect_request(&self, resource_id: &str) -> ConnectRequest {
        ConnectRequest {
            endpoint: self.options.endpoint.clone(),
            headers: vec![
                (HEADER_APP_KEY, self.credentials.app_id.clone()),
                (HEADER_ACCESS_KEY, self.credentials.access_token.clone()),
                (HEADER_RESOURCE_ID, resource_id.to_string()),
                (HEADER_CONNECT_ID, Uuid::new_v4().to_string()),
            ],
            max_message_size: self.options.max_message_size,
        }
    }

    /// Steps 2 through 7 of the protocol. Cleanup is the caller's job.
    async fn run_session(
        &self,
        connection: &mut Connection,
        request: &SynthesisRequest,
    ) -> Result<Vec<u8>, TtsError> {
        connection.send(&Frame::start_connection()).await?;
        connection
            .wait_for_event(MsgType::FullServerResponse, EventType::ConnectionStarted)
            .await?;

        let bodies = RequestBuilder::new(request, Uuid::new_v4().to_string(), self.options.features);
        let session_id = Uuid::new_v4().to_string();
        debug!(%session_id, "Starting session");
        connection
            .send(&Frame::start_session(bodies.start_session()?, &session_id))
            .await?;
        connection
            .wait_for_event(MsgType::FullServerResponse, EventType::SessionStarted)
            .await?;

        connection
            .send(&Frame::task_request(bodies.task_request()?, &session_id))
            .await?;
        connection.send(&Frame::finish_session(&session_id)).await?;

        let audio = connection.collect_audio().await?;
        if audio.is_empty() {
            return Err(TtsError::EmptyResult);
        }
        Ok(audio)
    }
}

//=========================================================================================
// Connection (scoped transport handle)
//=========================================================================================

/// Owns a transport for the lifetime of one call.
///
/// [`Connection::release`] sends `FinishConnection`, waits for
/// `ConnectionFinished` and closes the transport. If the handle is dropped
/// without being released, the same sequence is spawned on the current
/// runtime.
pub struct Connection {
    transport: Option<Box<dyn Transport>>,
    receive_timeout: Duration,
    cleanups: TaskTracker,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>, receive_timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            receive_timeout,
            cleanups: TaskTracker::new(),
        }
    }

    /// Registers the cleanup task with `tracker` so callers can wait for it.
    pub fn tracked_by(mut self, tracker: TaskTracker) -> Self {
        self.cleanups = tracker;
        self
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<(), TtsError> {
        let bytes = frame.encode()?;
        match self.transport.as_deref_mut() {
            Some(transport) => Ok(transport.send(bytes).await?),
            None => Err(released()),
        }
    }

    /// Reads the next message of any kind. `awaiting` only labels a timeout.
    pub(crate) async fn receive(&mut self, awaiting: EventType) -> Result<Message, TtsError> {
        let timeout = self.receive_timeout;
        match self.transport.as_deref_mut() {
            Some(transport) => receive_message(transport, timeout, awaiting).await,
            None => Err(released()),
        }
    }

    /// Blocks until the `(msg_type, event)` pair arrives, discarding everything else.
    pub async fn wait_for_event(&mut self, msg_type: MsgType, event: EventType) -> Result<Message, TtsError> {
        let timeout = self.receive_timeout;
        match self.transport.as_deref_mut() {
            Some(transport) => wait_for_event(transport, timeout, msg_type, event).await,
            None => Err(released()),
        }
    }

    /// Accumulates audio chunks until `SessionFinished`.
    pub async fn collect_audio(&mut self) -> Result<Vec<u8>, TtsError> {
        let mut audio = Vec::new();
        loop {
            let message = self.receive(EventType::SessionFinished).await?;
            match message.msg_type {
                MsgType::FullServerResponse if message.event == Some(EventType::SessionFinished) => {
                    return Ok(audio);
                }
                MsgType::AudioOnlyServer => {
                    if let Some(chunk) = message.audio() {
                        audio.extend_from_slice(chunk);
                    }
                }
                _ if message.is_failure() => return Err(rejection(&message)),
                _ => debug!(
                    msg_type = ?message.msg_type,
                    event = ?message.event,
                    "Ignoring message while collecting audio"
                ),
            }
        }
    }

    /// Finishes and closes the connection, logging instead of returning failures.
    ///
    /// Runs as its own task, so it completes even if the caller is cancelled mid-way.
    pub async fn release(mut self) {
        if let Some(transport) = self.transport.take() {
            let cleanup = self.cleanups.spawn(shutdown(transport, self.receive_timeout));
            if let Err(e) = cleanup.await {
                warn!(error = %e, "Connection cleanup task failed");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Connection dropped before release; finishing it in the background");
                handle.spawn(self.cleanups.track_future(shutdown(transport, self.receive_timeout)));
            }
            Err(_) => warn!("Connection dropped outside a runtime; FinishConnection was not sent"),
        }
    }
}

//=========================================================================================
// Receive Primitives
//=========================================================================================

async fn receive_message(
    transport: &mut dyn Transport,
    timeout: Duration,
    awaiting: EventType,
) -> Result<Message, TtsError> {
    let received = tokio::time::timeout(timeout, transport.receive())
        .await
        .map_err(|_| TtsError::ProtocolTimeout {
            expected: awaiting,
            reason: format!("no message within {:?}", timeout),
        })?;

    match received {
        Ok(Some(bytes)) => Ok(Message::decode(&bytes)?),
        Ok(None) => Err(TtsError::ProtocolTimeout {
            expected: awaiting,
            reason: "stream closed".to_string(),
        }),
        Err(e) => Err(TtsError::ProtocolTimeout {
            expected: awaiting,
            reason: e.to_string(),
        }),
    }
}

async fn wait_for_event(
    transport: &mut dyn Transport,
    timeout: Duration,
    msg_type: MsgType,
    event: EventType,
) -> Result<Message, TtsError> {
    loop {
        let message = receive_message(transport, timeout, event).await?;
        if message.is(msg_type, event) {
            return Ok(message);
        }
        if message.is_failure() {
            return Err(rejection(&message));
        }
        debug!(
            msg_type = ?message.msg_type,
            event = ?message.event,
            awaiting = ?event,
            "Discarding message while waiting"
        );
    }
}

/// `FinishConnection`, wait for `ConnectionFinished`, close. Failures are logged only.
async fn shutdown(mut transport: Box<dyn Transport>, timeout: Duration) {
    match Frame::finish_connection().encode() {
        Ok(bytes) => match transport.send(bytes).await {
            Ok(()) => {
                if let Err(e) = wait_for_event(
                    transport.as_mut(),
                    timeout,
                    MsgType::FullServerResponse,
                    EventType::ConnectionFinished,
                )
                .await
                {
                    warn!(error = %e, "Server did not confirm FinishConnection");
                }
            }
            Err(e) => warn!(error = %e, "Failed to send FinishConnection"),
        },
        Err(e) => warn!(error = %e, "Failed to encode FinishConnection"),
    }

    if let Err(e) = transport.close().await {
        warn!(error = %e, "Failed to close connection");
    }
    info!("Connection closed");
}

fn rejection(message: &Message) -> TtsError {
    TtsError::ServerRejected {
        code: message.error_code,
        payload: message.payload_text(),
    }
}

fn released() -> TtsError {
    TtsError::Transport(TransportError::Send("connection already released".to_string()))
}
