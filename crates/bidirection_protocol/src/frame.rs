//! crates/bidirection_protocol/src/frame.rs
//!
//! Binary frame codec shared by every message in both directions.
//!
//! A frame is a 4-byte header followed by optional fields selected by the
//! header and a length-prefixed payload. All integers are big-endian.
//!
//! ```text
//! byte 0   version (4 bits) | header size in 4-byte words (4 bits)
//! byte 1   message type     | flag
//! byte 2   serialization    | compression
//! byte 3   reserved
//! [i32]    event            (flag == WithEvent)
//! [u32+..] session id       (WithEvent, non-connection events)
//! [u32+..] connect id       (ConnectionStarted / Failed / Finished)
//! [i32]    sequence         (PositiveSeq / NegativeSeq, non-error frames)
//! [u32]    error code       (Error frames)
//! u32+..   payload
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::events::{Compression, EventType, MsgType, MsgTypeFlag, Serialization};

//=========================================================================================
// Constants
//=========================================================================================

/// The only protocol version this codec speaks.
pub const PROTOCOL_VERSION: u8 = 0b0001;

/// Header size in 4-byte words written by the encoder.
const HEADER_WORDS: u8 = 0b0001;

const HEADER_LEN: usize = 4;

/// Body of control requests that carry no parameters.
const EMPTY_JSON: &[u8] = b"{}";

//=========================================================================================
// Errors
//=========================================================================================

/// Failure to encode or decode a wire frame.
///
/// On decode these indicate a protocol or version mismatch with the peer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is {0} bytes, shorter than its header")]
    HeaderTooShort(usize),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown message type {0:#06b}")]
    UnknownMsgType(u8),
    #[error("unknown message flag {0:#06b}")]
    UnknownFlag(u8),
    #[error("unknown serialization {0:#06b}")]
    UnknownSerialization(u8),
    #[error("unknown compression {0:#06b}")]
    UnknownCompression(u8),
    #[error("payload compression {0:?} is not supported")]
    UnsupportedCompression(Compression),
    #[error("frame truncated while reading {field}: needed {needed} bytes, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error("frame flag requires {0}, but none was set")]
    MissingField(&'static str),
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

//=========================================================================================
// Frame
//=========================================================================================

/// One wire message, header fields fully decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub msg_type: MsgType,
    pub flag: MsgTypeFlag,
    pub serialization: Serialization,
    pub compression: Compression,
    pub event: Option<EventType>,
    pub session_id: Option<String>,
    pub connect_id: Option<String>,
    pub sequence: Option<i32>,
    pub error_code: Option<u32>,
    pub payload: Bytes,
}

impl Frame {
    /// A JSON frame tagged with an event. Empty session ids are treated as absent.
    pub fn with_event(
        msg_type: MsgType,
        event: EventType,
        session_id: Option<&str>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            msg_type,
            flag: MsgTypeFlag::WithEvent,
            serialization: Serialization::Json,
            compression: Compression::None,
            event: Some(event),
            session_id: session_id
                .filter(|id| !id.is_empty() && event.carries_session_id())
                .map(str::to_owned),
            connect_id: None,
            sequence: None,
            error_code: None,
            payload: payload.into(),
        }
    }

    /// A raw-audio frame as the server sends it during a session.
    pub fn audio_only(event: Option<EventType>, session_id: Option<&str>, audio: impl Into<Bytes>) -> Self {
        let flag = if event.is_some() {
            MsgTypeFlag::WithEvent
        } else {
            MsgTypeFlag::NoSeq
        };
        Self {
            msg_type: MsgType::AudioOnlyServer,
            flag,
            serialization: Serialization::Raw,
            compression: Compression::None,
            event,
            session_id: session_id
                .filter(|id| !id.is_empty() && event.is_some_and(EventType::carries_session_id))
                .map(str::to_owned),
            connect_id: None,
            sequence: None,
            error_code: None,
            payload: audio.into(),
        }
    }

    /// An error frame with a JSON body.
    pub fn error(code: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type: MsgType::Error,
            flag: MsgTypeFlag::NoSeq,
            serialization: Serialization::Json,
            compression: Compression::None,
            event: None,
            session_id: None,
            connect_id: None,
            sequence: None,
            error_code: Some(code),
            payload: payload.into(),
        }
    }

    pub fn with_connect_id(mut self, connect_id: impl Into<String>) -> Self {
        self.connect_id = Some(connect_id.into()).filter(|id: &String| !id.is_empty());
        self
    }

    pub fn with_sequence(mut self, flag: MsgTypeFlag, sequence: i32) -> Self {
        self.flag = flag;
        self.event = None;
        self.session_id = None;
        self.connect_id = None;
        self.sequence = Some(sequence);
        self
    }

    // --- Client requests ---

    pub fn start_connection() -> Self {
        Self::with_event(MsgType::FullClientRequest, EventType::StartConnection, None, EMPTY_JSON)
    }

    pub fn finish_connection() -> Self {
        Self::with_event(MsgType::FullClientRequest, EventType::FinishConnection, None, EMPTY_JSON)
    }

    pub fn start_session(payload: impl Into<Bytes>, session_id: &str) -> Self {
        Self::with_event(MsgType::FullClientRequest, EventType::StartSession, Some(session_id), payload)
    }

    pub fn finish_session(session_id: &str) -> Self {
        Self::with_event(MsgType::FullClientRequest, EventType::FinishSession, Some(session_id), EMPTY_JSON)
    }

    pub fn task_request(payload: impl Into<Bytes>, session_id: &str) -> Self {
        Self::with_event(MsgType::FullClientRequest, EventType::TaskRequest, Some(session_id), payload)
    }

    //=====================================================================================
    // Encoding
    //=====================================================================================

    /// Serializes the frame to its wire form.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 16 + self.payload.len());
        buf.put_u8((PROTOCOL_VERSION << 4) | HEADER_WORDS);
        buf.put_u8((self.msg_type.code() << 4) | self.flag.code());
        buf.put_u8((self.serialization.code() << 4) | self.compression.code());
        buf.put_u8(0);

        if self.flag == MsgTypeFlag::WithEvent {
            let event = self.event.ok_or(FrameError::MissingField("an event"))?;
            buf.put_i32(event.code());
            if event.carries_session_id() {
                put_string(&mut buf, self.session_id.as_deref().unwrap_or_default());
            }
            if event.carries_connect_id() {
                put_string(&mut buf, self.connect_id.as_deref().unwrap_or_default());
            }
        }

        if self.msg_type == MsgType::Error {
            let code = self.error_code.ok_or(FrameError::MissingField("an error code"))?;
            buf.put_u32(code);
        } else if self.flag.carries_sequence() {
            let sequence = self.sequence.ok_or(FrameError::MissingField("a sequence number"))?;
            buf.put_i32(sequence);
        }

        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    //=====================================================================================
    // Decoding
    //=====================================================================================

    /// Parses one complete wire message.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER_LEN {
            return Err(FrameError::HeaderTooShort(data.len()));
        }

        let version = data[0] >> 4;
        if version != PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let header_len = usize::from(data[0] & 0x0f) * 4;
        if header_len < HEADER_LEN || data.len() < header_len {
            return Err(FrameError::HeaderTooShort(data.len()));
        }

        let msg_type = MsgType::try_from(data[1] >> 4)?;
        let flag = MsgTypeFlag::try_from(data[1] & 0x0f)?;
        let serialization = Serialization::try_from(data[2] >> 4)?;
        let compression = Compression::try_from(data[2] & 0x0f)?;

        // Header extension words, if any, carry nothing this client uses.
        let mut buf = &data[header_len..];

        let mut event = None;
        let mut session_id = None;
        let mut connect_id = None;
        if flag == MsgTypeFlag::WithEvent {
            // Unknown events use the session-scoped layout.
            let decoded = EventType::from(take_i32(&mut buf, "event")?);
            if decoded.carries_session_id() {
                session_id = take_string(&mut buf, "session id")?;
            }
            if decoded.carries_connect_id() {
                connect_id = take_string(&mut buf, "connect id")?;
            }
            event = Some(decoded);
        }

        let mut sequence = None;
        let mut error_code = None;
        if msg_type == MsgType::Error {
            error_code = Some(take_u32(&mut buf, "error code")?);
        } else if flag.carries_sequence() {
            sequence = Some(take_i32(&mut buf, "sequence")?);
        }

        let payload_len = take_u32(&mut buf, "payload size")? as usize;
        ensure_remaining(buf, payload_len, "payload")?;
        let payload = Bytes::copy_from_slice(&buf[..payload_len]);
        buf.advance(payload_len);
        if !buf.is_empty() {
            return Err(FrameError::TrailingBytes(buf.len()));
        }

        Ok(Self {
            msg_type,
            flag,
            serialization,
            compression,
            event,
            session_id,
            connect_id,
            sequence,
            error_code,
            payload,
        })
    }
}

//=========================================================================================
// Field Helpers
//=========================================================================================

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn ensure_remaining(buf: &[u8], needed: usize, field: &'static str) -> Result<(), FrameError> {
    if buf.remaining() < needed {
        return Err(FrameError::Truncated {
            field,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn take_u32(buf: &mut &[u8], field: &'static str) -> Result<u32, FrameError> {
    ensure_remaining(*buf, 4, field)?;
    Ok(buf.get_u32())
}

fn take_i32(buf: &mut &[u8], field: &'static str) -> Result<i32, FrameError> {
    ensure_remaining(*buf, 4, field)?;
    Ok(buf.get_i32())
}

/// Reads a length-prefixed UTF-8 string; zero length decodes as `None`.
fn take_string(buf: &mut &[u8], field: &'static str) -> Result<Option<String>, FrameError> {
    let len = take_u32(buf, field)? as usize;
    ensure_remaining(*buf, len, field)?;
    let value = std::str::from_utf8(&buf[..len])
        .map_err(|_| FrameError::InvalidUtf8(field))?
        .to_owned();
    buf.advance(len);
    Ok(Some(value).filter(|v| !v.is_empty()))
}
