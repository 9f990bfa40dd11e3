//! crates/bidirection_protocol/src/message.rs
//!
//! Typed view of an inbound frame: message kind, optional event and an
//! interpreted payload.

use bytes::Bytes;
use serde_json::Value;

use crate::events::{Compression, EventType, MsgType, Serialization};
use crate::frame::{Frame, FrameError};

/// Interpreted frame body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Control frames: the parsed JSON body (`null` when the body is empty).
    Json(Value),
    /// Audio-only or raw frames: the bytes as received.
    Binary(Bytes),
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub msg_type: MsgType,
    /// `None` for bare audio frames sent without an event.
    pub event: Option<EventType>,
    pub session_id: Option<String>,
    pub error_code: Option<u32>,
    pub payload: Payload,
}

impl Message {
    /// Decodes wire bytes straight into a message.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        Self::try_from(Frame::decode(data)?)
    }

    /// True when this is exactly the `(type, event)` pair being waited for.
    pub fn is(&self, msg_type: MsgType, event: EventType) -> bool {
        self.msg_type == msg_type && self.event == Some(event)
    }

    /// The audio chunk, if this is a server audio frame.
    pub fn audio(&self) -> Option<&Bytes> {
        match (&self.payload, self.msg_type) {
            (Payload::Binary(bytes), MsgType::AudioOnlyServer) => Some(bytes),
            _ => None,
        }
    }

    /// True for error frames and for events that report a failed connection or session.
    pub fn is_failure(&self) -> bool {
        self.msg_type == MsgType::Error || self.event.is_some_and(EventType::is_failure)
    }

    /// Compact rendering of the payload for logs and error reports.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Payload::Json(Value::String(text)) => text.clone(),
            Payload::Json(value) => value.to_string(),
            Payload::Binary(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

impl TryFrom<Frame> for Message {
    type Error = FrameError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        if frame.compression != Compression::None {
            return Err(FrameError::UnsupportedCompression(frame.compression));
        }

        let payload = if frame.msg_type.is_audio_only() || frame.serialization != Serialization::Json {
            Payload::Binary(frame.payload)
        } else if frame.payload.is_empty() {
            Payload::Json(Value::Null)
        } else {
            match serde_json::from_slice(&frame.payload) {
                Ok(value) => Payload::Json(value),
                // Error bodies are diagnostics; keep them even when they are not JSON.
                Err(_) if frame.msg_type == MsgType::Error => {
                    Payload::Json(Value::String(String::from_utf8_lossy(&frame.payload).into_owned()))
                }
                Err(e) => return Err(FrameError::InvalidJson(e)),
            }
        };

        Ok(Self {
            msg_type: frame.msg_type,
            event: frame.event,
            session_id: frame.session_id,
            error_code: frame.error_code,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(frame: Frame) -> Message {
        Message::decode(&frame.encode().unwrap()).unwrap()
    }

    #[test]
    fn control_frames_expose_parsed_json() {
        let message = decode(Frame::with_event(
            MsgType::FullServerResponse,
            EventType::SessionStarted,
            Some("s-1"),
            &br#"{"status_code":20000000}"#[..],
        ));
        assert!(message.is(MsgType::FullServerResponse, EventType::SessionStarted));
        assert_eq!(message.session_id.as_deref(), Some("s-1"));
        assert_eq!(message.payload, Payload::Json(json!({"status_code": 20000000})));
        assert_eq!(message.audio(), None);
    }

    #[test]
    fn empty_control_body_is_null() {
        let message = decode(Frame::with_event(
            MsgType::FullServerResponse,
            EventType::SessionFinished,
            Some("s-1"),
            Bytes::new(),
        ));
        assert_eq!(message.payload, Payload::Json(Value::Null));
    }

    #[test]
    fn audio_frames_keep_raw_bytes() {
        let message = decode(Frame::audio_only(Some(EventType::TtsResponse), Some("s-1"), &b"{}"[..]));
        assert_eq!(message.audio().map(|b| &b[..]), Some(&b"{}"[..]));
        assert_eq!(message.event, Some(EventType::TtsResponse));

        let bare = decode(Frame::audio_only(None, None, vec![0xFFu8, 0xFB]));
        assert_eq!(bare.event, None);
        assert_eq!(bare.audio().map(|b| b.len()), Some(2));
    }

    #[test]
    fn error_frames_keep_non_json_bodies() {
        let message = decode(Frame::error(55_000_000, &b"quota exceeded"[..]));
        assert!(message.is_failure());
        assert_eq!(message.error_code, Some(55_000_000));
        assert_eq!(message.payload_text(), "quota exceeded");
    }

    #[test]
    fn failure_events_are_flagged() {
        let message = decode(Frame::with_event(
            MsgType::FullServerResponse,
            EventType::SessionFailed,
            Some("s-1"),
            &br#"{"message":"bad"}"#[..],
        ));
        assert!(message.is_failure());
        assert!(!decode(Frame::finish_session("s-1")).is_failure());
    }

    #[test]
    fn invalid_json_control_body_is_a_decode_error() {
        let frame = Frame::with_event(
            MsgType::FullServerResponse,
            EventType::SessionStarted,
            Some("s-1"),
            &b"not json"[..],
        );
        let err = Message::decode(&frame.encode().unwrap()).unwrap_err();
        assert!(matches!(err, FrameError::InvalidJson(_)));
    }

    #[test]
    fn compressed_payloads_are_rejected() {
        let mut frame = Frame::finish_connection();
        frame.compression = Compression::Gzip;
        let err = Message::decode(&frame.encode().unwrap()).unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedCompression(Compression::Gzip)));
    }
}
