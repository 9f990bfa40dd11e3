//! crates/bidirection_protocol/src/events.rs
//!
//! Header markers and event codes used on the wire.
//!
//! Header markers form closed sets; an unknown marker means the frame cannot
//! be parsed. Event codes are open: the service adds events over time, and a
//! code this client does not know still has a well-defined field layout.

use crate::frame::FrameError;

/// Declares an enum backed by a wire integer.
///
/// `=> open Other` keeps unknown codes in a catch-all variant; `=> ErrVariant`
/// rejects them with that `FrameError` variant.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty) => open $other:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// A code this client does not interpret.
            $other($repr),
        }

        impl $name {
            /// The integer written on the wire.
            pub fn code(self) -> $repr {
                match self {
                    $($name::$variant => $value,)+
                    $name::$other(code) => code,
                }
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                match value {
                    $($value => $name::$variant,)+
                    other => $name::$other(other),
                }
            }
        }
    };
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty) => $err:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// The integer written on the wire.
            pub fn code(self) -> $repr {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = FrameError;

            fn try_from(value: $repr) -> Result<Self, FrameError> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(FrameError::$err(other)),
                }
            }
        }
    };
}

wire_enum! {
    /// Message kind, carried in the high nibble of header byte 1.
    MsgType(u8) => UnknownMsgType {
        FullClientRequest = 0b0001,
        AudioOnlyClient = 0b0010,
        FullServerResponse = 0b1001,
        AudioOnlyServer = 0b1011,
        FrontEndResultServer = 0b1100,
        Error = 0b1111,
    }
}

wire_enum! {
    /// Optional-field selector, carried in the low nibble of header byte 1.
    MsgTypeFlag(u8) => UnknownFlag {
        NoSeq = 0b0000,
        PositiveSeq = 0b0001,
        LastNoSeq = 0b0010,
        NegativeSeq = 0b0011,
        WithEvent = 0b0100,
    }
}

wire_enum! {
    /// Payload serialization, high nibble of header byte 2.
    Serialization(u8) => UnknownSerialization {
        Raw = 0b0000,
        Json = 0b0001,
        Thrift = 0b0011,
        Custom = 0b1111,
    }
}

wire_enum! {
    /// Payload compression, low nibble of header byte 2.
    Compression(u8) => UnknownCompression {
        None = 0b0000,
        Gzip = 0b0001,
        Custom = 0b1111,
    }
}

wire_enum! {
    /// Lifecycle and data events.
    ///
    /// Connection events bracket session events, which bracket task events.
    EventType(i32) => open Other {
        // Connection scope
        StartConnection = 1,
        FinishConnection = 2,
        ConnectionStarted = 50,
        ConnectionFailed = 51,
        ConnectionFinished = 52,
        // Session scope
        StartSession = 100,
        CancelSession = 101,
        FinishSession = 102,
        SessionStarted = 150,
        SessionCanceled = 151,
        SessionFinished = 152,
        SessionFailed = 153,
        UsageResponse = 154,
        // Task scope
        TaskRequest = 200,
        UpdateConfig = 201,
        AudioMuted = 250,
        SayHello = 300,
        TtsSentenceStart = 350,
        TtsSentenceEnd = 351,
        TtsResponse = 352,
        TtsEnded = 359,
    }
}

impl EventType {
    /// Connection-scoped events never carry a session id.
    pub fn carries_session_id(self) -> bool {
        !matches!(
            self,
            Self::StartConnection
                | Self::FinishConnection
                | Self::ConnectionStarted
                | Self::ConnectionFailed
                | Self::ConnectionFinished
        )
    }

    /// Server acknowledgements of the connection carry the connect id.
    pub fn carries_connect_id(self) -> bool {
        matches!(
            self,
            Self::ConnectionStarted | Self::ConnectionFailed | Self::ConnectionFinished
        )
    }

    /// Events by which the server reports that the connection or session is unusable.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::ConnectionFailed | Self::SessionFailed)
    }
}

impl MsgTypeFlag {
    /// Whether a sequence number follows the event fields.
    pub fn carries_sequence(self) -> bool {
        matches!(self, Self::PositiveSeq | Self::NegativeSeq)
    }
}

impl MsgType {
    /// Audio-only frames hold opaque bytes regardless of the serialization marker.
    pub fn is_audio_only(self) -> bool {
        matches!(self, Self::AudioOnlyClient | Self::AudioOnlyServer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_codes_match_wire_values() {
        assert_eq!(EventType::StartConnection.code(), 1);
        assert_eq!(EventType::ConnectionStarted.code(), 50);
        assert_eq!(EventType::SessionFinished.code(), 152);
        assert_eq!(EventType::TaskRequest.code(), 200);
        assert_eq!(EventType::from(352), EventType::TtsResponse);
    }

    #[test]
    fn unknown_event_codes_are_kept() {
        let event = EventType::from(353);
        assert_eq!(event, EventType::Other(353));
        assert_eq!(event.code(), 353);
        assert!(event.carries_session_id());
        assert!(!event.carries_connect_id());
        assert!(!event.is_failure());
    }

    #[test]
    fn unknown_header_markers_are_rejected() {
        assert!(matches!(
            MsgType::try_from(0b0111),
            Err(FrameError::UnknownMsgType(0b0111))
        ));
        assert!(matches!(
            MsgTypeFlag::try_from(0b1000),
            Err(FrameError::UnknownFlag(0b1000))
        ));
    }

    #[test]
    fn connection_events_skip_session_id() {
        assert!(!EventType::StartConnection.carries_session_id());
        assert!(!EventType::ConnectionFinished.carries_session_id());
        assert!(EventType::StartSession.carries_session_id());
        assert!(EventType::TtsResponse.carries_session_id());

        assert!(EventType::ConnectionStarted.carries_connect_id());
        assert!(!EventType::StartConnection.carries_connect_id());
    }
}
