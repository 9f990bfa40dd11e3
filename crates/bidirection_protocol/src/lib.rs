pub mod client;
pub mod error;
pub mod events;
pub mod frame;
pub mod message;
pub mod request;
pub mod transport;

pub use client::{
    BidirectionClient, ClientOptions, Connection, Credentials, DEFAULT_ENDPOINT, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_RECEIVE_TIMEOUT,
};
pub use error::TtsError;
pub use events::{Compression, EventType, MsgType, MsgTypeFlag, Serialization};
pub use frame::{Frame, FrameError};
pub use message::{Message, Payload};
pub use request::{RequestBuilder, SessionFeatures};
pub use transport::{ConnectRequest, Connector, Transport, TransportError};
