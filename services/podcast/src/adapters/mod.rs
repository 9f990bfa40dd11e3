pub mod dialogue;
pub mod docx;
pub mod merge;
pub mod tts;
pub mod ws_transport;

pub use dialogue::{ScriptDialogueSource, SCRIPT_EXTENSIONS};
pub use merge::FileAudioMerger;
pub use tts::BidirectionTtsAdapter;
pub use ws_transport::{WebSocketConnector, WebSocketTransport};
