pub mod domain;
pub mod ports;

pub use domain::{
    resource_id_for_voice, AudioFormat, AudioParams, DialogueLine, ProsodyOverrides,
    SynthesisRequest, RESOURCE_SEED_ICL, RESOURCE_SEED_TTS,
};
pub use ports::{AudioMerger, DialogueSource, PortError, PortResult, TextToSpeechService};
