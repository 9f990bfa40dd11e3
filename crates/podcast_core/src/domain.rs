//! crates/podcast_core/src/domain.rs
//!
//! Defines the pure, core data structures for podcast synthesis.
//! These structs are independent of any wire protocol or file format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Resource Routing
//=========================================================================================

/// Voice ids carrying this prefix are cloned voices served by the ICL model family.
pub const CLONED_VOICE_PREFIX: &str = "S_";

/// Backend resource for cloned (in-context-learning) voices.
pub const RESOURCE_SEED_ICL: &str = "seed-icl-2.0";

/// Backend resource for the stock voice catalogue.
pub const RESOURCE_SEED_TTS: &str = "seed-tts-2.0";

/// Maps a voice identifier to the backend resource family that serves it.
///
/// This is a naming convention only; nothing is negotiated over the wire.
pub fn resource_id_for_voice(voice_type: &str) -> &'static str {
    if voice_type.starts_with(CLONED_VOICE_PREFIX) {
        RESOURCE_SEED_ICL
    } else {
        RESOURCE_SEED_TTS
    }
}

//=========================================================================================
// Audio Parameters
//=========================================================================================

/// Output container/codec requested from the synthesis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Pcm,
    OggOpus,
}

impl AudioFormat {
    /// The value sent in `audio_params.format`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
            Self::OggOpus => "ogg_opus",
        }
    }

    /// File extension used for segments and the merged podcast.
    pub fn extension(self) -> &'static str {
        match self {
            Self::OggOpus => "ogg",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            "pcm" => Ok(Self::Pcm),
            "ogg_opus" | "ogg" => Ok(Self::OggOpus),
            other => Err(format!("'{}' is not a supported audio format", other)),
        }
    }
}

/// Output audio parameters for one synthesis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub format: AudioFormat,
    pub sample_rate: u32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: AudioFormat::Mp3,
            sample_rate: 24_000,
        }
    }
}

//=========================================================================================
// Prosody Overrides
//=========================================================================================

/// Emotion value meaning "no emotion override".
pub const NEUTRAL_EMOTION: &str = "neutral";

/// Optional knobs that adjust the generated speech.
///
/// Every field has an unset sentinel; a field at its sentinel is left out of
/// the request entirely.
///
/// | field | sentinel |
/// |---|---|
/// | `speech_rate` | `0` |
/// | `loudness_rate` | `0` |
/// | `emotion` | `"neutral"` or empty |
/// | `emotion_scale` | `0.0` |
/// | `pitch_rate` | `0` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProsodyOverrides {
    pub speech_rate: i32,
    pub loudness_rate: i32,
    pub emotion: String,
    pub emotion_scale: f32,
    pub pitch_rate: i32,
}

impl Default for ProsodyOverrides {
    fn default() -> Self {
        Self {
            speech_rate: 0,
            loudness_rate: 0,
            emotion: NEUTRAL_EMOTION.to_string(),
            emotion_scale: 0.0,
            pitch_rate: 0,
        }
    }
}

impl ProsodyOverrides {
    pub fn speech_rate(&self) -> Option<i32> {
        (self.speech_rate != 0).then_some(self.speech_rate)
    }

    pub fn loudness_rate(&self) -> Option<i32> {
        (self.loudness_rate != 0).then_some(self.loudness_rate)
    }

    pub fn emotion(&self) -> Option<&str> {
        let emotion = self.emotion.trim();
        (!emotion.is_empty() && emotion != NEUTRAL_EMOTION).then_some(emotion)
    }

    pub fn emotion_scale(&self) -> Option<f32> {
        (self.emotion_scale != 0.0).then_some(self.emotion_scale)
    }

    pub fn pitch_rate(&self) -> Option<i32> {
        (self.pitch_rate != 0).then_some(self.pitch_rate)
    }

    /// True when every knob sits at its sentinel.
    pub fn is_unset(&self) -> bool {
        self.speech_rate().is_none()
            && self.loudness_rate().is_none()
            && self.emotion().is_none()
            && self.emotion_scale().is_none()
            && self.pitch_rate().is_none()
    }
}

//=========================================================================================
// Synthesis Request
//=========================================================================================

/// Everything needed to synthesize one piece of text with one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_type: String,
    pub resource_id: String,
    pub audio: AudioParams,
    pub prosody: ProsodyOverrides,
}

impl SynthesisRequest {
    /// Creates a request whose resource id follows [`resource_id_for_voice`].
    pub fn new(text: impl Into<String>, voice_type: impl Into<String>, audio: AudioParams) -> Self {
        let voice_type = voice_type.into();
        let resource_id = resource_id_for_voice(&voice_type).to_string();
        Self {
            text: text.into(),
            voice_type,
            resource_id,
            audio,
            prosody: ProsodyOverrides::default(),
        }
    }

    pub fn with_prosody(mut self, prosody: ProsodyOverrides) -> Self {
        self.prosody = prosody;
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }
}

//=========================================================================================
// Dialogue
//=========================================================================================

/// One spoken line extracted from a script document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueLine {
    /// The speaker's name as written in the script.
    pub speaker: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloned_voices_route_to_icl_family() {
        assert_eq!(resource_id_for_voice("S_abc123"), RESOURCE_SEED_ICL);
        assert_eq!(resource_id_for_voice("zh_female_x"), RESOURCE_SEED_TTS);
        // Prefix match is case-sensitive.
        assert_eq!(resource_id_for_voice("s_abc123"), RESOURCE_SEED_TTS);
    }

    #[test]
    fn new_request_picks_resource_from_voice() {
        let request = SynthesisRequest::new("你好世界", "S_abc123", AudioParams::default());
        assert_eq!(request.resource_id, "seed-icl-2.0");
        assert!(request.prosody.is_unset());

        let request = SynthesisRequest::new("你好世界", "zh_female_x", AudioParams::default());
        assert_eq!(request.resource_id, "seed-tts-2.0");
    }

    #[test]
    fn prosody_accessors_hide_sentinels() {
        let prosody = ProsodyOverrides::default();
        assert_eq!(prosody.speech_rate(), None);
        assert_eq!(prosody.emotion(), None);
        assert!(prosody.is_unset());

        let prosody = ProsodyOverrides {
            loudness_rate: 20,
            emotion: "happy".to_string(),
            emotion_scale: 4.0,
            ..Default::default()
        };
        assert_eq!(prosody.loudness_rate(), Some(20));
        assert_eq!(prosody.emotion(), Some("happy"));
        assert_eq!(prosody.emotion_scale(), Some(4.0));
        assert_eq!(prosody.pitch_rate(), None);
        assert!(!prosody.is_unset());
    }

    #[test]
    fn empty_emotion_counts_as_unset() {
        let prosody = ProsodyOverrides {
            emotion: String::new(),
            ..Default::default()
        };
        assert!(prosody.is_unset());
    }

    #[test]
    fn partial_prosody_deserializes_with_sentinels() {
        let prosody: ProsodyOverrides = serde_json::from_str(r#"{"pitch_rate": 5}"#).unwrap();
        assert_eq!(prosody.pitch_rate(), Some(5));
        assert_eq!(prosody.emotion, NEUTRAL_EMOTION);
        assert_eq!(prosody.speech_rate, 0);
    }

    #[test]
    fn audio_format_parses_and_names_files() {
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!("ogg_opus".parse::<AudioFormat>().unwrap(), AudioFormat::OggOpus);
        assert_eq!(AudioFormat::OggOpus.extension(), "ogg");
        assert_eq!(AudioFormat::Wav.as_str(), "wav");
        assert!("flac".parse::<AudioFormat>().is_err());
    }
}
