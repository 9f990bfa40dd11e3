//! services/podcast/src/voices.rs
//!
//! The voice book: which voice reads which speaker, and per-voice prosody.
//!
//! ```json
//! {
//!   "speakers": { "不白吃": "S_fN2KaTPI1", "侍卫": "zh_male_taocheng_uranus_bigtts" },
//!   "profiles": { "S_fN2KaTPI1": { "speech_rate": -10 } },
//!   "default_voices": ["zh_female_mizaitongxue_v2_saturn_bigtts"]
//! }
//! ```
//!
//! Speakers missing from `speakers` are given `default_voices` in rotation,
//! once per document. An empty `default_voices` list turns that off.

use std::collections::HashMap;
use std::path::Path;

use podcast_core::ProsodyOverrides;
use serde::Deserialize;
use tracing::info;

/// Voices used when no voice book is configured.
const BUILTIN_SPEAKERS: [(&str, &str); 2] = [("不白吃", "S_r7eMaTPI1"), ("小星", "S_1GQLaTPI1")];

/// Rotation for speakers without a mapped voice.
const BUILTIN_DEFAULT_VOICES: [&str; 2] = [
    "zh_female_mizaitongxue_v2_saturn_bigtts",
    "zh_male_dayixiansheng_v2_saturn_bigtts",
];

fn builtin_default_voices() -> Vec<String> {
    BUILTIN_DEFAULT_VOICES.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum VoiceBookError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid voice book: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceBook {
    /// Speaker name as written in the script, mapped to a voice id.
    #[serde(default)]
    speakers: HashMap<String, String>,
    /// Voice id mapped to the prosody used for every line that voice reads.
    #[serde(default)]
    profiles: HashMap<String, ProsodyOverrides>,
    #[serde(default = "builtin_default_voices")]
    default_voices: Vec<String>,
}

impl Default for VoiceBook {
    /// The built-in cast: two named hosts plus the default rotation.
    fn default() -> Self {
        Self {
            speakers: BUILTIN_SPEAKERS
                .iter()
                .map(|(speaker, voice)| (speaker.to_string(), voice.to_string()))
                .collect(),
            profiles: HashMap::new(),
            default_voices: builtin_default_voices(),
        }
    }
}

impl VoiceBook {
    pub fn load(path: &Path) -> Result<Self, VoiceBookError> {
        let raw = std::fs::read_to_string(path).map_err(|source| VoiceBookError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, VoiceBookError> {
        let mut book: Self = serde_json::from_str(raw)?;
        // Script names are matched after trimming, so the keys must be trimmed too.
        book.speakers = book
            .speakers
            .into_iter()
            .map(|(speaker, voice)| (speaker.trim().to_string(), voice.trim().to_string()))
            .collect();
        book.default_voices = book
            .default_voices
            .into_iter()
            .map(|voice| voice.trim().to_string())
            .filter(|voice| !voice.is_empty())
            .collect();
        Ok(book)
    }

    /// The voice explicitly mapped to `speaker`, if any.
    pub fn voice_for(&self, speaker: &str) -> Option<&str> {
        self.speakers
            .get(speaker.trim())
            .map(String::as_str)
            .filter(|voice| !voice.is_empty())
    }

    /// The voice's own profile if it has one, otherwise `defaults`.
    pub fn prosody_for(&self, voice: &str, defaults: &ProsodyOverrides) -> ProsodyOverrides {
        self.profiles.get(voice).unwrap_or(defaults).clone()
    }

    /// Speaker/voice pairs, sorted by speaker, for startup logging.
    pub fn assignments(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self
            .speakers
            .iter()
            .map(|(speaker, voice)| (speaker.as_str(), voice.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    pub fn default_voices(&self) -> &[String] {
        &self.default_voices
    }

    /// Starts voice assignment for one document.
    pub fn cast(&self) -> VoiceCast<'_> {
        VoiceCast {
            book: self,
            assigned: HashMap::new(),
        }
    }
}

/// Voice assignment for a single document.
///
/// Unmapped speakers keep the default voice they were first given for the
/// rest of the document.
pub struct VoiceCast<'a> {
    book: &'a VoiceBook,
    assigned: HashMap<String, String>,
}

impl VoiceCast<'_> {
    /// The voice for `speaker`, or `None` when it is unmapped and there is no rotation.
    pub fn voice_for(&mut self, speaker: &str) -> Option<String> {
        if let Some(voice) = self.book.voice_for(speaker) {
            return Some(voice.to_string());
        }
        let speaker = speaker.trim();
        if let Some(voice) = self.assigned.get(speaker) {
            return Some(voice.clone());
        }

        let rotation = &self.book.default_voices;
        if rotation.is_empty() {
            return None;
        }
        // The rotation continues from the size of the mapped cast.
        let voice = rotation[(self.book.speakers.len() + self.assigned.len()) % rotation.len()].clone();
        info!(speaker, voice = %voice, "Assigned a default voice to an unmapped speaker");
        self.assigned.insert(speaker.to_string(), voice.clone());
        Some(voice)
    }
}
