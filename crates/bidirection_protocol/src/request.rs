//! crates/bidirection_protocol/src/request.rs
//!
//! JSON bodies of the `StartSession` and `TaskRequest` frames.

use bytes::Bytes;
use podcast_core::SynthesisRequest;
use serde::Serialize;

use crate::events::EventType;

/// Namespace the bidirectional TTS endpoint expects on every request.
pub const NAMESPACE: &str = "BidirectionalTTS";

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    user: User<'a>,
    namespace: &'static str,
    req_params: ReqParams<'a>,
    event: i32,
}

#[derive(Debug, Serialize)]
struct User<'a> {
    uid: &'a str,
}

#[derive(Debug, Serialize)]
struct ReqParams<'a> {
    speaker: &'a str,
    audio_params: AudioParamsBody<'a>,
    /// Feature flags, serialized as a JSON string inside the JSON body.
    additions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AudioParamsBody<'a> {
    format: &'static str,
    sample_rate: u32,
    enable_timestamp: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_rate: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loudness_rate: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion_scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pitch_rate: Option<i32>,
}

#[derive(Debug, Serialize)]
struct Additions {
    disable_markdown_filter: bool,
}

/// Session-level switches that are not part of a [`SynthesisRequest`].
#[derive(Debug, Clone, Copy)]
pub struct SessionFeatures {
    pub enable_timestamp: bool,
    pub disable_markdown_filter: bool,
}

impl Default for SessionFeatures {
    fn default() -> Self {
        Self {
            enable_timestamp: true,
            disable_markdown_filter: false,
        }
    }
}

/// Builds the request bodies for one session.
///
/// Both bodies share the same user id and base parameters; only `StartSession`
/// carries prosody overrides, and only `TaskRequest` carries the text.
pub struct RequestBuilder<'a> {
    request: &'a SynthesisRequest,
    uid: String,
    features: SessionFeatures,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(request: &'a SynthesisRequest, uid: impl Into<String>, features: SessionFeatures) -> Self {
        Self {
            request,
            uid: uid.into(),
            features,
        }
    }

    pub fn start_session(&self) -> Result<Bytes, serde_json::Error> {
        let prosody = &self.request.prosody;
        let mut body = self.base(EventType::StartSession)?;
        let audio = &mut body.req_params.audio_params;
        audio.speech_rate = prosody.speech_rate();
        audio.loudness_rate = prosody.loudness_rate();
        audio.emotion = prosody.emotion();
        audio.emotion_scale = prosody.emotion_scale();
        audio.pitch_rate = prosody.pitch_rate();
        Ok(serde_json::to_vec(&body)?.into())
    }

    pub fn task_request(&self) -> Result<Bytes, serde_json::Error> {
        let mut body = self.base(EventType::TaskRequest)?;
        body.req_params.text = Some(self.request.text.as_str());
        Ok(serde_json::to_vec(&body)?.into())
    }

    fn base(&self, event: EventType) -> Result<RequestBody<'_>, serde_json::Error> {
        let additions = serde_json::to_string(&Additions {
            disable_markdown_filter: self.features.disable_markdown_filter,
        })?;
        Ok(RequestBody {
            user: User { uid: &self.uid },
            namespace: NAMESPACE,
            req_params: ReqParams {
                speaker: &self.request.voice_type,
                audio_params: AudioParamsBody {
                    format: self.request.audio.format.as_str(),
                    sample_rate: self.request.audio.sample_rate,
                    enable_timestamp: self.features.enable_timestamp,
                    speech_rate: None,
                    loudness_rate: None,
                    emotion: None,
                    emotion_scale: None,
                    pitch_rate: None,
                },
                additions,
                text: None,
            },
            event: event.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podcast_core::{AudioFormat, AudioParams, ProsodyOverrides};
    use serde_json::{json, Value};

    fn request(prosody: ProsodyOverrides) -> SynthesisRequest {
        SynthesisRequest::new(
            "你好世界",
            "S_abc123",
            AudioParams {
                format: AudioFormat::Mp3,
                sample_rate: 24_000,
            },
        )
        .with_prosody(prosody)
    }

    fn parse(bytes: Bytes) -> Value {
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn start_session_omits_unset_prosody() {
        let request = request(ProsodyOverrides::default());
        let body = parse(RequestBuilder::new(&request, "u-1", SessionFeatures::default()).start_session().unwrap());

        assert_eq!(
            body,
            json!({
                "user": {"uid": "u-1"},
                "namespace": "BidirectionalTTS",
                "req_params": {
                    "speaker": "S_abc123",
                    "audio_params": {
                        "format": "mp3",
                        "sample_rate": 24000,
                        "enable_timestamp": true
                    },
                    "additions": "{\"disable_markdown_filter\":false}"
                },
                "event": 100
            })
        );
    }

    #[test]
    fn start_session_includes_set_prosody() {
        let request = request(ProsodyOverrides {
            speech_rate: 30,
            loudness_rate: 0,
            emotion: "happy".to_string(),
            emotion_scale: 3.5,
            pitch_rate: -4,
        });
        let body = parse(RequestBuilder::new(&request, "u-1", SessionFeatures::default()).start_session().unwrap());
        let audio = &body["req_params"]["audio_params"];

        assert_eq!(audio["speech_rate"], 30);
        assert_eq!(audio["emotion"], "happy");
        assert_eq!(audio["emotion_scale"], 3.5);
        assert_eq!(audio["pitch_rate"], -4);
        assert!(audio.get("loudness_rate").is_none());
    }

    #[test]
    fn task_request_carries_text_without_prosody() {
        let request = request(ProsodyOverrides {
            speech_rate: 10,
            ..Default::default()
        });
        let body = parse(RequestBuilder::new(&request, "u-2", SessionFeatures::default()).task_request().unwrap());

        assert_eq!(body["event"], 200);
        assert_eq!(body["req_params"]["text"], "你好世界");
        assert_eq!(body["user"]["uid"], "u-2");
        assert!(body["req_params"]["audio_params"].get("speech_rate").is_none());
    }

    #[test]
    fn start_session_has_no_text() {
        let request = request(ProsodyOverrides::default());
        let body = parse(RequestBuilder::new(&request, "u-1", SessionFeatures::default()).start_session().unwrap());
        assert!(body["req_params"].get("text").is_none());
    }
}
