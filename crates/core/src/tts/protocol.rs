use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::VoiceSettings;

/// Outbound frame of the streaming synthesis protocol. Exactly one `Init`,
/// then text, then one `EndOfStream` per session. No `Debug` impl: `Init`
/// carries the raw credential.
pub enum ProtocolFrame {
    Init {
        voice_settings: VoiceSettings,
        chunk_schedule: Vec<u32>,
        credential: String,
    },
    Text {
        content: String,
    },
    EndOfStream,
}

/// Inbound frame, classified. Frames carrying several markers resolve in
/// the order error, audio, final.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerFrame {
    AudioChunk(Bytes),
    Final,
    Error(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed frame json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Serialize)]
struct InitFrame<'a> {
    text: &'a str,
    voice_settings: &'a VoiceSettings,
    generation_config: GenerationConfig<'a>,
    xi_api_key: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig<'a> {
    chunk_length_schedule: &'a [u32],
}

#[derive(Serialize)]
struct TextFrame<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct RawServerFrame {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default, rename = "isFinal")]
    is_final: Option<bool>,
}

pub fn encode(frame: &ProtocolFrame) -> Result<String, serde_json::Error> {
    match frame {
        ProtocolFrame::Init {
            voice_settings,
            chunk_schedule,
            credential,
        } => serde_json::to_string(&InitFrame {
            // The configuration frame carries a single space: an empty
            // text field means end-of-stream on this protocol.
            text: " ",
            voice_settings,
            generation_config: GenerationConfig {
                chunk_length_schedule: chunk_schedule,
            },
            xi_api_key: credential,
        }),
        ProtocolFrame::Text { content } => serde_json::to_string(&TextFrame { text: content }),
        ProtocolFrame::EndOfStream => serde_json::to_string(&TextFrame { text: "" }),
    }
}

/// Classify one inbound frame. `Ok(None)` means a keep-alive shape with
/// none of the known markers; unknown fields are ignored throughout.
pub fn decode(raw: &str) -> Result<Option<ServerFrame>, DecodeError> {
    let frame: RawServerFrame = serde_json::from_str(raw)?;
    if let Some(message) = frame.error {
        return Ok(Some(ServerFrame::Error(message)));
    }
    if let Some(audio) = frame.audio {
        // Some backends send an empty audio string on padding frames.
        if !audio.is_empty() {
            let bytes = general_purpose::STANDARD.decode(audio.as_bytes())?;
            return Ok(Some(ServerFrame::AudioChunk(Bytes::from(bytes))));
        }
    }
    if frame.is_final.unwrap_or(false) {
        return Ok(Some(ServerFrame::Final));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn encoded_value(frame: &ProtocolFrame) -> Value {
        let raw = encode(frame).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn init_frame_carries_settings_schedule_and_credential() {
        let value = encoded_value(&ProtocolFrame::Init {
            voice_settings: VoiceSettings::default(),
            chunk_schedule: vec![120, 160, 250, 290],
            credential: "secret-key".to_owned(),
        });
        assert_eq!(
            value,
            json!({
                "text": " ",
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75,
                    "style": 0.0,
                    "use_speaker_boost": true,
                },
                "generation_config": {
                    "chunk_length_schedule": [120, 160, 250, 290],
                },
                "xi_api_key": "secret-key",
            })
        );
    }

    #[test]
    fn text_frame_is_a_bare_text_object() {
        let value = encoded_value(&ProtocolFrame::Text {
            content: "three KPIs are up".to_owned(),
        });
        assert_eq!(value, json!({ "text": "three KPIs are up" }));
    }

    #[test]
    fn end_of_stream_is_an_empty_text_frame() {
        let value = encoded_value(&ProtocolFrame::EndOfStream);
        assert_eq!(value, json!({ "text": "" }));
    }

    #[test]
    fn decodes_audio_chunks_from_base64() {
        let frame = decode(r#"{"audio":"AQID","isFinal":null}"#).unwrap();
        assert_eq!(
            frame,
            Some(ServerFrame::AudioChunk(Bytes::from_static(&[1, 2, 3])))
        );
    }

    #[test]
    fn decodes_final_marker() {
        let frame = decode(r#"{"isFinal":true}"#).unwrap();
        assert_eq!(frame, Some(ServerFrame::Final));
    }

    #[test]
    fn decodes_error_frames() {
        let frame = decode(r#"{"error":"voice not found"}"#).unwrap();
        assert_eq!(
            frame,
            Some(ServerFrame::Error("voice not found".to_owned()))
        );
    }

    #[test]
    fn error_wins_over_audio_and_final() {
        let frame = decode(r#"{"error":"quota","audio":"AQID","isFinal":true}"#).unwrap();
        assert_eq!(frame, Some(ServerFrame::Error("quota".to_owned())));
    }

    #[test]
    fn audio_wins_over_final() {
        let frame = decode(r#"{"audio":"AQID","isFinal":true}"#).unwrap();
        assert_eq!(
            frame,
            Some(ServerFrame::AudioChunk(Bytes::from_static(&[1, 2, 3])))
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let frame = decode(r#"{"audio":"AQID","alignment":{"chars":[]},"normalized":true}"#)
            .unwrap();
        assert_eq!(
            frame,
            Some(ServerFrame::AudioChunk(Bytes::from_static(&[1, 2, 3])))
        );
    }

    #[test]
    fn frames_without_markers_are_keep_alives() {
        assert_eq!(decode("{}").unwrap(), None);
        assert_eq!(decode(r#"{"isFinal":false}"#).unwrap(), None);
        assert_eq!(decode(r#"{"audio":""}"#).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = decode("not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let err = decode(r#"{"audio":"!!not-base64!!"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }
}
