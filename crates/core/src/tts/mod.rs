mod fallback;
mod orchestrator;
mod protocol;
mod relay;
mod stream;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::{DEFAULT_MODEL_ID, DEFAULT_VOICE_ID};

pub use fallback::{ElevenLabsHttpClient, FallbackError};
pub use orchestrator::{SynthesisFailure, SynthesisOrchestrator};
pub use protocol::{decode, encode, DecodeError, ProtocolFrame, ServerFrame};
pub use relay::{LiveRelay, LiveSession};
pub use stream::{ElevenLabsStreamClient, StreamError};

/// Chunk length schedule sent with the stream configuration frame. These
/// are the upstream defaults for latency-balanced generation.
pub const DEFAULT_CHUNK_SCHEDULE: [u32; 4] = [120, 160, 250, 290];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceId(pub String);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

/// One synthesis job. Built once, then read-only for the lifetime of the
/// session that serves it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: VoiceId,
    pub model_id: String,
    pub voice_settings: VoiceSettings,
    pub chunk_schedule: Vec<u32>,
}

impl SynthesisRequest {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            voice: VoiceId(DEFAULT_VOICE_ID.to_owned()),
            model_id: DEFAULT_MODEL_ID.to_owned(),
            voice_settings: VoiceSettings::default(),
            chunk_schedule: DEFAULT_CHUNK_SCHEDULE.to_vec(),
        }
    }

    pub fn with_voice(mut self, voice: VoiceId) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_model<S: Into<String>>(mut self, model_id: S) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_voice_settings(mut self, voice_settings: VoiceSettings) -> Self {
        self.voice_settings = voice_settings;
        self
    }

    pub fn with_chunk_schedule(mut self, chunk_schedule: Vec<u32>) -> Self {
        self.chunk_schedule = chunk_schedule;
        self
    }
}

/// Which transport produced the audio of a successful synthesis.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Streaming,
    Fallback,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisResult {
    pub audio: Vec<u8>,
    pub transport: Transport,
}

pub trait StreamingTts: Send + Sync {
    fn synthesize(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<Vec<u8>, StreamError>>;

    /// Forward chunks into `chunks` as they arrive instead of buffering.
    /// The sender is dropped when the session reaches a terminal state.
    fn relay(
        &self,
        request: SynthesisRequest,
        chunks: mpsc::Sender<Bytes>,
    ) -> BoxFuture<'_, Result<(), StreamError>>;
}

pub trait FallbackTts: Send + Sync {
    fn synthesize(&self, request: SynthesisRequest)
        -> BoxFuture<'_, Result<Vec<u8>, FallbackError>>;
}
