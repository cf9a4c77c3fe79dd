use futures::{future::BoxFuture, FutureExt};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{FallbackTts, SynthesisRequest, VoiceSettings};
use crate::config::ApiKey;

const LOG_TARGET: &str = "tts::fallback";

pub const DEFAULT_FALLBACK_BASE_URL: &str = "https://api.elevenlabs.io/v1";

#[derive(thiserror::Error, Debug)]
pub enum FallbackError {
    #[error("fallback synthesis request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("fallback synthesis returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
}

/// Single-shot text-to-speech over plain HTTP. Used when the streaming
/// transport failed; one POST, the whole waveform in the response body.
#[derive(Clone)]
pub struct ElevenLabsHttpClient {
    client: Client,
    api_key: ApiKey,
    base_url: String,
}

#[derive(Serialize)]
struct FallbackBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

impl ElevenLabsHttpClient {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_FALLBACK_BASE_URL.to_owned(),
        }
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>, FallbackError> {
        let url = format!("{}/text-to-speech/{}", self.base_url, request.voice.0);
        debug!(target: LOG_TARGET, voice = %request.voice.0, "requesting fallback synthesis");

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose())
            .header("Accept", "audio/mpeg")
            .json(&FallbackBody {
                text: &request.text,
                model_id: &request.model_id,
                voice_settings: &request.voice_settings,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FallbackError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

impl FallbackTts for ElevenLabsHttpClient {
    fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> BoxFuture<'_, Result<Vec<u8>, FallbackError>> {
        let this = self.clone();
        async move { this.synthesize(request).await }.boxed()
    }
}
