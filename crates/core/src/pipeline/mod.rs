use tracing::debug;

use crate::narration::{DashboardDescription, GenerationError, NarrationGenerator};
use crate::tts::{
    FallbackTts, LiveRelay, LiveSession, StreamingTts, SynthesisFailure, SynthesisOrchestrator,
    SynthesisResult, Transport, VoiceId,
};

const LOG_TARGET: &str = "pipeline";

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisFailure),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NarratedAudio {
    pub narration: String,
    pub audio: Vec<u8>,
    pub transport: Transport,
}

#[derive(Debug)]
pub struct LiveNarration {
    pub narration: String,
    pub session: LiveSession,
}

/// Composition root: dashboard in, spoken narration out. Generation comes
/// first and its failures surface untouched; synthesis never runs without
/// narration text.
pub struct NarrationPipeline<N, S, F>
where
    N: NarrationGenerator,
    S: StreamingTts + Clone + Send + 'static,
    F: FallbackTts,
{
    narrator: N,
    synthesis: SynthesisOrchestrator<S, F>,
    relay: LiveRelay<S>,
}

impl<N, S, F> NarrationPipeline<N, S, F>
where
    N: NarrationGenerator,
    S: StreamingTts + Clone + Send + 'static,
    F: FallbackTts,
{
    pub fn new(narrator: N, streaming: S, fallback: F) -> Self {
        Self {
            narrator,
            relay: LiveRelay::new(streaming.clone()),
            synthesis: SynthesisOrchestrator::new(streaming, fallback),
        }
    }

    pub fn with_default_voice(mut self, voice: VoiceId) -> Self {
        self.synthesis = self.synthesis.with_default_voice(voice);
        self
    }

    pub fn with_model<M: Into<String>>(mut self, model_id: M) -> Self {
        self.synthesis = self.synthesis.with_model(model_id);
        self
    }

    /// Narrate and synthesize, buffering the whole waveform.
    pub async fn narrate(
        &self,
        dashboard: DashboardDescription,
        voice: Option<VoiceId>,
    ) -> Result<NarratedAudio, PipelineError> {
        let narration = self.narration_for(dashboard).await?;
        let SynthesisResult { audio, transport } =
            self.synthesis.synthesize(&narration, voice).await?;
        Ok(NarratedAudio {
            narration,
            audio,
            transport,
        })
    }

    /// Narrate, then stream chunks live. No fallback on this path: a
    /// failed stream closes the chunk channel and reports through the
    /// session outcome.
    pub async fn narrate_live(
        &self,
        dashboard: DashboardDescription,
        voice: Option<VoiceId>,
    ) -> Result<LiveNarration, PipelineError> {
        let narration = self.narration_for(dashboard).await?;
        let request = self.synthesis.request(&narration, voice);
        let session = self.relay.spawn(request);
        Ok(LiveNarration { narration, session })
    }

    async fn narration_for(
        &self,
        dashboard: DashboardDescription,
    ) -> Result<String, GenerationError> {
        let title = dashboard.title().unwrap_or("untitled").to_owned();
        let narration = self.narrator.generate(dashboard).await?;
        debug!(target: LOG_TARGET, %title, chars = narration.len(), "narration generated");
        Ok(narration)
    }
}
