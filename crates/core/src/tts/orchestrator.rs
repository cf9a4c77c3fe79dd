use tracing::{debug, warn};

use super::{
    FallbackError, FallbackTts, StreamError, StreamingTts, SynthesisRequest, SynthesisResult,
    Transport, VoiceId,
};
use crate::config::{DEFAULT_MODEL_ID, DEFAULT_VOICE_ID};

const LOG_TARGET: &str = "tts::orchestrator";

/// Both transports failed for one request.
#[derive(thiserror::Error, Debug)]
#[error("streaming synthesis failed ({streaming}); fallback synthesis failed ({fallback})")]
pub struct SynthesisFailure {
    pub streaming: StreamError,
    pub fallback: FallbackError,
}

/// Transport policy for one synthesis: streaming first, and on any
/// streaming failure a single fallback attempt with the same request.
#[derive(Clone)]
pub struct SynthesisOrchestrator<S, F>
where
    S: StreamingTts,
    F: FallbackTts,
{
    streaming: S,
    fallback: F,
    default_voice: VoiceId,
    model_id: String,
}

impl<S, F> SynthesisOrchestrator<S, F>
where
    S: StreamingTts,
    F: FallbackTts,
{
    pub fn new(streaming: S, fallback: F) -> Self {
        Self {
            streaming,
            fallback,
            default_voice: VoiceId(DEFAULT_VOICE_ID.to_owned()),
            model_id: DEFAULT_MODEL_ID.to_owned(),
        }
    }

    pub fn with_default_voice(mut self, voice: VoiceId) -> Self {
        self.default_voice = voice;
        self
    }

    pub fn with_model<M: Into<String>>(mut self, model_id: M) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Build the request a narration will be synthesized with, filling in
    /// the configured voice and model where the caller left them out.
    pub fn request(&self, text: &str, voice: Option<VoiceId>) -> SynthesisRequest {
        SynthesisRequest::new(text)
            .with_voice(voice.unwrap_or_else(|| self.default_voice.clone()))
            .with_model(self.model_id.clone())
    }

    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<VoiceId>,
    ) -> Result<SynthesisResult, SynthesisFailure> {
        let request = self.request(text, voice);
        match self.streaming.synthesize(request.clone()).await {
            Ok(audio) => {
                debug!(target: LOG_TARGET, bytes = audio.len(), "streaming synthesis succeeded");
                Ok(SynthesisResult {
                    audio,
                    transport: Transport::Streaming,
                })
            }
            Err(streaming) => {
                warn!(target: LOG_TARGET, "streaming synthesis failed, trying http fallback: {streaming}");
                match self.fallback.synthesize(request).await {
                    Ok(audio) => Ok(SynthesisResult {
                        audio,
                        transport: Transport::Fallback,
                    }),
                    Err(fallback) => Err(SynthesisFailure {
                        streaming,
                        fallback,
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{future::BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Clone)]
    struct OkStream(Vec<u8>);

    impl StreamingTts for OkStream {
        fn synthesize(
            &self,
            _request: SynthesisRequest,
        ) -> BoxFuture<'_, Result<Vec<u8>, StreamError>> {
            let audio = self.0.clone();
            async move { Ok(audio) }.boxed()
        }

        fn relay(
            &self,
            _request: SynthesisRequest,
            chunks: mpsc::Sender<Bytes>,
        ) -> BoxFuture<'_, Result<(), StreamError>> {
            let audio = self.0.clone();
            async move {
                let _ = chunks.send(Bytes::from(audio)).await;
                Ok(())
            }
            .boxed()
        }
    }

    #[derive(Clone)]
    struct RecordingStream {
        seen: Arc<Mutex<Vec<SynthesisRequest>>>,
    }

    impl StreamingTts for RecordingStream {
        fn synthesize(
            &self,
            request: SynthesisRequest,
        ) -> BoxFuture<'_, Result<Vec<u8>, StreamError>> {
            self.seen.lock().unwrap().push(request);
            async { Ok(vec![1]) }.boxed()
        }

        fn relay(
            &self,
            request: SynthesisRequest,
            _chunks: mpsc::Sender<Bytes>,
        ) -> BoxFuture<'_, Result<(), StreamError>> {
            self.seen.lock().unwrap().push(request);
            async { Ok(()) }.boxed()
        }
    }

    #[derive(Clone)]
    struct UpstreamErrorStream;

    impl StreamingTts for UpstreamErrorStream {
        fn synthesize(
            &self,
            _request: SynthesisRequest,
        ) -> BoxFuture<'_, Result<Vec<u8>, StreamError>> {
            async { Err(StreamError::Upstream("voice not found".to_owned())) }.boxed()
        }

        fn relay(
            &self,
            _request: SynthesisRequest,
            _chunks: mpsc::Sender<Bytes>,
        ) -> BoxFuture<'_, Result<(), StreamError>> {
            async { Err(StreamError::Upstream("voice not found".to_owned())) }.boxed()
        }
    }

    #[derive(Clone)]
    struct TimeoutStream;

    impl StreamingTts for TimeoutStream {
        fn synthesize(
            &self,
            _request: SynthesisRequest,
        ) -> BoxFuture<'_, Result<Vec<u8>, StreamError>> {
            async { Err(StreamError::ConnectTimeout(Duration::from_secs(30))) }.boxed()
        }

        fn relay(
            &self,
            _request: SynthesisRequest,
            _chunks: mpsc::Sender<Bytes>,
        ) -> BoxFuture<'_, Result<(), StreamError>> {
            async { Err(StreamError::ConnectTimeout(Duration::from_secs(30))) }.boxed()
        }
    }

    #[derive(Clone)]
    struct NoAudioStream;

    impl StreamingTts for NoAudioStream {
        fn synthesize(
            &self,
            _request: SynthesisRequest,
        ) -> BoxFuture<'_, Result<Vec<u8>, StreamError>> {
            async { Err(StreamError::NoAudio) }.boxed()
        }

        fn relay(
            &self,
            _request: SynthesisRequest,
            _chunks: mpsc::Sender<Bytes>,
        ) -> BoxFuture<'_, Result<(), StreamError>> {
            async { Err(StreamError::NoAudio) }.boxed()
        }
    }

    #[derive(Clone)]
    struct CountingFallback {
        calls: Arc<AtomicUsize>,
        audio: Vec<u8>,
    }

    impl CountingFallback {
        fn new(audio: Vec<u8>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                audio,
            }
        }
    }

    impl FallbackTts for CountingFallback {
        fn synthesize(
            &self,
            _request: SynthesisRequest,
        ) -> BoxFuture<'_, Result<Vec<u8>, FallbackError>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let audio = self.audio.clone();
            async move { Ok(audio) }.boxed()
        }
    }

    #[derive(Clone)]
    struct FailingFallback {
        calls: Arc<AtomicUsize>,
    }

    impl FailingFallback {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl FallbackTts for FailingFallback {
        fn synthesize(
            &self,
            _request: SynthesisRequest,
        ) -> BoxFuture<'_, Result<Vec<u8>, FallbackError>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            async {
                Err(FallbackError::UpstreamStatus {
                    status: 500,
                    body: "server error".to_owned(),
                })
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn streaming_success_skips_fallback() {
        let fallback = CountingFallback::new(vec![0x10, 0x11]);
        let orchestrator =
            SynthesisOrchestrator::new(OkStream(vec![1, 2, 3, 4, 5]), fallback.clone());

        let result = orchestrator.synthesize("three KPIs are up", None).await.unwrap();
        assert_eq!(result.audio, vec![1, 2, 3, 4, 5]);
        assert_eq!(result.transport, Transport::Streaming);
        assert_eq!(fallback.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn upstream_error_frame_triggers_fallback() {
        let fallback = CountingFallback::new(vec![0x10, 0x11]);
        let orchestrator = SynthesisOrchestrator::new(UpstreamErrorStream, fallback.clone());

        let result = orchestrator.synthesize("hello", None).await.unwrap();
        assert_eq!(result.audio, vec![0x10, 0x11]);
        assert_eq!(result.transport, Transport::Fallback);
        assert_eq!(fallback.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn zero_chunk_stream_triggers_fallback() {
        let fallback = CountingFallback::new(vec![0x42]);
        let orchestrator = SynthesisOrchestrator::new(NoAudioStream, fallback.clone());

        let result = orchestrator.synthesize("hello", None).await.unwrap();
        assert_eq!(result.transport, Transport::Fallback);
        assert_eq!(fallback.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn both_transports_failing_reports_both_causes() {
        let fallback = FailingFallback::new();
        let orchestrator = SynthesisOrchestrator::new(TimeoutStream, fallback.clone());

        let err = orchestrator.synthesize("hello", None).await.unwrap_err();
        assert!(matches!(err.streaming, StreamError::ConnectTimeout(_)));
        assert!(matches!(
            err.fallback,
            FallbackError::UpstreamStatus { status: 500, .. }
        ));
        // A single fallback attempt, no retries.
        assert_eq!(fallback.calls.load(Ordering::Relaxed), 1);
        let message = err.to_string();
        assert!(message.contains("timed out"));
        assert!(message.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn requests_carry_defaults_and_voice_overrides() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = SynthesisOrchestrator::new(
            RecordingStream { seen: seen.clone() },
            CountingFallback::new(vec![]),
        )
        .with_model("eleven_turbo_v2");

        orchestrator.synthesize("first", None).await.unwrap();
        orchestrator
            .synthesize("second", Some(VoiceId("custom-voice".to_owned())))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].voice.0, crate::config::DEFAULT_VOICE_ID);
        assert_eq!(seen[0].model_id, "eleven_turbo_v2");
        assert_eq!(seen[0].chunk_schedule, crate::tts::DEFAULT_CHUNK_SCHEDULE.to_vec());
        assert_eq!(seen[1].voice.0, "custom-voice");
    }
}
