use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

use super::{StreamError, StreamingTts, SynthesisRequest};

const LOG_TARGET: &str = "tts::relay";
const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Live passthrough: chunks go straight from the synthesis stream to the
/// consumer. No whole-waveform buffering and no fallback transport.
#[derive(Clone)]
pub struct LiveRelay<S>
where
    S: StreamingTts + Clone + Send + 'static,
{
    streaming: S,
}

#[derive(Debug)]
pub struct LiveSession {
    /// Audio chunks in arrival order. Closed once the session is terminal.
    pub chunks: mpsc::Receiver<Bytes>,
    /// A failed session only closes the channel; the error itself is
    /// reported here, out of band.
    pub outcome: JoinHandle<Result<(), StreamError>>,
}

impl<S> LiveRelay<S>
where
    S: StreamingTts + Clone + Send + 'static,
{
    pub fn new(streaming: S) -> Self {
        Self { streaming }
    }

    pub fn spawn(&self, request: SynthesisRequest) -> LiveSession {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let streaming = self.streaming.clone();
        let outcome = tokio::spawn(async move {
            let result = streaming.relay(request, tx).await;
            if let Err(e) = &result {
                warn!(target: LOG_TARGET, "live synthesis session failed: {e}");
            }
            result
        });
        LiveSession {
            chunks: rx,
            outcome,
        }
    }
}
