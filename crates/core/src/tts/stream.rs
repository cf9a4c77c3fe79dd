use std::time::Duration;

use bytes::Bytes;
use futures::{future::BoxFuture, FutureExt, SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use super::protocol::{self, DecodeError, ProtocolFrame};
use super::{ServerFrame, StreamingTts, SynthesisRequest};
use crate::config::{ApiKey, DEFAULT_CONNECT_TIMEOUT_SECS};

const LOG_TARGET: &str = "tts::stream";

pub const DEFAULT_STREAM_BASE_URL: &str = "wss://api.elevenlabs.io/v1";

#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("connecting to the synthesis stream timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("failed to connect to the synthesis stream: {0}")]
    Connect(tokio_tungstenite::tungstenite::Error),
    #[error("synthesis stream transport error: {0}")]
    Transport(tokio_tungstenite::tungstenite::Error),
    #[error("could not encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("could not decode synthesis frame: {0}")]
    Frame(#[from] DecodeError),
    #[error("synthesis backend reported an error: {0}")]
    Upstream(String),
    #[error("synthesis stream ended without producing audio")]
    NoAudio,
    #[error("api key is not a valid header value")]
    CredentialHeader,
}

/// Streaming text-to-speech over the duplex synthesis protocol: one
/// connection per request, configuration and text sent eagerly, audio
/// chunks collected (or relayed) in arrival order.
#[derive(Clone, Debug)]
pub struct ElevenLabsStreamClient {
    api_key: ApiKey,
    base_url: String,
    connect_timeout: Duration,
}

impl ElevenLabsStreamClient {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_STREAM_BASE_URL.to_owned(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>, StreamError> {
        let mut audio = Vec::new();
        self.run(&request, &mut ChunkSink::Buffer(&mut audio))
            .await?;
        Ok(audio)
    }

    pub async fn relay(
        &self,
        request: SynthesisRequest,
        chunks: mpsc::Sender<Bytes>,
    ) -> Result<(), StreamError> {
        self.run(&request, &mut ChunkSink::Live(&chunks)).await
    }

    fn stream_url(&self, request: &SynthesisRequest) -> String {
        format!(
            "{}/text-to-speech/{}/stream-input?model_id={}",
            self.base_url, request.voice.0, request.model_id
        )
    }

    async fn run(
        &self,
        request: &SynthesisRequest,
        sink: &mut ChunkSink<'_>,
    ) -> Result<(), StreamError> {
        let mut ws_request = self
            .stream_url(request)
            .into_client_request()
            .map_err(StreamError::Connect)?;
        let credential = HeaderValue::from_str(self.api_key.expose())
            .map_err(|_| StreamError::CredentialHeader)?;
        ws_request.headers_mut().insert("xi-api-key", credential);

        debug!(target: LOG_TARGET, voice = %request.voice.0, "connecting to synthesis stream");
        let mut ws = match timeout(self.connect_timeout, connect_async(ws_request)).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => return Err(StreamError::Connect(e)),
            Err(_) => return Err(StreamError::ConnectTimeout(self.connect_timeout)),
        };

        let mut session = Session::new();
        session.connected();
        let result = drive(&mut session, &mut ws, request, self.api_key.expose(), sink).await;
        // Every terminal path tears the connection down before reporting.
        let _ = ws.close(None).await;
        result
    }
}

impl StreamingTts for ElevenLabsStreamClient {
    fn synthesize(&self, request: SynthesisRequest) -> BoxFuture<'_, Result<Vec<u8>, StreamError>> {
        let this = self.clone();
        async move { this.synthesize(request).await }.boxed()
    }

    fn relay(
        &self,
        request: SynthesisRequest,
        chunks: mpsc::Sender<Bytes>,
    ) -> BoxFuture<'_, Result<(), StreamError>> {
        let this = self.clone();
        async move { this.relay(request, chunks).await }.boxed()
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Destination for delivered chunks: an owned buffer for the buffering
/// entry point, a channel for the live relay.
enum ChunkSink<'a> {
    Buffer(&'a mut Vec<u8>),
    Live(&'a mpsc::Sender<Bytes>),
}

struct SinkClosed;

impl ChunkSink<'_> {
    async fn deliver(&mut self, bytes: Bytes) -> Result<(), SinkClosed> {
        match self {
            ChunkSink::Buffer(buffer) => {
                buffer.extend_from_slice(&bytes);
                Ok(())
            }
            ChunkSink::Live(sender) => sender.send(bytes).await.map_err(|_| SinkClosed),
        }
    }
}

async fn drive(
    session: &mut Session,
    ws: &mut WsStream,
    request: &SynthesisRequest,
    credential: &str,
    sink: &mut ChunkSink<'_>,
) -> Result<(), StreamError> {
    // Send everything up front; the backend needs no acknowledgement
    // before audio can arrive.
    send_frame(
        ws,
        &ProtocolFrame::Init {
            voice_settings: request.voice_settings.clone(),
            chunk_schedule: request.chunk_schedule.clone(),
            credential: credential.to_owned(),
        },
    )
    .await?;
    session.init_sent();
    send_frame(
        ws,
        &ProtocolFrame::Text {
            content: request.text.clone(),
        },
    )
    .await?;
    send_frame(ws, &ProtocolFrame::EndOfStream).await?;

    while let Some(message) = ws.next().await {
        let step = match message {
            Ok(Message::Text(raw)) => match protocol::decode(&raw) {
                Ok(Some(frame)) => session.on_frame(frame),
                Ok(None) => Step::Continue,
                Err(e) => session.fail(StreamError::Frame(e)),
            },
            Ok(Message::Close(_)) => session.on_peer_close(),
            Ok(Message::Binary(payload)) => {
                debug!(target: LOG_TARGET, bytes = payload.len(), "ignoring unexpected binary frame");
                Step::Continue
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Step::Continue,
            Err(e) => session.fail(StreamError::Transport(e)),
        };
        match step {
            Step::Deliver(bytes) => {
                if sink.deliver(bytes).await.is_err() {
                    debug!(target: LOG_TARGET, "chunk receiver dropped, closing session");
                    return Ok(());
                }
            }
            Step::Continue => {}
            Step::Complete => {
                debug!(target: LOG_TARGET, chunks = session.chunks_received, "synthesis stream completed");
                return Ok(());
            }
            Step::Fail(err) => return Err(err),
        }
    }
    // Stream ended without a close frame; resolve as a peer close.
    match session.on_peer_close() {
        Step::Fail(err) => Err(err),
        _ => Ok(()),
    }
}

async fn send_frame(ws: &mut WsStream, frame: &ProtocolFrame) -> Result<(), StreamError> {
    let payload = protocol::encode(frame)?;
    ws.send(Message::Text(payload))
        .await
        .map_err(StreamError::Transport)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Connecting,
    AwaitingAck,
    Streaming,
    Draining,
    Completed,
    Failed,
}

/// Per-session state. Resolution is single-shot: after the first terminal
/// transition every further event is ignored.
#[derive(Debug)]
struct Session {
    state: SessionState,
    chunks_received: usize,
}

enum Step {
    Deliver(Bytes),
    Continue,
    Complete,
    Fail(StreamError),
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            chunks_received: 0,
        }
    }

    fn connected(&mut self) {
        self.state = SessionState::AwaitingAck;
    }

    /// No server ack is awaited; the session is streaming as soon as the
    /// configuration frame is on the wire.
    fn init_sent(&mut self) {
        self.state = SessionState::Streaming;
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Completed | SessionState::Failed)
    }

    fn fail(&mut self, err: StreamError) -> Step {
        if self.is_terminal() {
            return Step::Continue;
        }
        self.state = SessionState::Failed;
        Step::Fail(err)
    }

    fn on_frame(&mut self, frame: ServerFrame) -> Step {
        if self.is_terminal() {
            return Step::Continue;
        }
        match frame {
            ServerFrame::Error(message) => self.fail(StreamError::Upstream(message)),
            ServerFrame::AudioChunk(bytes) => {
                self.chunks_received += 1;
                Step::Deliver(bytes)
            }
            ServerFrame::Final => {
                if self.chunks_received == 0 {
                    self.fail(StreamError::NoAudio)
                } else {
                    self.state = SessionState::Completed;
                    Step::Complete
                }
            }
        }
    }

    /// Peer closed before a final marker. Chunks already received are
    /// kept: a truncated stream with audio still resolves as completed.
    fn on_peer_close(&mut self) -> Step {
        if self.is_terminal() {
            return Step::Continue;
        }
        self.state = SessionState::Draining;
        if self.chunks_received == 0 {
            self.fail(StreamError::NoAudio)
        } else {
            self.state = SessionState::Completed;
            Step::Complete
        }
    }
}
