#![deny(warnings)]

pub mod error;
pub mod validation;

use std::{convert::Infallible, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use dashboard_narrator_core::config::{
    parse_bind_addr, require_api_key, resolve_string_with_default, ApiCredentials, AppConfig, Env,
    StdEnv, DEFAULT_BIND_ADDR, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MODEL_ID,
    DEFAULT_NARRATION_MODEL, DEFAULT_VOICE_ID, ENV_BIND_ADDR, ENV_ELEVENLABS_API_KEY,
    ENV_GEMINI_API_KEY, ENV_MODEL_ID, ENV_NARRATION_MODEL, ENV_VOICE_ID,
};
use dashboard_narrator_core::narration::GeminiNarrator;
use dashboard_narrator_core::pipeline::{LiveNarration, NarrationPipeline};
use dashboard_narrator_core::tts::{
    ElevenLabsHttpClient, ElevenLabsStreamClient, Transport, VoiceId,
};

use crate::error::ApiError;
use crate::validation::NarrateBody;

/// Whole-request deadline for the buffered routes. A streamed body is not
/// covered once the response headers are out.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

type AppPipeline = NarrationPipeline<GeminiNarrator, ElevenLabsStreamClient, ElevenLabsHttpClient>;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<AppPipeline>,
}

#[derive(Parser, Debug)]
#[command(name = "dashboard-narrator")]
#[command(about = "Serves spoken narration for dashboard descriptions (Gemini -> ElevenLabs)")]
struct Args {
    #[arg(long)]
    gemini_api_key: Option<String>,

    #[arg(long)]
    elevenlabs_api_key: Option<String>,

    #[arg(long)]
    bind_addr: Option<String>,

    #[arg(long)]
    voice_id: Option<String>,

    #[arg(long)]
    model_id: Option<String>,

    #[arg(long)]
    narration_model: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _ = dotenv::dotenv();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        bind_addr = %cfg.bind_addr,
        voice_id = %cfg.voice_id,
        narration_model = %cfg.narration_model,
        "config loaded"
    );

    run_server(cfg).await
}

async fn run_server(cfg: AppConfig) -> anyhow::Result<()> {
    let narrator = GeminiNarrator::new(cfg.credentials.narration.clone())
        .with_model(cfg.narration_model.clone());
    let streaming = ElevenLabsStreamClient::new(cfg.credentials.synthesis.clone())
        .with_connect_timeout(cfg.connect_timeout);
    let fallback = ElevenLabsHttpClient::new(cfg.credentials.synthesis.clone());

    let pipeline = NarrationPipeline::new(narrator, streaming, fallback)
        .with_default_voice(VoiceId(cfg.voice_id.clone()))
        .with_model(cfg.model_id.clone());

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    tracing::info!("listening on http://{}", cfg.bind_addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/narrate", post(narrate))
        .route("/narrate/stream", post(narrate_stream))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct NarrateResponse {
    narration: String,
    audio_base64: String,
    transport: Transport,
}

async fn narrate(
    State(state): State<AppState>,
    Json(body): Json<NarrateBody>,
) -> Result<Json<NarrateResponse>, ApiError> {
    let (dashboard, voice) = body.validate()?;
    let narrated = state.pipeline.narrate(dashboard, voice).await?;
    Ok(Json(NarrateResponse {
        narration: narrated.narration,
        audio_base64: general_purpose::STANDARD.encode(&narrated.audio),
        transport: narrated.transport,
    }))
}

/// Chunked variant: audio goes out as the synthesizer produces it. A stream
/// failure after the first byte only ends the body early; the cause is
/// logged by the relay.
async fn narrate_stream(
    State(state): State<AppState>,
    Json(body): Json<NarrateBody>,
) -> Result<Response, ApiError> {
    let (dashboard, voice) = body.validate()?;
    let LiveNarration { narration, session } =
        state.pipeline.narrate_live(dashboard, voice).await?;
    tracing::debug!(chars = narration.len(), "streaming narration audio");

    let chunks = ReceiverStream::new(session.chunks).map(Ok::<Bytes, Infallible>);
    let response = (
        [(header::CONTENT_TYPE, "audio/mpeg")],
        Body::from_stream(chunks),
    )
        .into_response();
    Ok(response)
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let narration = require_api_key(args.gemini_api_key, ENV_GEMINI_API_KEY, env)?;
    let synthesis = require_api_key(args.elevenlabs_api_key, ENV_ELEVENLABS_API_KEY, env)?;

    let bind_addr =
        resolve_string_with_default(args.bind_addr, ENV_BIND_ADDR, env, DEFAULT_BIND_ADDR);

    Ok(AppConfig {
        credentials: ApiCredentials {
            narration,
            synthesis,
        },
        bind_addr: parse_bind_addr(&bind_addr)?,
        voice_id: resolve_string_with_default(args.voice_id, ENV_VOICE_ID, env, DEFAULT_VOICE_ID),
        model_id: resolve_string_with_default(args.model_id, ENV_MODEL_ID, env, DEFAULT_MODEL_ID),
        narration_model: resolve_string_with_default(
            args.narration_model,
            ENV_NARRATION_MODEL,
            env,
            DEFAULT_NARRATION_MODEL,
        ),
        connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
    })
}
