use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dashboard_narrator_core::pipeline::PipelineError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Pipeline(PipelineError::Generation(e)) => {
                tracing::error!("narration generation failed: {e}");
                (StatusCode::BAD_GATEWAY, format!("narration failed: {e}"))
            }
            ApiError::Pipeline(PipelineError::Synthesis(e)) => {
                tracing::error!("speech synthesis failed: {e}");
                (StatusCode::BAD_GATEWAY, format!("synthesis failed: {e}"))
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
