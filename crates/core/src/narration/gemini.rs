use futures::{future::BoxFuture, FutureExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{narration_prompt, DashboardDescription, GenerationError, NarrationGenerator};
use crate::config::{ApiKey, DEFAULT_NARRATION_MODEL};

const LOG_TARGET: &str = "narration::gemini";

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Narration via the Gemini generateContent API.
#[derive(Clone)]
pub struct GeminiNarrator {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiNarrator {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_GEMINI_BASE_URL.to_owned(),
            model: DEFAULT_NARRATION_MODEL.to_owned(),
        }
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    pub async fn generate(
        &self,
        dashboard: DashboardDescription,
    ) -> Result<String, GenerationError> {
        let prompt = narration_prompt(&dashboard);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(target: LOG_TARGET, model = %self.model, "requesting dashboard narration");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&GenerateContentRequest {
                contents: [RequestContent {
                    parts: [RequestPart { text: &prompt }],
                }],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        match extract_narration(parsed) {
            Some(narration) => Ok(narration),
            None => Err(GenerationError::EmptyNarration),
        }
    }
}

/// First candidate's parts, joined and trimmed. `None` when the model
/// produced no usable text.
fn extract_narration(response: GenerateContentResponse) -> Option<String> {
    let narration: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    let narration = narration.trim();
    if narration.is_empty() {
        None
    } else {
        Some(narration.to_owned())
    }
}

impl NarrationGenerator for GeminiNarrator {
    fn generate(
        &self,
        dashboard: DashboardDescription,
    ) -> BoxFuture<'_, Result<String, GenerationError>> {
        let this = self.clone();
        async move { this.generate(dashboard).await }.boxed()
    }
}
