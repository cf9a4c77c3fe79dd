mod gemini;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use gemini::GeminiNarrator;

/// Dashboard payload handed over by the dashboard generator. Treated
/// opaquely: the narration prompt embeds it as JSON and the generator
/// model does the reading.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DashboardDescription(pub serde_json::Value);

impl DashboardDescription {
    pub fn title(&self) -> Option<&str> {
        self.0
            .get("dashboardTitle")
            .or_else(|| self.0.get("title"))
            .and_then(|v| v.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("narration request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("narration backend returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("narration backend returned no usable text")]
    EmptyNarration,
}

pub trait NarrationGenerator: Send + Sync {
    fn generate(
        &self,
        dashboard: DashboardDescription,
    ) -> BoxFuture<'_, Result<String, GenerationError>>;
}

/// Stateless prompt construction over the dashboard payload.
pub fn narration_prompt(dashboard: &DashboardDescription) -> String {
    let payload =
        serde_json::to_string_pretty(&dashboard.0).unwrap_or_else(|_| dashboard.0.to_string());
    format!(
        "You are narrating an analytics dashboard for a listener who cannot see it.\n\
         Explain the key figures and trends in plain spoken language, as a single\n\
         short paragraph of no more than 120 words. No markdown, no lists.\n\n\
         Dashboard data (JSON):\n{payload}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_embeds_the_dashboard_payload() {
        let dashboard = DashboardDescription(json!({
            "dashboardTitle": "Q3 Sales",
            "kpis": [{ "label": "Revenue", "value": 1200 }],
        }));
        let prompt = narration_prompt(&dashboard);
        assert!(prompt.contains("Q3 Sales"));
        assert!(prompt.contains("Revenue"));
        assert!(prompt.contains("spoken language"));
    }

    #[test]
    fn title_reads_both_naming_conventions() {
        let a = DashboardDescription(json!({ "dashboardTitle": "A" }));
        let b = DashboardDescription(json!({ "title": "B" }));
        let c = DashboardDescription(json!({ "rows": [] }));
        assert_eq!(a.title(), Some("A"));
        assert_eq!(b.title(), Some("B"));
        assert_eq!(c.title(), None);
    }
}
