use dashboard_narrator_core::narration::DashboardDescription;
use dashboard_narrator_core::tts::VoiceId;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

/// Request body shared by `/narrate` and `/narrate/stream`.
#[derive(Deserialize)]
pub struct NarrateBody {
    #[serde(default)]
    pub dashboard: Option<Value>,
    #[serde(default)]
    pub voice_id: Option<String>,
}

impl NarrateBody {
    /// Splits the payload into pipeline inputs. `dashboard` must be present
    /// and non-null; `voice_id` may be omitted but not blank.
    pub fn validate(self) -> Result<(DashboardDescription, Option<VoiceId>), ApiError> {
        let dashboard = match self.dashboard {
            Some(value) if !value.is_null() => value,
            _ => {
                return Err(ApiError::Invalid(
                    "dashboard must be present and non-null".to_owned(),
                ))
            }
        };

        let voice = match self.voice_id {
            Some(id) if id.trim().is_empty() => {
                return Err(ApiError::Invalid("voice_id must not be blank".to_owned()))
            }
            Some(id) => Some(VoiceId(id)),
            None => None,
        };

        Ok((DashboardDescription(dashboard), voice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_dashboard_with_voice_override() {
        let body = NarrateBody {
            dashboard: Some(json!({ "dashboardTitle": "Revenue" })),
            voice_id: Some("voice-1".to_owned()),
        };
        let (dashboard, voice) = body.validate().unwrap();
        assert_eq!(dashboard.title(), Some("Revenue"));
        assert_eq!(voice, Some(VoiceId("voice-1".to_owned())));
    }

    #[test]
    fn missing_voice_id_leaves_the_default_in_place() {
        let body = NarrateBody {
            dashboard: Some(json!({})),
            voice_id: None,
        };
        let (_, voice) = body.validate().unwrap();
        assert_eq!(voice, None);
    }

    #[test]
    fn rejects_missing_dashboard() {
        let body = NarrateBody {
            dashboard: None,
            voice_id: None,
        };
        let err = body.validate().unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }

    #[test]
    fn rejects_null_dashboard() {
        let body = NarrateBody {
            dashboard: Some(Value::Null),
            voice_id: None,
        };
        assert!(body.validate().is_err());
    }

    #[test]
    fn rejects_blank_voice_id() {
        let body = NarrateBody {
            dashboard: Some(json!({})),
            voice_id: Some("   ".to_owned()),
        };
        assert!(body.validate().is_err());
    }

    #[test]
    fn body_deserializes_with_absent_fields() {
        let body: NarrateBody = serde_json::from_str(r#"{"dashboard": {"title": "Ops"}}"#).unwrap();
        assert!(body.voice_id.is_none());
        assert!(body.validate().is_ok());
    }
}
