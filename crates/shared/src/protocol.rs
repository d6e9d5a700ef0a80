use serde::{Deserialize, Serialize};

use crate::domain::{MapSettings, ResponseKind, SurveyId};

/// One inbound text message, already normalised by a gateway adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from_number: String,
    pub body_text: String,
    pub survey_id: SurveyId,
}

/// Gateway webhook body. Accepts both the `From`/`Body` and the
/// `from_number`/`content` field spellings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRequest {
    #[serde(alias = "From")]
    pub from_number: String,
    #[serde(alias = "Body", default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReply {
    pub messages: Vec<OutboundMessage>,
}

impl WebhookReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            messages: vec![OutboundMessage {
                content: content.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
    #[serde(alias = "text")]
    pub prompt_text: String,
    #[serde(alias = "summaryText")]
    pub summary_text: String,
    #[serde(alias = "responseType")]
    pub response_kind: ResponseKind,
    #[serde(default, alias = "cmId")]
    pub map_question_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSurvey {
    pub name: String,
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
    #[serde(default)]
    pub map: Option<MapSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveySummary {
    pub survey_id: SurveyId,
    pub name: String,
    pub active: bool,
    pub question_count: usize,
}

/// Body of a survey import from an existing crisis map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapImportRequest {
    #[serde(alias = "mapId")]
    pub map_id: String,
    #[serde(alias = "apiKey", default)]
    pub api_key: String,
}
