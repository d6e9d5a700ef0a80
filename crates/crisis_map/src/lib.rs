//! Outbound push of finished survey responses to a crisis map reports API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::domain::{Place, ResponseKind, Survey, SurveyResponse};
use thiserror::Error;
use tracing::info;
use url::Url;

pub mod import;

pub use import::{ImportError, MapImporter, DEFAULT_MAPS_URL};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("survey {0} has no crisis map settings")]
    NotLinked(i64),
    #[error("response {0} has not been completed")]
    Incomplete(i64),
    #[error("crisis map request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A finalized response plus the context needed to describe it externally.
#[derive(Debug, Clone)]
pub struct Submission {
    pub survey: Survey,
    pub response: SurveyResponse,
    pub place: Option<Place>,
    /// Start of the reporting interval the response covers.
    pub effective: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrisisMapReport {
    pub source: String,
    pub author: String,
    pub id: String,
    pub map_id: String,
    pub topic_ids: Vec<String>,
    pub submitted: i64,
    pub effective: i64,
    pub location: Option<[f64; 2]>,
    pub place_id: String,
    pub comment: String,
    pub answers: Map<String, Value>,
}

pub fn build_report(
    submission: &Submission,
    source_url: &str,
) -> Result<CrisisMapReport, PublishError> {
    let Submission {
        survey,
        response,
        place,
        effective,
    } = submission;
    let map = survey
        .map
        .as_ref()
        .ok_or(PublishError::NotLinked(survey.id.0))?;
    let submitted = response
        .completed_on
        .ok_or(PublishError::Incomplete(response.id.0))?;

    let topic = format!("{}.{}", map.map_id, map.topic_id);
    let mut answers = Map::new();
    for question in &survey.questions {
        let Some(answer) = response
            .responses
            .iter()
            .find(|answer| answer.question_id == question.id)
        else {
            continue;
        };
        let question_key = question
            .map_question_id
            .clone()
            .unwrap_or_else(|| question.id.0.to_string());
        let value = match question.response_kind {
            ResponseKind::Number => answer
                .numeric_value
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ResponseKind::Text => Value::String(answer.raw_text.clone()),
        };
        answers.insert(format!("{topic}.{question_key}"), value);
    }

    Ok(CrisisMapReport {
        source: source_url.to_string(),
        author: format!("tel:{}", response.phone_number),
        id: format!("{source_url}responses/{}", response.id.0),
        map_id: map.map_id.clone(),
        topic_ids: vec![topic],
        submitted: submitted.timestamp(),
        effective: effective.timestamp(),
        location: place
            .as_ref()
            .and_then(|place| place.centroid)
            .map(|centroid| [centroid.lat, centroid.lng]),
        place_id: response.place_id.0.clone(),
        comment: response.comment_text.clone().unwrap_or_default(),
        answers,
    })
}

#[async_trait]
pub trait ResponsePublisher: Send + Sync {
    async fn publish(&self, submission: Submission) -> Result<(), PublishError>;
}

/// Used when no reports endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl ResponsePublisher for NoopPublisher {
    async fn publish(&self, submission: Submission) -> Result<(), PublishError> {
        info!(
            response_id = submission.response.id.0,
            "crisis map: no endpoint configured, skipping push"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CrisisMapConfig {
    pub reports_url: Url,
    /// Identifies this service in pushed reports; also the base of report ids.
    pub source_url: String,
}

#[derive(Debug, Clone)]
pub struct CrisisMapClient {
    http: Client,
    config: CrisisMapConfig,
}

impl CrisisMapClient {
    pub fn new(config: CrisisMapConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ResponsePublisher for CrisisMapClient {
    async fn publish(&self, submission: Submission) -> Result<(), PublishError> {
        let report = build_report(&submission, &self.config.source_url)?;
        let api_key = submission
            .survey
            .map
            .as_ref()
            .map(|map| map.api_key.clone())
            .unwrap_or_default();
        info!(
            response_id = submission.response.id.0,
            phone_number = %submission.response.phone_number,
            map_id = %report.map_id,
            "crisis map: posting report"
        );
        let reply = self
            .http
            .post(self.config.reports_url.clone())
            .query(&[("key", api_key)])
            .json(&[report])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        info!(
            response_id = submission.response.id.0,
            reply = %reply,
            "crisis map: report accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
