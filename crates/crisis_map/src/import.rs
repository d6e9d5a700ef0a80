//! Builds a survey definition from a map published on the crisis map API.

use reqwest::Client;
use serde::Deserialize;
use shared::{
    domain::{MapSettings, ResponseKind},
    protocol::{NewQuestion, NewSurvey},
};
use thiserror::Error;
use tracing::info;
use url::Url;

pub const DEFAULT_MAPS_URL: &str = "https://msfcrisismap.appspot.com/.api/maps/";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("map id cannot be empty")]
    MissingMapId,
    #[error("maps url '{0}' cannot take a path")]
    BadMapsUrl(String),
    #[error("map {0} has no topics")]
    NoTopics(String),
    #[error("crisis map request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topics: Vec<MapTopic>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapTopic {
    pub id: String,
    #[serde(default)]
    pub questions: Vec<MapQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapQuestion {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// The first topic of the map becomes the survey. `NUMBER` questions are
/// numeric, everything else is free text.
pub fn survey_from_map(map: MapDocument, api_key: &str) -> Result<NewSurvey, ImportError> {
    let Some(topic) = map.topics.into_iter().next() else {
        return Err(ImportError::NoTopics(map.id));
    };
    let questions = topic
        .questions
        .into_iter()
        .map(|question| {
            let response_kind = if question.kind.eq_ignore_ascii_case("number") {
                ResponseKind::Number
            } else {
                ResponseKind::Text
            };
            let summary_text = if question.title.trim().is_empty() {
                question.text.clone()
            } else {
                question.title
            };
            NewQuestion {
                prompt_text: question.text,
                summary_text,
                response_kind,
                map_question_id: Some(question.id),
            }
        })
        .collect();

    let name = if map.title.trim().is_empty() {
        map.id.clone()
    } else {
        map.title
    };
    Ok(NewSurvey {
        name,
        questions,
        map: Some(MapSettings {
            map_id: map.id,
            topic_id: topic.id,
            api_key: api_key.to_string(),
        }),
    })
}

#[derive(Debug, Clone)]
pub struct MapImporter {
    http: Client,
    maps_url: Url,
}

impl MapImporter {
    pub fn new(maps_url: Url) -> Self {
        Self {
            http: Client::new(),
            maps_url,
        }
    }

    pub async fn fetch(&self, map_id: &str, api_key: &str) -> Result<NewSurvey, ImportError> {
        let map_id = map_id.trim();
        if map_id.is_empty() {
            return Err(ImportError::MissingMapId);
        }
        let mut url = self.maps_url.clone();
        url.path_segments_mut()
            .map_err(|_| ImportError::BadMapsUrl(self.maps_url.to_string()))?
            .pop_if_empty()
            .push(map_id);

        info!(%map_id, "crisis map: fetching map definition");
        let map: MapDocument = self
            .http
            .get(url)
            .query(&[("key", api_key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let survey = survey_from_map(map, api_key)?;
        info!(
            %map_id,
            questions = survey.questions.len(),
            "crisis map: map definition imported"
        );
        Ok(survey)
    }
}

#[cfg(test)]
#[path = "tests/import_tests.rs"]
mod tests;
