use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ReporterId);
id_newtype!(SurveyId);
id_newtype!(QuestionId);
id_newtype!(ResponseId);

/// Dot-joined code path of a place, e.g. `SO.22.8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(pub String);

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Text,
    Number,
}

impl ResponseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::Text => "text",
            ResponseKind::Number => "number",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("number") {
            ResponseKind::Number
        } else {
            ResponseKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt_text: String,
    pub summary_text: String,
    pub response_kind: ResponseKind,
    /// Question id on the external crisis map, when the survey is linked to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_question_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSettings {
    #[serde(alias = "mapId")]
    pub map_id: String,
    #[serde(alias = "topicId")]
    pub topic_id: String,
    #[serde(alias = "apiKey", default)]
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: SurveyId,
    pub name: String,
    pub active: bool,
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MapSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminLevel {
    pub level_name: String,
    pub value: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub lat: f64,
    pub lng: f64,
}

/// A reportable location: the admin levels from the catalog root down to the
/// chosen node, least specific first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub levels: Vec<AdminLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Centroid>,
}

impl Place {
    pub fn place_id(&self) -> PlaceId {
        PlaceId(
            self.levels
                .iter()
                .map(|level| level.code.as_str())
                .collect::<Vec<_>>()
                .join("."),
        )
    }

    pub fn name(&self) -> &str {
        self.levels
            .last()
            .map(|level| level.value.as_str())
            .unwrap_or_default()
    }

    /// Renders `Ward: ACHIDA, WURNO, SOKOTO`.
    pub fn describe(&self) -> String {
        let Some(leaf) = self.levels.last() else {
            return String::new();
        };
        let names = self
            .levels
            .iter()
            .rev()
            .map(|level| level.value.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}: {names}", capitalize(&leaf.level_name))
    }
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// In-flight position of the interactive location dialog. Stored on the
/// reporter so the dialog survives between messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDraft {
    /// Child names chosen so far, root first.
    pub path: Vec<String>,
    /// Ranked candidates last shown to the reporter.
    #[serde(default)]
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reporter {
    pub id: ReporterId,
    pub name: String,
    pub phone_numbers: Vec<String>,
    pub places: Vec<Place>,
    pub current_command: Option<String>,
    pub next_step: i64,
    pub current_place_id: Option<PlaceId>,
    pub location_draft: Option<LocationDraft>,
}

impl Reporter {
    pub fn place(&self, place_id: &PlaceId) -> Option<&Place> {
        self.places.iter().find(|place| &place.place_id() == place_id)
    }

    pub fn current_place(&self) -> Option<&Place> {
        self.current_place_id
            .as_ref()
            .and_then(|place_id| self.place(place_id))
    }
}

/// Reporting period, an epidemiological week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub year: i32,
    pub week: u32,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid interval '{0}', expected YYYY-Www")]
pub struct IntervalParseError(pub String);

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || IntervalParseError(raw.to_string());
        let (year, week) = raw.split_once("-W").ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let week = week.parse::<u32>().map_err(|_| invalid())?;
        if !(1..=53).contains(&week) {
            return Err(invalid());
        }
        Ok(Self { year, week })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question_id: QuestionId,
    pub raw_text: String,
    /// `None` on a numeric question means the reporter answered "unknown".
    pub numeric_value: Option<f64>,
}

/// Composite identity of a survey response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    pub survey_id: SurveyId,
    pub reporter_id: ReporterId,
    pub place_id: PlaceId,
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: ResponseId,
    pub survey_id: SurveyId,
    pub reporter_id: ReporterId,
    pub place_id: PlaceId,
    pub interval: Interval,
    pub phone_number: String,
    pub complete: bool,
    pub completed_on: Option<DateTime<Utc>>,
    pub comment_text: Option<String>,
    pub responses: Vec<QuestionResponse>,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
