use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info};

use shared::{
    domain::{
        AdminLevel, Centroid, Interval, LocationDraft, MapSettings, Place, PlaceId, Question,
        QuestionId, QuestionResponse, Reporter, ReporterId, ResponseId, ResponseKey, ResponseKind,
        Survey, SurveyId, SurveyResponse,
    },
    protocol::{NewQuestion, NewSurvey},
};

/// Persistence operations the conversation engine depends on. Every call is
/// awaited before a turn's reply is produced.
#[async_trait]
pub trait InterviewStore: Send + Sync {
    /// Returns the reporter owning `phone_number`, creating one atomically if
    /// the number is unknown.
    async fn find_or_create_reporter(&self, phone_number: &str) -> Result<Reporter>;
    /// Persists the in-flight pointer: command, step, current place, draft.
    async fn save_reporter_state(&self, reporter: &Reporter) -> Result<()>;
    async fn replace_reporter_places(&self, reporter_id: ReporterId, places: &[Place])
        -> Result<()>;
    /// Appends a place unless one with the same place id is already known.
    /// Returns whether a row was added.
    async fn add_reporter_place(&self, reporter_id: ReporterId, place: &Place) -> Result<bool>;
    async fn load_survey(&self, survey_id: SurveyId) -> Result<Option<Survey>>;
    /// Find-or-create on the composite key in one statement, then replaces the
    /// answers wholesale and resets the comment. A complete response is never
    /// reopened: `None` means the key was already submitted.
    async fn upsert_survey_response(
        &self,
        key: &ResponseKey,
        phone_number: &str,
        answers: &[QuestionResponse],
    ) -> Result<Option<SurveyResponse>>;
    async fn find_survey_response(&self, key: &ResponseKey) -> Result<Option<SurveyResponse>>;
    /// Drops the answers and comment of an incomplete response. Returns
    /// `false` without touching anything when the response is complete.
    async fn clear_survey_answers(&self, response_id: ResponseId) -> Result<bool>;
    /// Marks the response complete. `completed_on` is only written the first
    /// time a response is finalized.
    async fn finalize_survey_response(
        &self,
        response_id: ResponseId,
        comment_text: &str,
        completed_on: DateTime<Utc>,
    ) -> Result<SurveyResponse>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // every connection to `sqlite::memory:` is its own database
        let pool_options = if database_url.starts_with("sqlite::memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(%database_url, "storage ready");
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_survey(&self, new_survey: &NewSurvey) -> Result<Survey> {
        let mut tx = self.pool.begin().await?;
        let map = new_survey.map.as_ref();
        let survey_id: i64 = sqlx::query_scalar(
            "INSERT INTO surveys (name, active, map_id, map_topic_id, map_api_key)
             VALUES (?, 1, ?, ?, ?) RETURNING id",
        )
        .bind(&new_survey.name)
        .bind(map.map(|m| m.map_id.as_str()))
        .bind(map.map(|m| m.topic_id.as_str()))
        .bind(map.map(|m| m.api_key.as_str()))
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert survey")?;

        insert_questions(&mut tx, survey_id, &new_survey.questions).await?;
        tx.commit().await?;

        info!(
            survey_id,
            questions = new_survey.questions.len(),
            "survey created"
        );
        self.load_survey(SurveyId(survey_id))
            .await?
            .context("survey vanished after insert")
    }

    pub async fn list_active_surveys(&self) -> Result<Vec<Survey>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM surveys WHERE active = 1 ORDER BY lower(name) ASC")
                .fetch_all(&self.pool)
                .await?;
        let mut surveys = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(survey) = self.load_survey(SurveyId(id)).await? {
                surveys.push(survey);
            }
        }
        Ok(surveys)
    }

    /// Swaps the whole question list. Stored answers keep their old question
    /// ids, so an in-flight response no longer pairs up and is asked for again.
    pub async fn replace_survey_questions(
        &self,
        survey_id: SurveyId,
        questions: &[NewQuestion],
    ) -> Result<Option<Survey>> {
        let mut tx = self.pool.begin().await?;
        let known: Option<i64> = sqlx::query_scalar("SELECT id FROM surveys WHERE id = ?")
            .bind(survey_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if known.is_none() {
            return Ok(None);
        }
        sqlx::query("DELETE FROM survey_questions WHERE survey_id = ?")
            .bind(survey_id.0)
            .execute(&mut *tx)
            .await?;
        insert_questions(&mut tx, survey_id.0, questions).await?;
        tx.commit().await?;

        info!(
            survey_id = survey_id.0,
            questions = questions.len(),
            "survey questions replaced"
        );
        self.load_survey(survey_id).await
    }

    /// Links the survey to a crisis map, or unlinks it with `None`.
    pub async fn update_survey_map(
        &self,
        survey_id: SurveyId,
        map: Option<&MapSettings>,
    ) -> Result<Option<Survey>> {
        let result = sqlx::query(
            "UPDATE surveys SET map_id = ?, map_topic_id = ?, map_api_key = ? WHERE id = ?",
        )
        .bind(map.map(|m| m.map_id.as_str()))
        .bind(map.map(|m| m.topic_id.as_str()))
        .bind(map.map(|m| m.api_key.as_str()))
        .bind(survey_id.0)
        .execute(&self.pool)
        .await
        .context("failed to update survey map settings")?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        info!(
            survey_id = survey_id.0,
            map_id = map.map(|m| m.map_id.as_str()).unwrap_or_default(),
            "survey map settings updated"
        );
        self.load_survey(survey_id).await
    }

    pub async fn deactivate_survey(&self, survey_id: SurveyId) -> Result<bool> {
        let result = sqlx::query("UPDATE surveys SET active = 0 WHERE id = ?")
            .bind(survey_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn list_responses_for_survey(
        &self,
        survey_id: SurveyId,
    ) -> Result<Vec<SurveyResponse>> {
        let rows = sqlx::query(&format!(
            "{RESPONSE_COLUMNS} WHERE survey_id = ? ORDER BY id ASC"
        ))
        .bind(survey_id.0)
        .fetch_all(&self.pool)
        .await?;
        let mut responses = Vec::with_capacity(rows.len());
        for row in rows {
            responses.push(self.hydrate_response(&row).await?);
        }
        Ok(responses)
    }

    async fn load_reporter(&self, reporter_id: ReporterId) -> Result<Option<Reporter>> {
        let Some(row) = sqlx::query(
            "SELECT id, name, current_command, next_step, current_place_id, location_draft
             FROM reporters WHERE id = ?",
        )
        .bind(reporter_id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let phone_numbers: Vec<String> = sqlx::query_scalar(
            "SELECT phone_number FROM reporter_phone_numbers WHERE reporter_id = ? ORDER BY phone_number",
        )
        .bind(reporter_id.0)
        .fetch_all(&self.pool)
        .await?;

        let place_rows = sqlx::query(
            "SELECT levels_json, centroid_lat, centroid_lng
             FROM reporter_places WHERE reporter_id = ? ORDER BY position ASC",
        )
        .bind(reporter_id.0)
        .fetch_all(&self.pool)
        .await?;
        let mut places = Vec::with_capacity(place_rows.len());
        for place_row in place_rows {
            let levels: Vec<AdminLevel> =
                serde_json::from_str(&place_row.get::<String, _>(0))
                    .context("corrupt reporter place levels")?;
            let centroid = match (
                place_row.get::<Option<f64>, _>(1),
                place_row.get::<Option<f64>, _>(2),
            ) {
                (Some(lat), Some(lng)) => Some(Centroid { lat, lng }),
                _ => None,
            };
            places.push(Place { levels, centroid });
        }

        let location_draft = row
            .get::<Option<String>, _>(5)
            .map(|raw| serde_json::from_str::<LocationDraft>(&raw))
            .transpose()
            .context("corrupt location draft")?;

        Ok(Some(Reporter {
            id: ReporterId(row.get::<i64, _>(0)),
            name: row.get::<String, _>(1),
            phone_numbers,
            places,
            current_command: row.get::<Option<String>, _>(2),
            next_step: row.get::<i64, _>(3),
            current_place_id: row.get::<Option<String>, _>(4).map(PlaceId),
            location_draft,
        }))
    }

    async fn reporter_id_for_phone(&self, phone_number: &str) -> Result<Option<ReporterId>> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT reporter_id FROM reporter_phone_numbers WHERE phone_number = ?",
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.map(ReporterId))
    }

    async fn load_response(&self, response_id: ResponseId) -> Result<Option<SurveyResponse>> {
        let row = sqlx::query(&format!("{RESPONSE_COLUMNS} WHERE id = ?"))
            .bind(response_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate_response(&row).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate_response(&self, row: &SqliteRow) -> Result<SurveyResponse> {
        let response_id = row.get::<i64, _>(0);
        let answer_rows = sqlx::query(
            "SELECT question_id, raw_text, numeric_value
             FROM question_responses WHERE response_id = ? ORDER BY position ASC",
        )
        .bind(response_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SurveyResponse {
            id: ResponseId(response_id),
            survey_id: SurveyId(row.get::<i64, _>(1)),
            reporter_id: ReporterId(row.get::<i64, _>(2)),
            place_id: PlaceId(row.get::<String, _>(3)),
            interval: row
                .get::<String, _>(4)
                .parse::<Interval>()
                .context("corrupt reporting interval")?,
            phone_number: row.get::<String, _>(5),
            complete: row.get::<bool, _>(6),
            completed_on: row.get::<Option<DateTime<Utc>>, _>(7),
            comment_text: row.get::<Option<String>, _>(8),
            responses: answer_rows
                .into_iter()
                .map(|r| QuestionResponse {
                    question_id: QuestionId(r.get::<i64, _>(0)),
                    raw_text: r.get::<String, _>(1),
                    numeric_value: r.get::<Option<f64>, _>(2),
                })
                .collect(),
        })
    }
}

const RESPONSE_COLUMNS: &str = "SELECT id, survey_id, reporter_id, place_id, reporting_interval,
        phone_number, complete, completed_on, comment_text
     FROM survey_responses";

async fn insert_questions(
    tx: &mut Transaction<'_, Sqlite>,
    survey_id: i64,
    questions: &[NewQuestion],
) -> Result<()> {
    for (position, question) in questions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO survey_questions
                (survey_id, position, prompt_text, summary_text, response_kind, map_question_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(survey_id)
        .bind(position as i64)
        .bind(&question.prompt_text)
        .bind(&question.summary_text)
        .bind(question.response_kind.as_str())
        .bind(question.map_question_id.as_deref())
        .execute(&mut **tx)
        .await
        .context("failed to insert survey question")?;
    }
    Ok(())
}

async fn insert_place(
    tx: &mut Transaction<'_, Sqlite>,
    reporter_id: ReporterId,
    place: &Place,
) -> Result<bool> {
    let levels_json = serde_json::to_string(&place.levels)?;
    let result = sqlx::query(
        "INSERT INTO reporter_places (reporter_id, place_id, position, levels_json, centroid_lat, centroid_lng)
         VALUES (?1, ?2,
                 (SELECT COALESCE(MAX(position), -1) + 1 FROM reporter_places WHERE reporter_id = ?1),
                 ?3, ?4, ?5)
         ON CONFLICT(reporter_id, place_id) DO NOTHING",
    )
    .bind(reporter_id.0)
    .bind(place.place_id().0)
    .bind(levels_json)
    .bind(place.centroid.map(|c| c.lat))
    .bind(place.centroid.map(|c| c.lng))
    .execute(&mut **tx)
    .await
    .context("failed to insert reporter place")?;
    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl InterviewStore for Storage {
    async fn find_or_create_reporter(&self, phone_number: &str) -> Result<Reporter> {
        if let Some(reporter_id) = self.reporter_id_for_phone(phone_number).await? {
            if let Some(reporter) = self.load_reporter(reporter_id).await? {
                return Ok(reporter);
            }
        }

        let mut tx = self.pool.begin().await?;
        let created: i64 = sqlx::query_scalar("INSERT INTO reporters DEFAULT VALUES RETURNING id")
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO reporter_phone_numbers (phone_number, reporter_id) VALUES (?, ?)
             ON CONFLICT(phone_number) DO NOTHING",
        )
        .bind(phone_number)
        .bind(created)
        .execute(&mut *tx)
        .await?;
        let owner: i64 = sqlx::query_scalar(
            "SELECT reporter_id FROM reporter_phone_numbers WHERE phone_number = ?",
        )
        .bind(phone_number)
        .fetch_one(&mut *tx)
        .await?;
        if owner != created {
            // another turn registered the number first
            sqlx::query("DELETE FROM reporters WHERE id = ?")
                .bind(created)
                .execute(&mut *tx)
                .await?;
        } else {
            info!(reporter_id = created, %phone_number, "reporter created");
        }
        tx.commit().await?;

        self.load_reporter(ReporterId(owner))
            .await?
            .context("reporter vanished after insert")
    }

    async fn save_reporter_state(&self, reporter: &Reporter) -> Result<()> {
        let draft = reporter
            .location_draft
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "UPDATE reporters
             SET current_command = ?, next_step = ?, current_place_id = ?, location_draft = ?,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
        )
        .bind(reporter.current_command.as_deref())
        .bind(reporter.next_step)
        .bind(reporter.current_place_id.as_ref().map(|id| id.0.as_str()))
        .bind(draft)
        .bind(reporter.id.0)
        .execute(&self.pool)
        .await
        .context("failed to save reporter state")?;
        Ok(())
    }

    async fn replace_reporter_places(
        &self,
        reporter_id: ReporterId,
        places: &[Place],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM reporter_places WHERE reporter_id = ?")
            .bind(reporter_id.0)
            .execute(&mut *tx)
            .await?;
        for place in places {
            insert_place(&mut tx, reporter_id, place).await?;
        }
        tx.commit().await?;
        debug!(reporter_id = reporter_id.0, places = places.len(), "reporter places replaced");
        Ok(())
    }

    async fn add_reporter_place(&self, reporter_id: ReporterId, place: &Place) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_place(&mut tx, reporter_id, place).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn load_survey(&self, survey_id: SurveyId) -> Result<Option<Survey>> {
        let Some(row) = sqlx::query(
            "SELECT id, name, active, map_id, map_topic_id, map_api_key FROM surveys WHERE id = ?",
        )
        .bind(survey_id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let questions = sqlx::query(
            "SELECT id, prompt_text, summary_text, response_kind, map_question_id
             FROM survey_questions WHERE survey_id = ? ORDER BY position ASC",
        )
        .bind(survey_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| Question {
            id: QuestionId(r.get::<i64, _>(0)),
            prompt_text: r.get::<String, _>(1),
            summary_text: r.get::<String, _>(2),
            response_kind: ResponseKind::parse(&r.get::<String, _>(3)),
            map_question_id: r.get::<Option<String>, _>(4),
        })
        .collect();

        let map = match (
            row.get::<Option<String>, _>(3),
            row.get::<Option<String>, _>(4),
            row.get::<Option<String>, _>(5),
        ) {
            (Some(map_id), Some(topic_id), api_key) if !map_id.is_empty() => Some(MapSettings {
                map_id,
                topic_id,
                api_key: api_key.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Some(Survey {
            id: SurveyId(row.get::<i64, _>(0)),
            name: row.get::<String, _>(1),
            active: row.get::<bool, _>(2),
            questions,
            map,
        }))
    }

    async fn upsert_survey_response(
        &self,
        key: &ResponseKey,
        phone_number: &str,
        answers: &[QuestionResponse],
    ) -> Result<Option<SurveyResponse>> {
        let mut tx = self.pool.begin().await?;
        let response_id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO survey_responses (survey_id, reporter_id, place_id, reporting_interval, phone_number)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(survey_id, reporter_id, place_id, reporting_interval) DO UPDATE SET
                phone_number = excluded.phone_number,
                comment_text = NULL,
                updated_at = CURRENT_TIMESTAMP
             WHERE survey_responses.complete = 0
             RETURNING id",
        )
        .bind(key.survey_id.0)
        .bind(key.reporter_id.0)
        .bind(&key.place_id.0)
        .bind(key.interval.to_string())
        .bind(phone_number)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to upsert survey response")?;
        let Some(response_id) = response_id else {
            debug!(
                survey_id = key.survey_id.0,
                reporter_id = key.reporter_id.0,
                place_id = %key.place_id,
                interval = %key.interval,
                "survey response already complete"
            );
            return Ok(None);
        };

        sqlx::query("DELETE FROM question_responses WHERE response_id = ?")
            .bind(response_id)
            .execute(&mut *tx)
            .await?;
        for (position, answer) in answers.iter().enumerate() {
            sqlx::query(
                "INSERT INTO question_responses (response_id, question_id, position, raw_text, numeric_value)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(response_id)
            .bind(answer.question_id.0)
            .bind(position as i64)
            .bind(&answer.raw_text)
            .bind(answer.numeric_value)
            .execute(&mut *tx)
            .await
            .context("failed to store question response")?;
        }
        tx.commit().await?;

        debug!(
            response_id,
            survey_id = key.survey_id.0,
            reporter_id = key.reporter_id.0,
            place_id = %key.place_id,
            interval = %key.interval,
            "survey response upserted"
        );
        self.load_response(ResponseId(response_id))
            .await?
            .context("survey response vanished after upsert")
            .map(Some)
    }

    async fn find_survey_response(&self, key: &ResponseKey) -> Result<Option<SurveyResponse>> {
        let row = sqlx::query(&format!(
            "{RESPONSE_COLUMNS}
             WHERE survey_id = ? AND reporter_id = ? AND place_id = ? AND reporting_interval = ?"
        ))
        .bind(key.survey_id.0)
        .bind(key.reporter_id.0)
        .bind(&key.place_id.0)
        .bind(key.interval.to_string())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate_response(&row).await?)),
            None => Ok(None),
        }
    }

    async fn clear_survey_answers(&self, response_id: ResponseId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let reset = sqlx::query(
            "UPDATE survey_responses SET comment_text = NULL, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND complete = 0",
        )
        .bind(response_id.0)
        .execute(&mut *tx)
        .await?;
        if reset.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query("DELETE FROM question_responses WHERE response_id = ?")
            .bind(response_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn finalize_survey_response(
        &self,
        response_id: ResponseId,
        comment_text: &str,
        completed_on: DateTime<Utc>,
    ) -> Result<SurveyResponse> {
        let result = sqlx::query(
            "UPDATE survey_responses
             SET comment_text = ?, complete = 1, completed_on = COALESCE(completed_on, ?),
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
        )
        .bind(comment_text)
        .bind(completed_on)
        .bind(response_id.0)
        .execute(&self.pool)
        .await
        .context("failed to finalize survey response")?;
        anyhow::ensure!(
            result.rows_affected() == 1,
            "survey response {} not found",
            response_id.0
        );
        self.load_response(response_id)
            .await?
            .context("survey response vanished after finalize")
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
