use std::{net::SocketAddr, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::{header, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use crisis_map::{
    CrisisMapClient, CrisisMapConfig, ImportError, MapImporter, NoopPublisher, ResponsePublisher,
};
use interview::{
    interval::reporting_offset, Clock, CommandRouter, InterviewContext, MessageCatalog,
};
use locations::LocationCatalog;
use shared::{
    domain::{MapSettings, Survey, SurveyId},
    error::{ApiError, ErrorCode},
    protocol::{
        InboundMessage, MapImportRequest, NewQuestion, NewSurvey, SurveySummary, WebhookReply,
        WebhookRequest,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

mod config;

use config::{load_settings, normalize_database_url, Settings};

const MAX_BODY_BYTES: usize = 64 * 1024;

struct AppState {
    storage: Storage,
    router: CommandRouter,
    importer: MapImporter,
}

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let ctx = interview_context(&settings, storage.clone())?;
    let importer = MapImporter::new(Url::parse(&settings.crisis_map_maps_url)?);
    let app = build_router(Arc::new(AppState {
        storage,
        router: CommandRouter::new(ctx),
        importer,
    }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn interview_context(settings: &Settings, storage: Storage) -> anyhow::Result<InterviewContext> {
    let catalog = LocationCatalog::load(&settings.locations_path)?;
    let messages = match settings.messages_path.as_deref() {
        Some(path) => MessageCatalog::load(path)?,
        None => MessageCatalog::english(),
    };
    let publisher: Arc<dyn ResponsePublisher> = match settings.crisis_map_url.as_deref() {
        Some(raw) => {
            let reports_url = Url::parse(raw)?;
            info!(%reports_url, "crisis map push enabled");
            Arc::new(CrisisMapClient::new(CrisisMapConfig {
                reports_url,
                source_url: settings.source_url.clone(),
            }))
        }
        None => Arc::new(NoopPublisher),
    };
    let reporting_offset = reporting_offset(settings.reporting_utc_offset_hours)
        .ok_or_else(|| anyhow::anyhow!("invalid reporting UTC offset"))?;

    Ok(InterviewContext {
        store: Arc::new(storage),
        catalog: Arc::new(catalog),
        messages: Arc::new(messages),
        publisher,
        clock: Clock::System,
        reporting_offset,
    })
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/surveys", get(list_surveys).post(create_survey))
        .route("/surveys/import", post(import_survey))
        .route(
            "/surveys/:survey_id",
            post(inbound_message).delete(deactivate_survey),
        )
        .route("/surveys/:survey_id/questions", post(replace_questions))
        .route("/surveys/:survey_id/settings", post(update_settings))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.storage.health_check().await.map_err(|e| {
        error!(error = %e, "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::internal(e)),
        )
    })?;
    Ok("ok")
}

async fn list_surveys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SurveySummary>>, HttpError> {
    let surveys = state.storage.list_active_surveys().await.map_err(storage_failure)?;
    Ok(Json(
        surveys
            .into_iter()
            .map(|survey| SurveySummary {
                survey_id: survey.id,
                name: survey.name,
                active: survey.active,
                question_count: survey.questions.len(),
            })
            .collect(),
    ))
}

async fn create_survey(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSurvey>,
) -> Result<(StatusCode, Json<Survey>), HttpError> {
    if req.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "survey name cannot be empty",
            )),
        ));
    }
    if req.questions.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "survey needs at least one question",
            )),
        ));
    }

    let survey = state.storage.create_survey(&req).await.map_err(storage_failure)?;
    Ok((StatusCode::CREATED, Json(survey)))
}

fn survey_not_found(survey_id: i64) -> HttpError {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::not_found(format!("survey {survey_id} not found"))),
    )
}

fn storage_failure(e: anyhow::Error) -> HttpError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::internal(e)),
    )
}

async fn replace_questions(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<i64>,
    Json(questions): Json<Vec<NewQuestion>>,
) -> Result<Json<Survey>, HttpError> {
    if questions.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "survey needs at least one question",
            )),
        ));
    }
    state
        .storage
        .replace_survey_questions(SurveyId(survey_id), &questions)
        .await
        .map_err(storage_failure)?
        .map(Json)
        .ok_or_else(|| survey_not_found(survey_id))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<i64>,
    Json(settings): Json<MapSettings>,
) -> Result<Json<Survey>, HttpError> {
    // an empty map id unlinks the survey
    let map = (!settings.map_id.trim().is_empty()).then_some(&settings);
    if map.is_some_and(|map| map.topic_id.trim().is_empty()) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "a linked survey needs a topic id",
            )),
        ));
    }
    state
        .storage
        .update_survey_map(SurveyId(survey_id), map)
        .await
        .map_err(storage_failure)?
        .map(Json)
        .ok_or_else(|| survey_not_found(survey_id))
}

async fn import_survey(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MapImportRequest>,
) -> Result<(StatusCode, Json<Survey>), HttpError> {
    let new_survey = state
        .importer
        .fetch(&req.map_id, &req.api_key)
        .await
        .map_err(|e| {
            let status = match e {
                ImportError::MissingMapId | ImportError::NoTopics(_) => StatusCode::BAD_REQUEST,
                ImportError::BadMapsUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ImportError::Http(_) => StatusCode::BAD_GATEWAY,
            };
            error!(map_id = %req.map_id, error = %e, "survey import failed");
            let code = if status == StatusCode::BAD_REQUEST {
                ErrorCode::Validation
            } else {
                ErrorCode::Internal
            };
            (status, Json(ApiError::new(code, e.to_string())))
        })?;
    let survey = state
        .storage
        .create_survey(&new_survey)
        .await
        .map_err(storage_failure)?;
    Ok((StatusCode::CREATED, Json(survey)))
}

async fn deactivate_survey(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    let deactivated = state
        .storage
        .deactivate_survey(SurveyId(survey_id))
        .await
        .map_err(storage_failure)?;
    if !deactivated {
        return Err(survey_not_found(survey_id));
    }
    info!(survey_id, "survey deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// Gateway webhook body, form encoded or JSON depending on the content type.
struct Webhook(WebhookRequest);

#[async_trait]
impl<S> FromRequest<S> for Webhook
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        if is_json {
            let Json(body) = Json::<WebhookRequest>::from_request(req, state)
                .await
                .map_err(|rejection| {
                    (
                        rejection.status(),
                        Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
                    )
                })?;
            Ok(Webhook(body))
        } else {
            let Form(body) = Form::<WebhookRequest>::from_request(req, state)
                .await
                .map_err(|rejection| {
                    (
                        rejection.status(),
                        Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
                    )
                })?;
            Ok(Webhook(body))
        }
    }
}

async fn inbound_message(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<i64>,
    Webhook(req): Webhook,
) -> Result<Json<WebhookReply>, HttpError> {
    if req.from_number.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "sender phone number is required",
            )),
        ));
    }

    let turn = state
        .router
        .handle(&InboundMessage {
            from_number: req.from_number,
            body_text: req.content,
            survey_id: SurveyId(survey_id),
        })
        .await;
    Ok(Json(WebhookReply::text(turn.reply)))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
