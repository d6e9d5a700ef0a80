use super::*;
use axum::{body, body::Body, http::Request};
use chrono::{TimeZone, Utc};
use shared::domain::{ResponseKind, SurveyId};
use serde_json::json;
use tower::ServiceExt;

const CATALOG: &str = r#"{
  "childAdminLevel": "state",
  "children": {
    "Sokoto": { "code": "SO", "childAdminLevel": "district", "children": {
      "WURNO": { "code": "22", "childAdminLevel": "ward", "children": {
        "ACHIDA": { "code": "8", "centroidLat": 13.167, "centroidLng": 5.3959 }
      } }
    } }
  }
}"#;

async fn test_app() -> (Router, Storage, SurveyId) {
    // nothing listens on the discard port
    test_app_with_maps("http://127.0.0.1:9/.api/maps/").await
}

async fn test_app_with_maps(maps_url: &str) -> (Router, Storage, SurveyId) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let survey = storage
        .create_survey(&NewSurvey {
            name: "Weekly surveillance".into(),
            questions: vec![NewQuestion {
                prompt_text: "Number of measles cases".into(),
                summary_text: "Measles cases".into(),
                response_kind: ResponseKind::Number,
                map_question_id: None,
            }],
            map: None,
        })
        .await
        .expect("survey");

    let ctx = InterviewContext {
        store: Arc::new(storage.clone()),
        catalog: Arc::new(LocationCatalog::from_json_str(CATALOG).expect("catalog")),
        messages: Arc::new(MessageCatalog::english()),
        publisher: Arc::new(NoopPublisher),
        clock: Clock::Fixed(Utc.with_ymd_and_hms(2025, 6, 20, 12, 0, 0).unwrap()),
        reporting_offset: reporting_offset(1).expect("offset"),
    };
    let app = build_router(Arc::new(AppState {
        storage: storage.clone(),
        router: CommandRouter::new(ctx),
        importer: MapImporter::new(Url::parse(maps_url).expect("maps url")),
    }));
    (app, storage, survey.id)
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn send_form(app: &Router, survey_id: SurveyId, from: &str, text: &str) -> String {
    let form = format!(
        "From={}&Body={}",
        from.replace('+', "%2B"),
        text.replace(' ', "+").replace(',', "%2C")
    );
    let request = Request::post(format!("/surveys/{}", survey_id.0))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let reply: WebhookReply = json_body(response).await;
    reply.messages[0].content.clone()
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage, _survey_id) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn surveys_can_be_created_and_listed() {
    let (app, _storage, _survey_id) = test_app().await;

    let create = Request::post("/surveys")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "name": "Cholera watch",
                "questions": [
                    { "text": "Number of cholera cases", "summaryText": "Cholera cases", "responseType": "number", "cmId": "q1" }
                ],
                "map": { "map_id": "42", "topic_id": "cholera", "api_key": "k" }
            })
            .to_string(),
        ))
        .expect("request");
    let response = app.clone().oneshot(create).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Survey = json_body(response).await;
    assert_eq!(created.questions[0].map_question_id.as_deref(), Some("q1"));
    assert_eq!(created.questions[0].response_kind, ResponseKind::Number);

    let list = Request::get("/surveys").body(Body::empty()).expect("request");
    let response = app.oneshot(list).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let surveys: Vec<SurveySummary> = json_body(response).await;
    let names: Vec<_> = surveys.iter().map(|survey| survey.name.as_str()).collect();
    assert_eq!(names, vec!["Cholera watch", "Weekly surveillance"]);
    assert!(surveys.iter().all(|survey| survey.question_count == 1));
}

#[tokio::test]
async fn surveys_without_questions_are_rejected() {
    let (app, _storage, _survey_id) = test_app().await;
    let request = Request::post("/surveys")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "name": "Empty" }).to_string(),
        ))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
}

#[tokio::test]
async fn form_webhook_runs_a_whole_report() {
    let (app, storage, survey_id) = test_app().await;
    let phone = "+2348030000001";

    assert_eq!(
        send_form(&app, survey_id, phone, "register SO.22.8").await,
        "You are now registered for 1 location: Ward: ACHIDA, WURNO, Sokoto"
    );
    assert_eq!(
        send_form(&app, survey_id, phone, "report").await,
        "Please enter the following data for ACHIDA in epi week 25:\nMeasles cases"
    );
    assert!(send_form(&app, survey_id, phone, "7")
        .await
        .starts_with("Submit this report for ACHIDA in epi week 25?\nMeasles cases: 7"));
    send_form(&app, survey_id, phone, "yes").await;
    assert_eq!(
        send_form(&app, survey_id, phone, "none").await,
        "Your response has been submitted - thank you!"
    );

    let responses = storage
        .list_responses_for_survey(survey_id)
        .await
        .expect("responses");
    assert_eq!(responses.len(), 1);
    assert!(responses[0].complete);
    assert_eq!(responses[0].phone_number, phone);
}

#[tokio::test]
async fn json_webhook_accepts_the_long_field_names() {
    let (app, _storage, survey_id) = test_app().await;
    let request = Request::post(format!("/surveys/{}", survey_id.0))
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "from_number": "+2348030000002", "content": "register" })
                .to_string(),
        ))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let reply: WebhookReply = json_body(response).await;
    assert_eq!(
        reply,
        WebhookReply::text("You are currently registered for 0 locations.")
    );
}

#[tokio::test]
async fn unknown_surveys_still_get_a_reply() {
    let (app, _storage, _survey_id) = test_app().await;
    assert_eq!(
        send_form(&app, SurveyId(999), "+2348030000003", "report").await,
        "No survey found for this phone number."
    );
}

#[tokio::test]
async fn webhook_without_sender_is_rejected() {
    let (app, _storage, survey_id) = test_app().await;
    let request = Request::post(format!("/surveys/{}", survey_id.0))
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "content": "report" }).to_string(),
        ))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let request = Request::post(format!("/surveys/{}", survey_id.0))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("From=+++&Body=report"))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let (app, _storage, survey_id) = test_app().await;
    let body = format!("From=%2B1&Body={}", "a".repeat(MAX_BODY_BYTES + 1));
    let request = Request::post(format!("/surveys/{}", survey_id.0))
        .header("content-type", "application/x-www-form-urlencoded")
        .header("content-length", body.len())
        .body(Body::from(body))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn deactivated_surveys_stop_interviewing() {
    let (app, _storage, survey_id) = test_app().await;

    let request = Request::delete(format!("/surveys/{}", survey_id.0))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        send_form(&app, survey_id, "+2348030000004", "report").await,
        "No survey found for this phone number."
    );

    let request = Request::delete("/surveys/999")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::NotFound);
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn questions_can_be_replaced() {
    let (app, storage, survey_id) = test_app().await;

    let request = json_request(
        "POST",
        &format!("/surveys/{}/questions", survey_id.0),
        json!([
            { "text": "Number of cholera cases", "summaryText": "Cholera cases", "responseType": "number" },
            { "text": "Anything else?", "summaryText": "Notes", "responseType": "text" }
        ]),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let survey: Survey = json_body(response).await;
    assert_eq!(survey.questions.len(), 2);
    assert_eq!(survey.questions[0].summary_text, "Cholera cases");

    let stored = storage
        .list_active_surveys()
        .await
        .expect("list")
        .remove(0);
    assert_eq!(stored.questions, survey.questions);

    let request = json_request(
        "POST",
        &format!("/surveys/{}/questions", survey_id.0),
        json!([]),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = json_request(
        "POST",
        "/surveys/999/questions",
        json!([{ "text": "x", "summaryText": "x", "responseType": "number" }]),
    );
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_link_a_survey_to_a_map() {
    let (app, _storage, survey_id) = test_app().await;

    let request = json_request(
        "POST",
        &format!("/surveys/{}/settings", survey_id.0),
        json!({ "mapId": "map1", "topicId": "topic1", "apiKey": "key1" }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let survey: Survey = json_body(response).await;
    assert_eq!(
        survey.map,
        Some(MapSettings {
            map_id: "map1".into(),
            topic_id: "topic1".into(),
            api_key: "key1".into(),
        })
    );

    let request = json_request(
        "POST",
        &format!("/surveys/{}/settings", survey_id.0),
        json!({ "mapId": "map1", "topicId": " " }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = json_request(
        "POST",
        &format!("/surveys/{}/settings", survey_id.0),
        json!({ "mapId": "", "topicId": "" }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let survey: Survey = json_body(response).await;
    assert_eq!(survey.map, None);

    let request = json_request(
        "POST",
        "/surveys/999/settings",
        json!({ "mapId": "map1", "topicId": "topic1" }),
    );
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn surveys_can_be_imported_from_a_map() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let maps = Router::new().route(
        "/.api/maps/:map_id",
        get(|Path(map_id): Path<String>| async move {
            Json(json!({
                "id": map_id,
                "title": "Cholera watch",
                "topics": [{
                    "id": "cases",
                    "questions": [
                        { "id": "q1", "text": "New cholera cases?", "title": "Cholera cases", "type": "NUMBER" }
                    ]
                }]
            }))
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, maps).await;
    });
    let (app, storage, _survey_id) =
        test_app_with_maps(&format!("http://{addr}/.api/maps/")).await;

    let request = json_request(
        "POST",
        "/surveys/import",
        json!({ "mapId": "map42", "apiKey": "secret" }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let survey: Survey = json_body(response).await;
    assert_eq!(survey.name, "Cholera watch");
    assert_eq!(survey.questions[0].map_question_id.as_deref(), Some("q1"));
    let map = survey.map.expect("linked");
    assert_eq!((map.map_id.as_str(), map.topic_id.as_str()), ("map42", "cases"));
    assert_eq!(storage.list_active_surveys().await.expect("list").len(), 2);

    let request = json_request("POST", "/surveys/import", json!({ "mapId": "" }));
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unreachable_map_api_is_a_bad_gateway() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let (app, storage, _survey_id) = test_app().await;
    let request = json_request("POST", "/surveys/import", json!({ "mapId": "map42" }));
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(storage.list_active_surveys().await.expect("list").len(), 1);
}
