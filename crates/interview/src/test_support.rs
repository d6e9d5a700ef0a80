use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use crisis_map::{PublishError, ResponsePublisher, Submission};
use locations::LocationCatalog;
use shared::{
    domain::{MapSettings, Reporter, ResponseKind, SurveyId},
    protocol::{InboundMessage, NewQuestion, NewSurvey},
};
use storage::{InterviewStore, Storage};

use crate::{interval::reporting_offset, Clock, CommandRouter, InterviewContext, MessageCatalog};

pub(crate) const CATALOG: &str = r#"{
  "childAdminLevel": "state",
  "children": {
    "Sokoto": {
      "code": "SO",
      "childAdminLevel": "district",
      "children": {
        "WURNO": {
          "code": "22",
          "childAdminLevel": "ward",
          "children": {
            "ACHIDA": { "code": "8", "centroidLat": 13.167, "centroidLng": 5.3959 },
            "DINAWA": { "code": "9" }
          }
        }
      }
    },
    "Kebbi": {
      "code": "KB",
      "childAdminLevel": "district",
      "children": {
        "ALIERO": {
          "code": "1",
          "childAdminLevel": "ward",
          "children": {
            "JIGA": { "code": "1" },
            "DANWARAI": { "code": "5", "centroidLat": 12.3, "centroidLng": 4.45 }
          }
        }
      }
    }
  }
}"#;

pub(crate) const PHONE: &str = "+2348030000001";

#[derive(Default)]
pub(crate) struct RecordingPublisher {
    pub(crate) submissions: Mutex<Vec<Submission>>,
}

#[async_trait]
impl ResponsePublisher for RecordingPublisher {
    async fn publish(&self, submission: Submission) -> Result<(), PublishError> {
        self.submissions
            .lock()
            .expect("submissions lock")
            .push(submission);
        Ok(())
    }
}

pub(crate) struct Harness {
    pub(crate) router: CommandRouter,
    pub(crate) storage: Storage,
    pub(crate) publisher: Arc<RecordingPublisher>,
    pub(crate) survey_id: SurveyId,
}

pub(crate) fn question(summary: &str) -> NewQuestion {
    NewQuestion {
        prompt_text: format!("Number of {summary}"),
        summary_text: summary.to_string(),
        response_kind: ResponseKind::Number,
        map_question_id: None,
    }
}

pub(crate) async fn harness() -> Harness {
    let storage = Storage::new("sqlite::memory:").await.expect("storage");
    let survey = storage
        .create_survey(&NewSurvey {
            name: "Weekly surveillance".into(),
            questions: vec![
                question("Measles cases"),
                question("Measles deaths"),
                question("Cholera cases"),
            ],
            map: Some(MapSettings {
                map_id: "1234".into(),
                topic_id: "cases".into(),
                api_key: "secret".into(),
            }),
        })
        .await
        .expect("survey");
    let publisher = Arc::new(RecordingPublisher::default());
    let ctx = InterviewContext {
        store: Arc::new(storage.clone()),
        catalog: Arc::new(LocationCatalog::from_json_str(CATALOG).expect("catalog")),
        messages: Arc::new(MessageCatalog::english()),
        publisher: publisher.clone(),
        // Friday of epi week 25, 2025
        clock: Clock::Fixed(Utc.with_ymd_and_hms(2025, 6, 20, 12, 0, 0).unwrap()),
        reporting_offset: reporting_offset(1).expect("offset"),
    };
    Harness {
        router: CommandRouter::new(ctx),
        storage,
        publisher,
        survey_id: survey.id,
    }
}

impl Harness {
    pub(crate) async fn send(&self, body: &str) -> String {
        self.send_from(PHONE, body).await
    }

    pub(crate) async fn send_from(&self, phone: &str, body: &str) -> String {
        self.router
            .handle(&InboundMessage {
                from_number: phone.to_string(),
                body_text: body.to_string(),
                survey_id: self.survey_id,
            })
            .await
            .reply
    }

    /// Registers `PHONE` for the given code paths directly in storage.
    pub(crate) async fn register(&self, code_paths: &[&str]) -> Reporter {
        let reporter = self
            .storage
            .find_or_create_reporter(PHONE)
            .await
            .expect("reporter");
        let catalog = &self.router.context().catalog;
        let places: Vec<_> = code_paths
            .iter()
            .map(|code_path| catalog.find_by_code_path(code_path).expect("known code path"))
            .collect();
        self.storage
            .replace_reporter_places(reporter.id, &places)
            .await
            .expect("places");
        self.reporter().await
    }

    pub(crate) async fn reporter(&self) -> Reporter {
        self.storage
            .find_or_create_reporter(PHONE)
            .await
            .expect("reporter")
    }
}
