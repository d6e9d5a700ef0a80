use chrono::{TimeZone, Utc};
use shared::domain::PlaceId;

use super::*;
use crate::test_support::harness;

#[test]
fn unknown_steps_restart_the_report() {
    for step in 0..=4 {
        assert_eq!(ReportStep::from_step(step).step(), step);
    }
    assert_eq!(ReportStep::from_step(-1), ReportStep::GiveInstructions);
    assert_eq!(ReportStep::from_step(9), ReportStep::GiveInstructions);
}

#[tokio::test]
async fn a_missing_current_place_restarts_at_instructions() {
    let harness = harness().await;
    let mut reporter = harness.register(&["SO.22.8", "KB.1.5"]).await;
    reporter.current_place_id = Some(PlaceId("ZZ.1".into()));
    let ctx = harness.router.context();
    let survey = ctx
        .store
        .load_survey(harness.survey_id)
        .await
        .expect("load")
        .expect("survey");

    let outcome = handle(
        ctx,
        &mut reporter,
        Some(&survey),
        ReportStep::ExpectComment.step(),
        "a comment",
        "+2348030000001",
    )
    .await;

    assert_eq!(outcome.next_step, ReportStep::ExpectLocation.step());
    assert!(outcome.reply.starts_with("Which location are you reporting for?"));
    assert!(outcome.effects.is_empty());
    assert_eq!(reporter.current_place_id, None);
}

#[tokio::test]
async fn finished_reports_on_linked_surveys_queue_a_push() {
    let harness = harness().await;
    let mut reporter = harness.register(&["SO.22.8"]).await;
    let ctx = harness.router.context();
    let survey = ctx
        .store
        .load_survey(harness.survey_id)
        .await
        .expect("load")
        .expect("survey");

    let phone = "+2348030000001";
    let answered = handle(ctx, &mut reporter, Some(&survey), 0, "4, 0, 1", phone).await;
    assert_eq!(answered.next_step, ReportStep::ExpectConfirmation.step());
    let confirmed = handle(ctx, &mut reporter, Some(&survey), 3, "YES please", phone).await;
    assert_eq!(confirmed.next_step, ReportStep::ExpectComment.step());
    let finished = handle(ctx, &mut reporter, Some(&survey), 4, "none", phone).await;

    assert_eq!(finished.next_step, 0);
    let [Effect::Publish(submission)] = finished.effects.as_slice() else {
        panic!("expected one publish effect, got {:?}", finished.effects);
    };
    assert_eq!(submission.response.comment_text.as_deref(), Some("none"));
    assert_eq!(
        submission.effective,
        Utc.with_ymd_and_hms(2025, 6, 14, 23, 0, 0).unwrap()
    );
}
