//! The `report` step machine: pick a place, enter answers, confirm, comment.

use crisis_map::Submission;
use locations::leading_choice;
use shared::domain::{Interval, Place, Reporter, ResponseKey, Survey, SurveyResponse};
use tracing::{error, info, warn};

use super::{first_token, Effect, StepOutcome};
use crate::{
    answers::{pair_answers, parse_answers, render_answers, AnswerError},
    interval::{interval_at, interval_start},
    InterviewContext, MessageKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStep {
    GiveInstructions = 0,
    ExpectLocation = 1,
    ExpectData = 2,
    ExpectConfirmation = 3,
    ExpectComment = 4,
}

impl ReportStep {
    pub fn from_step(step: i64) -> Self {
        match step {
            1 => ReportStep::ExpectLocation,
            2 => ReportStep::ExpectData,
            3 => ReportStep::ExpectConfirmation,
            4 => ReportStep::ExpectComment,
            _ => ReportStep::GiveInstructions,
        }
    }

    pub fn step(self) -> i64 {
        self as i64
    }
}

pub async fn handle(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    survey: Option<&Survey>,
    step: i64,
    input: &str,
    phone_number: &str,
) -> StepOutcome {
    let messages = &ctx.messages;
    let Some(survey) = survey.filter(|survey| survey.active) else {
        reporter.current_place_id = None;
        return StepOutcome::done(messages.text(MessageKey::NoSurvey));
    };

    let step = ReportStep::from_step(step);
    let needs_place = !matches!(
        step,
        ReportStep::GiveInstructions | ReportStep::ExpectLocation
    );
    if needs_place && reporter.current_place().is_none() {
        warn!(
            reporter_id = reporter.id.0,
            ?step,
            "report: current place is gone, restarting"
        );
        return give_instructions(ctx, reporter, survey, "", phone_number).await;
    }

    match step {
        ReportStep::GiveInstructions => {
            give_instructions(ctx, reporter, survey, input, phone_number).await
        }
        ReportStep::ExpectLocation => choose_place(ctx, reporter, survey, input),
        ReportStep::ExpectData => collect_answers(ctx, reporter, survey, input, phone_number).await,
        ReportStep::ExpectConfirmation => confirm(ctx, reporter, survey, input).await,
        ReportStep::ExpectComment => save_comment(ctx, reporter, survey, input).await,
    }
}

async fn give_instructions(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    survey: &Survey,
    input: &str,
    phone_number: &str,
) -> StepOutcome {
    match reporter.places.len() {
        0 => {
            reporter.current_place_id = None;
            StepOutcome::done(ctx.messages.text(MessageKey::RegisterFirst))
        }
        1 => {
            reporter.current_place_id = reporter.places.first().map(Place::place_id);
            collect_answers(ctx, reporter, survey, input, phone_number).await
        }
        _ => {
            reporter.current_place_id = None;
            StepOutcome::next(
                place_list(ctx, reporter),
                ReportStep::ExpectLocation.step(),
            )
        }
    }
}

fn choose_place(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    survey: &Survey,
    input: &str,
) -> StepOutcome {
    let chosen = leading_choice(input)
        .and_then(|choice| choice.checked_sub(1))
        .and_then(|index| reporter.places.get(index));
    let Some(place) = chosen else {
        let reply = format!(
            "{}\n{}",
            ctx.messages.text(MessageKey::InvalidPlaceChoice),
            place_list(ctx, reporter)
        );
        return StepOutcome::next(reply, ReportStep::ExpectLocation.step());
    };

    let place_id = place.place_id();
    let prompt = data_prompt(ctx, survey, place, current_interval(ctx));
    info!(reporter_id = reporter.id.0, place_id = %place_id, "report: place chosen");
    reporter.current_place_id = Some(place_id);
    StepOutcome::next(prompt, ReportStep::ExpectData.step())
}

async fn collect_answers(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    survey: &Survey,
    input: &str,
    phone_number: &str,
) -> StepOutcome {
    let interval = current_interval(ctx);
    let Some(place) = reporter.current_place() else {
        return StepOutcome::done(ctx.messages.text(MessageKey::RegisterFirst));
    };
    let prompt = data_prompt(ctx, survey, place, interval);
    let stay = ReportStep::ExpectData.step();

    let answers = match parse_answers(survey, input) {
        Ok(answers) => answers,
        Err(AnswerError::NotNumeric { question }) => {
            let warning = ctx
                .messages
                .render(MessageKey::NumericRequired, &[("question", &question)]);
            return StepOutcome::next(format!("{warning}\n{prompt}"), stay);
        }
        Err(AnswerError::Empty | AnswerError::TooFew { .. }) => {
            return StepOutcome::next(prompt, stay);
        }
    };

    let key = response_key(survey, reporter, place, interval);
    match ctx
        .store
        .upsert_survey_response(&key, phone_number, &answers)
        .await
    {
        Ok(Some(response)) => {
            info!(
                response_id = response.id.0,
                reporter_id = reporter.id.0,
                interval = %interval,
                "report: answers stored"
            );
            match confirmation(ctx, survey, place, &response) {
                Some(reply) => StepOutcome::next(reply, ReportStep::ExpectConfirmation.step()),
                None => StepOutcome::next(prompt, stay),
            }
        }
        Ok(None) => {
            info!(reporter_id = reporter.id.0, interval = %interval, "report: key already submitted");
            let reply = already_submitted(ctx, place, interval);
            reporter.current_place_id = None;
            StepOutcome::done(reply)
        }
        Err(err) => {
            error!(reporter_id = reporter.id.0, error = %err, "report: failed to store answers");
            StepOutcome::next(ctx.messages.text(MessageKey::GeneralError), stay)
        }
    }
}

async fn confirm(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    survey: &Survey,
    input: &str,
) -> StepOutcome {
    let stay = ReportStep::ExpectConfirmation.step();
    let answer = first_token(input);
    if answer.eq_ignore_ascii_case("yes") {
        return StepOutcome::next(
            ctx.messages.text(MessageKey::AskComment),
            ReportStep::ExpectComment.step(),
        );
    }

    let interval = current_interval(ctx);
    let Some(place) = reporter.current_place() else {
        return StepOutcome::done(ctx.messages.text(MessageKey::RegisterFirst));
    };
    let prompt = data_prompt(ctx, survey, place, interval);
    let stored = match ctx
        .store
        .find_survey_response(&response_key(survey, reporter, place, interval))
        .await
    {
        Ok(stored) => stored,
        Err(err) => {
            error!(reporter_id = reporter.id.0, error = %err, "report: failed to load answers");
            return StepOutcome::next(ctx.messages.text(MessageKey::GeneralError), stay);
        }
    };

    if answer.eq_ignore_ascii_case("no") {
        if let Some(response) = stored {
            match ctx.store.clear_survey_answers(response.id).await {
                Ok(true) => {
                    info!(response_id = response.id.0, "report: answers rejected and cleared")
                }
                Ok(false) => {
                    let reply = already_submitted(ctx, place, interval);
                    reporter.current_place_id = None;
                    return StepOutcome::done(reply);
                }
                Err(err) => {
                    error!(response_id = response.id.0, error = %err, "report: failed to clear answers");
                    return StepOutcome::next(ctx.messages.text(MessageKey::GeneralError), stay);
                }
            }
        }
        return StepOutcome::next(prompt, ReportStep::ExpectData.step());
    }

    match stored.and_then(|response| confirmation(ctx, survey, place, &response)) {
        Some(reply) => StepOutcome::next(reply, stay),
        None => StepOutcome::next(prompt, ReportStep::ExpectData.step()),
    }
}

async fn save_comment(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    survey: &Survey,
    input: &str,
) -> StepOutcome {
    let stay = ReportStep::ExpectComment.step();
    let interval = current_interval(ctx);
    let Some(place) = reporter.current_place().cloned() else {
        return StepOutcome::done(ctx.messages.text(MessageKey::RegisterFirst));
    };

    let stored = match ctx
        .store
        .find_survey_response(&response_key(survey, reporter, &place, interval))
        .await
    {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            reporter.current_place_id = None;
            return StepOutcome::done(ctx.messages.text(MessageKey::NoResponse));
        }
        Err(err) => {
            error!(reporter_id = reporter.id.0, error = %err, "report: failed to load answers");
            return StepOutcome::next(ctx.messages.text(MessageKey::GeneralError), stay);
        }
    };

    let response = match ctx
        .store
        .finalize_survey_response(stored.id, input, ctx.clock.now())
        .await
    {
        Ok(response) => response,
        Err(err) => {
            error!(response_id = stored.id.0, error = %err, "report: failed to finalize");
            return StepOutcome::next(ctx.messages.text(MessageKey::GeneralError), stay);
        }
    };
    info!(
        response_id = response.id.0,
        reporter_id = reporter.id.0,
        place_id = %response.place_id,
        interval = %response.interval,
        "report: response complete"
    );
    reporter.current_place_id = None;

    let outcome = StepOutcome::done(ctx.messages.text(MessageKey::Thanks));
    if survey.map.is_none() {
        return outcome;
    }
    let effective = interval_start(response.interval, ctx.reporting_offset)
        .or(response.completed_on)
        .unwrap_or_else(|| ctx.clock.now());
    outcome.with_effect(Effect::Publish(Submission {
        survey: survey.clone(),
        response,
        place: Some(place),
        effective,
    }))
}

fn current_interval(ctx: &InterviewContext) -> Interval {
    interval_at(ctx.clock.now(), ctx.reporting_offset)
}

fn response_key(
    survey: &Survey,
    reporter: &Reporter,
    place: &Place,
    interval: Interval,
) -> ResponseKey {
    ResponseKey {
        survey_id: survey.id,
        reporter_id: reporter.id,
        place_id: place.place_id(),
        interval,
    }
}

fn place_list(ctx: &InterviewContext, reporter: &Reporter) -> String {
    let places = reporter
        .places
        .iter()
        .enumerate()
        .map(|(index, place)| format!("{}. {}", index + 1, place.describe()))
        .collect::<Vec<_>>()
        .join("\n");
    ctx.messages
        .render(MessageKey::ChoosePlace, &[("places", &places)])
}

fn data_prompt(
    ctx: &InterviewContext,
    survey: &Survey,
    place: &Place,
    interval: Interval,
) -> String {
    let questions = survey
        .questions
        .iter()
        .map(|question| question.summary_text.as_str())
        .collect::<Vec<_>>()
        .join(",\n");
    ctx.messages.render(
        MessageKey::EnterData,
        &[
            ("place", place.name()),
            ("week", &interval.week.to_string()),
            ("questions", &questions),
        ],
    )
}

fn already_submitted(ctx: &InterviewContext, place: &Place, interval: Interval) -> String {
    ctx.messages.render(
        MessageKey::AlreadySubmitted,
        &[("place", place.name()), ("week", &interval.week.to_string())],
    )
}

fn confirmation(
    ctx: &InterviewContext,
    survey: &Survey,
    place: &Place,
    response: &SurveyResponse,
) -> Option<String> {
    let pairs = pair_answers(survey, response)?;
    let answers = render_answers(&pairs, &ctx.messages.text(MessageKey::UnknownValue));
    Some(ctx.messages.render(
        MessageKey::ConfirmReport,
        &[
            ("place", place.name()),
            ("week", &response.interval.week.to_string()),
            ("answers", &answers),
        ],
    ))
}

#[cfg(test)]
#[path = "tests/report_tests.rs"]
mod tests;
