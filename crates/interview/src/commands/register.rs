//! The `register` command: show, replace or clear a reporter's places, or
//! walk the location catalog interactively with `register add`.

use locations::{LocationResolver, Prompt, ResolverStage, Transition};
use shared::domain::{Place, Reporter};
use tracing::{error, info};

use super::{first_token, StepOutcome};
use crate::{InterviewContext, MessageCatalog, MessageKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStep {
    Start = 0,
    ExpectUnit = 1,
    ExpectChoice = 2,
    ExpectConfirmation = 3,
}

impl RegisterStep {
    pub fn from_step(step: i64) -> Self {
        match step {
            1 => RegisterStep::ExpectUnit,
            2 => RegisterStep::ExpectChoice,
            3 => RegisterStep::ExpectConfirmation,
            _ => RegisterStep::Start,
        }
    }

    fn for_stage(stage: ResolverStage) -> Self {
        match stage {
            ResolverStage::Find => RegisterStep::ExpectUnit,
            ResolverStage::Disambiguate => RegisterStep::ExpectChoice,
            ResolverStage::Confirm => RegisterStep::ExpectConfirmation,
        }
    }

    fn stage(self) -> Option<ResolverStage> {
        match self {
            RegisterStep::Start => None,
            RegisterStep::ExpectUnit => Some(ResolverStage::Find),
            RegisterStep::ExpectChoice => Some(ResolverStage::Disambiguate),
            RegisterStep::ExpectConfirmation => Some(ResolverStage::Confirm),
        }
    }

    pub fn step(self) -> i64 {
        self as i64
    }
}

pub async fn handle(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    step: i64,
    input: &str,
) -> StepOutcome {
    match RegisterStep::from_step(step).stage() {
        Some(stage) => resolve(ctx, reporter, stage, input).await,
        None => start(ctx, reporter, input).await,
    }
}

async fn start(ctx: &InterviewContext, reporter: &mut Reporter, input: &str) -> StepOutcome {
    let token = first_token(input);
    if token.eq_ignore_ascii_case("clear") {
        return replace_places(ctx, reporter, Vec::new()).await;
    }
    if token.eq_ignore_ascii_case("add") {
        let resolver = LocationResolver::new(&ctx.catalog);
        return continue_dialog(ctx, reporter, resolver.start());
    }

    let mut places: Vec<Place> = Vec::new();
    for code_path in input.split_whitespace() {
        let Some(place) = ctx.catalog.find_by_code_path(code_path) else {
            continue;
        };
        if !places.iter().any(|known| known.place_id() == place.place_id()) {
            places.push(place);
        }
    }

    if places.is_empty() {
        return StepOutcome::done(registration_summary(
            &ctx.messages,
            MessageKey::RegisteredCurrently,
            &reporter.places,
        ));
    }
    replace_places(ctx, reporter, places).await
}

async fn replace_places(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    places: Vec<Place>,
) -> StepOutcome {
    if let Err(err) = ctx.store.replace_reporter_places(reporter.id, &places).await {
        error!(reporter_id = reporter.id.0, error = %err, "register: failed to replace places");
        return StepOutcome::done(ctx.messages.text(MessageKey::GeneralError));
    }
    info!(
        reporter_id = reporter.id.0,
        places = places.len(),
        "register: places replaced"
    );
    reporter.places = places;
    reporter.current_place_id = None;
    reporter.location_draft = None;
    StepOutcome::done(registration_summary(
        &ctx.messages,
        MessageKey::RegisteredNow,
        &reporter.places,
    ))
}

async fn resolve(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    stage: ResolverStage,
    input: &str,
) -> StepOutcome {
    let draft = reporter.location_draft.clone().unwrap_or_default();
    let resolver = LocationResolver::new(&ctx.catalog);
    match resolver.advance(stage, draft, input) {
        Transition::Resolved(place) => add_place(ctx, reporter, place).await,
        transition => continue_dialog(ctx, reporter, transition),
    }
}

async fn add_place(ctx: &InterviewContext, reporter: &mut Reporter, place: Place) -> StepOutcome {
    let described = place.describe();
    match ctx.store.add_reporter_place(reporter.id, &place).await {
        Ok(inserted) => {
            reporter.location_draft = None;
            if !inserted {
                return StepOutcome::done(ctx.messages.render(
                    MessageKey::LocationAlreadyKnown,
                    &[("place", &described)],
                ));
            }
            info!(
                reporter_id = reporter.id.0,
                place_id = %place.place_id(),
                "register: place added"
            );
            reporter.places.push(place);
            let count = reporter.places.len().to_string();
            StepOutcome::done(ctx.messages.render(
                MessageKey::LocationAdded,
                &[
                    ("place", &described),
                    ("count", &count),
                    ("noun", location_noun(reporter.places.len())),
                ],
            ))
        }
        Err(err) => {
            error!(reporter_id = reporter.id.0, error = %err, "register: failed to add place");
            StepOutcome::next(
                ctx.messages.text(MessageKey::GeneralError),
                RegisterStep::ExpectConfirmation.step(),
            )
        }
    }
}

fn continue_dialog(
    ctx: &InterviewContext,
    reporter: &mut Reporter,
    transition: Transition,
) -> StepOutcome {
    match transition {
        Transition::Continue {
            stage,
            draft,
            prompt,
        } => {
            reporter.location_draft = Some(draft);
            StepOutcome::next(
                render_prompt(&ctx.messages, &prompt),
                RegisterStep::for_stage(stage).step(),
            )
        }
        Transition::Resolved(place) => {
            // start() never resolves; treat it as a fresh confirmation
            StepOutcome::next(
                render_prompt(&ctx.messages, &Prompt::Confirm { place }),
                RegisterStep::ExpectConfirmation.step(),
            )
        }
    }
}

pub fn render_prompt(messages: &MessageCatalog, prompt: &Prompt) -> String {
    match prompt {
        Prompt::AskUnit {
            level_name,
            example: Some(example),
        } => messages.render(
            MessageKey::AskUnitWithExample,
            &[("level", level_name), ("example", example)],
        ),
        Prompt::AskUnit {
            level_name,
            example: None,
        } => messages.render(MessageKey::AskUnit, &[("level", level_name)]),
        Prompt::Choose {
            candidates,
            invalid,
        } => {
            let mut options: Vec<String> = candidates
                .iter()
                .enumerate()
                .map(|(index, name)| format!("{}. {name}", index + 1))
                .collect();
            options.push(format!(
                "{}. {}",
                candidates.len() + 1,
                messages.text(MessageKey::NoneOfThese)
            ));
            options.push(format!(
                "{}. {}",
                candidates.len() + 2,
                messages.text(MessageKey::LowestLevel)
            ));
            let list = messages.render(MessageKey::ChooseUnit, &[("options", &options.join("\n"))]);
            if *invalid {
                format!("{}\n{list}", messages.text(MessageKey::InvalidUnitChoice))
            } else {
                list
            }
        }
        Prompt::Confirm { place } => messages.render(
            MessageKey::ConfirmLocation,
            &[("place", &place.describe())],
        ),
    }
}

/// "You are now registered for 2 locations: Ward: ACHIDA, WURNO, SOKOTO; ..."
pub fn registration_summary(messages: &MessageCatalog, key: MessageKey, places: &[Place]) -> String {
    let listed = if places.is_empty() {
        ".".to_string()
    } else {
        let described = places
            .iter()
            .map(Place::describe)
            .collect::<Vec<_>>()
            .join("; ");
        format!(": {described}")
    };
    messages.render(
        key,
        &[
            ("count", &places.len().to_string()),
            ("noun", location_noun(places.len())),
            ("places", &listed),
        ],
    )
}

fn location_noun(count: usize) -> &'static str {
    if count == 1 {
        "location"
    } else {
        "locations"
    }
}

#[cfg(test)]
#[path = "tests/register_tests.rs"]
mod tests;
