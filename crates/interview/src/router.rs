use std::{collections::HashMap, sync::Arc};

use shared::{domain::Reporter, protocol::InboundMessage};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    commands::{register, report, Command, Effect, StepOutcome},
    InterviewContext, MessageKey,
};

/// Result of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub reply: String,
    pub command: Option<&'static str>,
    pub next_step: i64,
}

/// Entry point for inbound messages. Turns for the same phone number run one
/// at a time; different numbers proceed independently.
pub struct CommandRouter {
    ctx: InterviewContext,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CommandRouter {
    pub fn new(ctx: InterviewContext) -> Self {
        Self {
            ctx,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &InterviewContext {
        &self.ctx
    }

    pub async fn handle(&self, message: &InboundMessage) -> Turn {
        let phone_number = message.from_number.trim();
        let lock = self.phone_lock(phone_number).await;
        let turn = {
            let _guard = lock.lock().await;
            self.run_turn(phone_number, message).await
        };
        self.release_phone_lock(phone_number, lock).await;
        turn
    }

    async fn run_turn(&self, phone_number: &str, message: &InboundMessage) -> Turn {
        let ctx = &self.ctx;
        let mut reporter = match ctx.store.find_or_create_reporter(phone_number).await {
            Ok(reporter) => reporter,
            Err(err) => {
                error!(phone_number, error = %err, "router: reporter lookup failed");
                return Turn {
                    reply: ctx.messages.text(MessageKey::GeneralError),
                    command: None,
                    next_step: 0,
                };
            }
        };

        let Some((command, step, input)) = dispatch(&reporter, &message.body_text) else {
            info!(
                reporter_id = reporter.id.0,
                body = %message.body_text,
                "router: unrecognized command"
            );
            return Turn {
                reply: ctx.messages.text(MessageKey::UnknownCommand),
                command: None,
                next_step: 0,
            };
        };

        info!(
            reporter_id = reporter.id.0,
            command = command.name(),
            step,
            "router: dispatching"
        );
        let StepOutcome {
            reply,
            next_step,
            effects,
        } = match command {
            Command::Report => {
                let survey = match ctx.store.load_survey(message.survey_id).await {
                    Ok(survey) => survey,
                    Err(err) => {
                        error!(
                            survey_id = message.survey_id.0,
                            error = %err,
                            "router: survey lookup failed"
                        );
                        return Turn {
                            reply: ctx.messages.text(MessageKey::GeneralError),
                            command: reporter.current_command.is_some().then(|| command.name()),
                            next_step: reporter.next_step,
                        };
                    }
                };
                report::handle(
                    ctx,
                    &mut reporter,
                    survey.as_ref(),
                    step,
                    input,
                    phone_number,
                )
                .await
            }
            Command::Register => register::handle(ctx, &mut reporter, step, input).await,
        };

        let active = (next_step != 0).then(|| command.name());
        reporter.current_command = active.map(str::to_string);
        reporter.next_step = next_step;
        if active.is_none() {
            reporter.location_draft = None;
        }
        if let Err(err) = ctx.store.save_reporter_state(&reporter).await {
            error!(
                reporter_id = reporter.id.0,
                error = %err,
                "router: failed to save reporter state"
            );
        }

        for effect in effects {
            self.spawn_effect(effect);
        }

        Turn {
            reply,
            command: active,
            next_step,
        }
    }

    fn spawn_effect(&self, effect: Effect) {
        match effect {
            Effect::Publish(submission) => {
                let publisher = Arc::clone(&self.ctx.publisher);
                tokio::spawn(async move {
                    let response_id = submission.response.id.0;
                    if let Err(err) = publisher.publish(submission).await {
                        error!(response_id, error = %err, "router: crisis map push failed");
                    }
                });
            }
        }
    }

    async fn phone_lock(&self, phone_number: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(phone_number.to_string()).or_default())
    }

    async fn release_phone_lock(&self, phone_number: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // map entry plus ours: nobody else is waiting
        if Arc::strong_count(&lock) == 2 {
            locks.remove(phone_number);
        }
    }
}

/// Picks the command, step and step input for a message. An active command
/// receives the whole text; otherwise the first word names the command.
fn dispatch<'a>(reporter: &Reporter, body: &'a str) -> Option<(Command, i64, &'a str)> {
    if let Some(name) = reporter.current_command.as_deref() {
        match Command::parse(name) {
            Some(command) => return Some((command, reporter.next_step, body)),
            None => warn!(
                reporter_id = reporter.id.0,
                command = name,
                "router: stored command is unknown, ignoring it"
            ),
        }
    }

    let trimmed = body.trim_start();
    let (name, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    Command::parse(name).map(|command| (command, 0, rest.trim()))
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
