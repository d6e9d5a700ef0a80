//! Conversation commands and the shape of one step's result.

use crisis_map::Submission;

pub mod register;
pub mod report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Report,
    Register,
}

impl Command {
    pub fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("report") {
            Some(Command::Report)
        } else if name.eq_ignore_ascii_case("register") {
            Some(Command::Register)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Report => "report",
            Command::Register => "register",
        }
    }
}

/// Work deferred until after the reply has been produced.
#[derive(Debug, Clone)]
pub enum Effect {
    Publish(Submission),
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub reply: String,
    /// Step to resume at on the next message; 0 ends the command.
    pub next_step: i64,
    pub effects: Vec<Effect>,
}

impl StepOutcome {
    pub fn done(reply: impl Into<String>) -> Self {
        Self::next(reply, 0)
    }

    pub fn next(reply: impl Into<String>, next_step: i64) -> Self {
        Self {
            reply: reply.into(),
            next_step,
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

pub(crate) fn first_token(input: &str) -> &str {
    input.split_whitespace().next().unwrap_or_default()
}
