//! User-facing reply templates.
//!
//! Every string the engine sends comes from a [`MessageCatalog`]. Templates use
//! `{name}` placeholders filled by [`MessageCatalog::render`]; a deployment can
//! replace any subset of them from a TOML file keyed by the snake_case
//! [`MessageKey`] names.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    UnknownCommand,
    NoSurvey,
    RegisterFirst,
    ChoosePlace,
    InvalidPlaceChoice,
    EnterData,
    NumericRequired,
    ConfirmReport,
    UnknownValue,
    AskComment,
    Thanks,
    NoResponse,
    AlreadySubmitted,
    GeneralError,
    RegisteredNow,
    RegisteredCurrently,
    AskUnit,
    AskUnitWithExample,
    ChooseUnit,
    InvalidUnitChoice,
    NoneOfThese,
    LowestLevel,
    ConfirmLocation,
    LocationAdded,
    LocationAlreadyKnown,
}

const ENGLISH: &[(MessageKey, &str)] = &[
    (
        MessageKey::UnknownCommand,
        "Sorry, that command was not recognized. Text \"report\" to send data or \"register\" to sign up.",
    ),
    (MessageKey::NoSurvey, "No survey found for this phone number."),
    (
        MessageKey::RegisterFirst,
        "This phone number has not yet been registered - text the \"register\" command to sign up.",
    ),
    (
        MessageKey::ChoosePlace,
        "Which location are you reporting for? Reply with its number:\n{places}",
    ),
    (
        MessageKey::InvalidPlaceChoice,
        "Please reply with a number from the list.",
    ),
    (
        MessageKey::EnterData,
        "Please enter the following data for {place} in epi week {week}:\n{questions}",
    ),
    (
        MessageKey::NumericRequired,
        "Error: numeric input required for {question}.",
    ),
    (
        MessageKey::ConfirmReport,
        "Submit this report for {place} in epi week {week}?\n{answers}\nReply \"yes\" to submit or \"no\" to start over.",
    ),
    (MessageKey::UnknownValue, "Unknown"),
    (
        MessageKey::AskComment,
        "Please send any additional comments, or reply \"none\".",
    ),
    (MessageKey::Thanks, "Your response has been submitted - thank you!"),
    (
        MessageKey::NoResponse,
        "We could not locate your report - use the \"report\" command first to enter data.",
    ),
    (
        MessageKey::AlreadySubmitted,
        "Your report for {place} in epi week {week} has already been submitted.",
    ),
    (
        MessageKey::GeneralError,
        "Sorry, there was a problem with the system. Please try again.",
    ),
    (
        MessageKey::RegisteredNow,
        "You are now registered for {count} {noun}{places}",
    ),
    (
        MessageKey::RegisteredCurrently,
        "You are currently registered for {count} {noun}{places}",
    ),
    (MessageKey::AskUnit, "Which {level} are you in?"),
    (
        MessageKey::AskUnitWithExample,
        "Which {level} are you in? (for example: {example})",
    ),
    (
        MessageKey::ChooseUnit,
        "Did you mean one of these? Reply with its number:\n{options}",
    ),
    (
        MessageKey::InvalidUnitChoice,
        "Please reply with one of the numbers below.",
    ),
    (MessageKey::NoneOfThese, "None of these"),
    (MessageKey::LowestLevel, "This is my lowest level"),
    (
        MessageKey::ConfirmLocation,
        "Is this your location?\n{place}\nReply \"yes\" to save it or \"no\" to start over.",
    ),
    (
        MessageKey::LocationAdded,
        "Location saved: {place}. You are registered for {count} {noun}.",
    ),
    (
        MessageKey::LocationAlreadyKnown,
        "You were already registered for {place}.",
    ),
];

#[derive(Debug, Clone)]
pub struct MessageCatalog {
    templates: HashMap<MessageKey, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::english()
    }
}

impl MessageCatalog {
    pub fn english() -> Self {
        Self {
            templates: ENGLISH
                .iter()
                .map(|(key, template)| (*key, (*template).to_string()))
                .collect(),
        }
    }

    /// English defaults overlaid with the templates in `raw`.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let overrides: HashMap<MessageKey, String> =
            toml::from_str(raw).context("invalid message catalog")?;
        let mut catalog = Self::english();
        catalog.templates.extend(overrides);
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read message catalog {}", path.display()))?;
        let catalog = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), "message catalog loaded");
        Ok(catalog)
    }

    pub fn template(&self, key: MessageKey) -> &str {
        self.templates
            .get(&key)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Fills `{name}` placeholders. Unknown placeholders are left as written.
    pub fn render(&self, key: MessageKey, args: &[(&str, &str)]) -> String {
        let mut text = self.template(key).to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }

    pub fn text(&self, key: MessageKey) -> String {
        self.template(key).to_string()
    }
}

#[cfg(test)]
#[path = "tests/messages_tests.rs"]
mod tests;
