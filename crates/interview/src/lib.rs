//! Resumable SMS interviews: command routing, the report and register step
//! machines, reply templates and reporting intervals.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use crisis_map::ResponsePublisher;
use locations::LocationCatalog;
use storage::InterviewStore;

pub mod answers;
pub mod commands;
pub mod interval;
pub mod messages;
pub mod router;

pub use messages::{MessageCatalog, MessageKey};
pub use router::{CommandRouter, Turn};

/// Source of "now" for interval keys and completion stamps.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(at) => *at,
        }
    }
}

/// Everything a workflow needs besides the reporter and its input.
#[derive(Clone)]
pub struct InterviewContext {
    pub store: Arc<dyn InterviewStore>,
    pub catalog: Arc<LocationCatalog>,
    pub messages: Arc<MessageCatalog>,
    pub publisher: Arc<dyn ResponsePublisher>,
    pub clock: Clock,
    pub reporting_offset: FixedOffset,
}

#[cfg(test)]
pub(crate) mod test_support;
