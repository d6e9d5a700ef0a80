//! Administrative location catalog and the interactive resolver that walks it.

pub mod catalog;
pub mod matching;
pub mod resolver;

pub use catalog::{CatalogError, LocationCatalog, LocationNode};
pub use matching::{leading_choice, rank_children, Candidate, MatchOutcome, MAX_CANDIDATES};
pub use resolver::{LocationResolver, Prompt, ResolverStage, Transition};

#[cfg(test)]
pub(crate) mod test_support;
