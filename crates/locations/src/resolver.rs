use shared::domain::{LocationDraft, Place};
use tracing::debug;

use crate::{
    matching::{leading_choice, rank_children, MatchOutcome},
    LocationCatalog, LocationNode,
};

/// What the resolver is waiting for from the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStage {
    /// Free text naming the next unit down.
    Find,
    /// A number picking from the last candidate list.
    Disambiguate,
    /// yes/no on the assembled path.
    Confirm,
}

/// Presentation-free description of the next message to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    AskUnit {
        level_name: String,
        example: Option<String>,
    },
    Choose {
        candidates: Vec<String>,
        /// Set when the previous reply was not a valid choice.
        invalid: bool,
    },
    Confirm {
        place: Place,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Continue {
        stage: ResolverStage,
        draft: LocationDraft,
        prompt: Prompt,
    },
    Resolved(Place),
}

/// Drives the find / disambiguate / confirm dialog over a catalog. Holds no
/// state of its own; the caller persists `LocationDraft` between turns.
pub struct LocationResolver<'a> {
    catalog: &'a LocationCatalog,
}

impl<'a> LocationResolver<'a> {
    pub fn new(catalog: &'a LocationCatalog) -> Self {
        Self { catalog }
    }

    pub fn start(&self) -> Transition {
        self.find_from(LocationDraft::default())
    }

    pub fn advance(&self, stage: ResolverStage, draft: LocationDraft, input: &str) -> Transition {
        match stage {
            ResolverStage::Find => self.parse_unit(draft, input),
            ResolverStage::Disambiguate => self.choose(draft, input),
            ResolverStage::Confirm => {
                if first_token(input).eq_ignore_ascii_case("yes") {
                    match self.catalog.place_for_path(&draft.path) {
                        Some(place) => Transition::Resolved(place),
                        None => self.start(),
                    }
                } else {
                    self.start()
                }
            }
        }
    }

    fn parse_unit(&self, draft: LocationDraft, input: &str) -> Transition {
        let Some(node) = self.catalog.walk(&draft.path) else {
            debug!(path = ?draft.path, "draft path left the catalog, restarting");
            return self.start();
        };
        if node.is_leaf() {
            return self.confirm(draft);
        }
        if input.trim().is_empty() {
            return self.find_from(draft);
        }

        match rank_children(node, input) {
            MatchOutcome::Exact(child) => {
                let name = child.name.clone();
                self.accept(draft, name)
            }
            MatchOutcome::Ranked(ranked) => {
                let mut draft = draft;
                draft.candidates = ranked.into_iter().map(|candidate| candidate.name).collect();
                Transition::Continue {
                    stage: ResolverStage::Disambiguate,
                    prompt: Prompt::Choose {
                        candidates: draft.candidates.clone(),
                        invalid: false,
                    },
                    draft,
                }
            }
        }
    }

    fn choose(&self, draft: LocationDraft, input: &str) -> Transition {
        let count = draft.candidates.len();
        match leading_choice(input) {
            Some(choice) if (1..=count).contains(&choice) => {
                let name = draft.candidates[choice - 1].clone();
                self.accept(draft, name)
            }
            Some(choice) if choice == count + 1 => self.start(),
            Some(choice) if choice == count + 2 => self.confirm(draft),
            _ => Transition::Continue {
                stage: ResolverStage::Disambiguate,
                prompt: Prompt::Choose {
                    candidates: draft.candidates.clone(),
                    invalid: true,
                },
                draft,
            },
        }
    }

    fn accept(&self, mut draft: LocationDraft, name: String) -> Transition {
        draft.path.push(name);
        draft.candidates.clear();
        match self.catalog.walk(&draft.path) {
            Some(node) if node.is_leaf() => self.confirm(draft),
            Some(_) => self.find_from(draft),
            None => self.start(),
        }
    }

    fn confirm(&self, mut draft: LocationDraft) -> Transition {
        let Some(place) = self.catalog.place_for_path(&draft.path) else {
            return self.start();
        };
        draft.candidates.clear();
        Transition::Continue {
            stage: ResolverStage::Confirm,
            draft,
            prompt: Prompt::Confirm { place },
        }
    }

    fn find_from(&self, mut draft: LocationDraft) -> Transition {
        let Some(node) = self.catalog.walk(&draft.path) else {
            return self.start();
        };
        draft.candidates.clear();
        Transition::Continue {
            stage: ResolverStage::Find,
            prompt: ask_unit(node),
            draft,
        }
    }
}

fn ask_unit(node: &LocationNode) -> Prompt {
    Prompt::AskUnit {
        level_name: node.child_level_name.clone(),
        example: node.children.first().map(|child| child.name.clone()),
    }
}

fn first_token(input: &str) -> &str {
    input.split_whitespace().next().unwrap_or_default()
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
