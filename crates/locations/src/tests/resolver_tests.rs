use super::*;
use crate::test_support::sample_catalog;

fn expect_continue(transition: Transition) -> (ResolverStage, LocationDraft, Prompt) {
    match transition {
        Transition::Continue {
            stage,
            draft,
            prompt,
        } => (stage, draft, prompt),
        Transition::Resolved(place) => panic!("unexpected resolution: {place:?}"),
    }
}

#[test]
fn start_asks_for_top_level_with_example() {
    let catalog = sample_catalog();
    let resolver = LocationResolver::new(&catalog);
    let (stage, draft, prompt) = expect_continue(resolver.start());
    assert_eq!(stage, ResolverStage::Find);
    assert!(draft.path.is_empty());
    assert_eq!(
        prompt,
        Prompt::AskUnit {
            level_name: "state".into(),
            example: Some("Sokoto".into()),
        }
    );
}

#[test]
fn exact_matches_descend_without_disambiguation() {
    let catalog = sample_catalog();
    let resolver = LocationResolver::new(&catalog);
    let (stage, draft, prompt) =
        expect_continue(resolver.advance(ResolverStage::Find, LocationDraft::default(), "KEBBI"));
    assert_eq!(stage, ResolverStage::Find);
    assert_eq!(draft.path, vec!["Kebbi".to_string()]);
    assert!(matches!(prompt, Prompt::AskUnit { ref level_name, .. } if level_name == "district"));

    let (stage, draft, _) = expect_continue(resolver.advance(stage, draft, "aliero"));
    let (stage, draft, prompt) = expect_continue(resolver.advance(stage, draft, "danwarai"));
    assert_eq!(stage, ResolverStage::Confirm);
    let Prompt::Confirm { place } = prompt else {
        panic!("expected confirmation prompt");
    };
    assert_eq!(place.place_id().0, "KB.1.5");

    match resolver.advance(stage, draft, "Yes please") {
        Transition::Resolved(place) => assert_eq!(place.name(), "DANWARAI"),
        other => panic!("expected resolution, got {other:?}"),
    }
}

#[test]
fn near_miss_offers_ranked_candidates() {
    let catalog = sample_catalog();
    let resolver = LocationResolver::new(&catalog);
    let (stage, draft, prompt) =
        expect_continue(resolver.advance(ResolverStage::Find, LocationDraft::default(), "sokotoo"));
    assert_eq!(stage, ResolverStage::Disambiguate);
    let Prompt::Choose { candidates, invalid } = prompt else {
        panic!("expected candidate list");
    };
    assert!(!invalid);
    assert_eq!(candidates[0], "Sokoto");
    assert_eq!(draft.candidates, candidates);

    let (stage, draft, _) = expect_continue(resolver.advance(stage, draft, "1)"));
    assert_eq!(stage, ResolverStage::Find);
    assert_eq!(draft.path, vec!["Sokoto".to_string()]);
}

#[test]
fn invalid_choice_reshows_same_list() {
    let catalog = sample_catalog();
    let resolver = LocationResolver::new(&catalog);
    let (stage, draft, _) =
        expect_continue(resolver.advance(ResolverStage::Find, LocationDraft::default(), "zzz"));
    let shown = draft.candidates.clone();
    let too_high = (shown.len() + 3).to_string();

    for reply in ["banana", "0", too_high.as_str()] {
        let (next_stage, next_draft, prompt) =
            expect_continue(resolver.advance(stage, draft.clone(), reply));
        assert_eq!(next_stage, ResolverStage::Disambiguate);
        assert_eq!(next_draft, draft);
        assert_eq!(
            prompt,
            Prompt::Choose {
                candidates: shown.clone(),
                invalid: true,
            }
        );
    }
}

#[test]
fn none_of_these_restarts_from_root_at_any_depth() {
    let catalog = sample_catalog();
    let resolver = LocationResolver::new(&catalog);
    let draft = LocationDraft {
        path: vec!["Sokoto".into()],
        candidates: Vec::new(),
    };
    let (stage, draft, _) = expect_continue(resolver.advance(ResolverStage::Find, draft, "wurnoo"));
    assert_eq!(stage, ResolverStage::Disambiguate);
    let none_of_these = (draft.candidates.len() + 1).to_string();

    let (stage, draft, prompt) = expect_continue(resolver.advance(stage, draft, &none_of_these));
    assert_eq!(stage, ResolverStage::Find);
    assert!(draft.path.is_empty());
    assert!(matches!(prompt, Prompt::AskUnit { ref level_name, .. } if level_name == "state"));
}

#[test]
fn lowest_level_choice_confirms_partial_path() {
    let catalog = sample_catalog();
    let resolver = LocationResolver::new(&catalog);
    let draft = LocationDraft {
        path: vec!["Zamfara".into()],
        candidates: Vec::new(),
    };
    let (stage, draft, _) = expect_continue(resolver.advance(ResolverStage::Find, draft, "gusa"));
    let lowest = (draft.candidates.len() + 2).to_string();
    let (stage, draft, prompt) = expect_continue(resolver.advance(stage, draft, &lowest));
    assert_eq!(stage, ResolverStage::Confirm);
    let Prompt::Confirm { place } = prompt else {
        panic!("expected confirmation prompt");
    };
    assert_eq!(place.place_id().0, "ZA");

    let (stage, draft, _) = expect_continue(resolver.advance(stage, draft, "no"));
    assert_eq!(stage, ResolverStage::Find);
    assert!(draft.path.is_empty());
}

#[test]
fn lowest_level_at_root_restarts() {
    let catalog = sample_catalog();
    let resolver = LocationResolver::new(&catalog);
    let (stage, draft, _) =
        expect_continue(resolver.advance(ResolverStage::Find, LocationDraft::default(), "qqq"));
    let lowest = (draft.candidates.len() + 2).to_string();
    let (stage, draft, _) = expect_continue(resolver.advance(stage, draft, &lowest));
    assert_eq!(stage, ResolverStage::Find);
    assert!(draft.path.is_empty());
}
