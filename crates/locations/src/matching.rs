use crate::LocationNode;

/// Size of the candidate window shown when no exact match exists.
pub const MAX_CANDIDATES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub distance: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<'a> {
    Exact(&'a LocationNode),
    /// Best candidates, closest first, ties in catalog order.
    Ranked(Vec<Candidate>),
}

/// Lowercases and collapses runs of whitespace.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Numbered replies: the digits the reply starts with, so `2`, `2.` and `2)`
/// all pick option two.
pub fn leading_choice(input: &str) -> Option<usize> {
    let trimmed = input.trim_start();
    let digits = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    trimmed[..digits].parse().ok()
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

pub fn rank_children<'a>(node: &'a LocationNode, input: &str) -> MatchOutcome<'a> {
    let wanted = normalize(input);
    if let Some(exact) = node
        .children
        .iter()
        .find(|child| normalize(&child.name) == wanted)
    {
        return MatchOutcome::Exact(exact);
    }

    let mut ranked: Vec<Candidate> = node
        .children
        .iter()
        .map(|child| Candidate {
            name: child.name.clone(),
            distance: edit_distance(&wanted, &normalize(&child.name)),
        })
        .collect();
    // stable sort keeps catalog order among equal distances
    ranked.sort_by_key(|candidate| candidate.distance);
    ranked.truncate(MAX_CANDIDATES);
    MatchOutcome::Ranked(ranked)
}

#[cfg(test)]
#[path = "tests/matching_tests.rs"]
mod tests;
