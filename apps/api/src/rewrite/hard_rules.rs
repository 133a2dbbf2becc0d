//! Hard rules: deterministic fidelity checks on a candidate rewrite.
//!
//! Checks run in order and stop at the first failure:
//! 1. every critical token of the original is present in the candidate
//! 2. the candidate introduces no numeric value absent from the original
//! 3. the candidate introduces no new named entity and no new-claim marker
//!
//! Pure text analysis: no network, no state beyond the configured rules.

use std::collections::HashSet;
use std::fmt;

use crate::config::TokenRules;
use crate::rewrite::critical_tokens::{
    is_capitalized, numeric_values, words, CriticalTokenSet,
};

/// The first rule a candidate broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardRuleViolation {
    MissingCriticalTokens(Vec<String>),
    NewNumbers(Vec<String>),
    NewEntities(Vec<String>),
    NewClaimMarker(String),
}

impl fmt::Display for HardRuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardRuleViolation::MissingCriticalTokens(tokens) => write!(
                f,
                "critical tokens missing from the rewrite: {}",
                quoted(tokens)
            ),
            HardRuleViolation::NewNumbers(values) => write!(
                f,
                "numbers not present in the original were introduced: {}",
                quoted(values)
            ),
            HardRuleViolation::NewEntities(entities) => write!(
                f,
                "named entities not present in the original were introduced: {}",
                quoted(entities)
            ),
            HardRuleViolation::NewClaimMarker(marker) => write!(
                f,
                "a new external claim was introduced (\"{marker}\")"
            ),
        }
    }
}

fn quoted(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("\"{i}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardRuleVerdict {
    Pass,
    Fail(HardRuleViolation),
}

#[derive(Debug, Clone)]
pub struct HardRulesValidator {
    rules: TokenRules,
}

impl HardRulesValidator {
    pub fn new(rules: TokenRules) -> Self {
        Self { rules }
    }

    pub fn validate(
        &self,
        original: &str,
        candidate: &str,
        critical: &CriticalTokenSet,
    ) -> HardRuleVerdict {
        let missing = critical.missing_from(candidate);
        if !missing.is_empty() {
            return HardRuleVerdict::Fail(HardRuleViolation::MissingCriticalTokens(
                missing.into_iter().map(|t| t.text.clone()).collect(),
            ));
        }

        let new_numbers = introduced_numbers(original, candidate, critical);
        if !new_numbers.is_empty() {
            return HardRuleVerdict::Fail(HardRuleViolation::NewNumbers(new_numbers));
        }

        if let Some(marker) = self.introduced_claim_marker(original, candidate) {
            return HardRuleVerdict::Fail(HardRuleViolation::NewClaimMarker(marker));
        }

        if self.rules.flag_new_entities {
            let entities = introduced_entities(original, candidate);
            if !entities.is_empty() {
                return HardRuleVerdict::Fail(HardRuleViolation::NewEntities(entities));
            }
        }

        HardRuleVerdict::Pass
    }

    fn introduced_claim_marker(&self, original: &str, candidate: &str) -> Option<String> {
        let original = original.to_lowercase();
        let candidate = candidate.to_lowercase();
        self.rules
            .new_claim_markers
            .iter()
            .find(|m| candidate.contains(m.as_str()) && !original.contains(m.as_str()))
            .cloned()
    }
}

/// Numeric values in the candidate that neither the original nor the critical set contains.
fn introduced_numbers(original: &str, candidate: &str, critical: &CriticalTokenSet) -> Vec<String> {
    let known = numeric_values(original);
    let mut introduced: Vec<String> = numeric_values(candidate)
        .into_iter()
        .filter(|v| !known.contains(v) && !critical.contains(v))
        .collect();
    introduced.sort();
    introduced
}

/// Capitalized multi-word sequences in the candidate that the original lacks and that
/// contain at least one word the original never uses.
///
/// A sentence-initial word is dropped from its run since its capital is grammatical.
fn introduced_entities(original: &str, candidate: &str) -> Vec<String> {
    let known_words: HashSet<String> = words(original)
        .iter()
        .map(|w| w.core.to_lowercase())
        .collect();

    let mut runs: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in words(candidate) {
        if is_capitalized(word.core) && !word.sentence_start {
            current.push(word.core);
        } else {
            runs.push(std::mem::take(&mut current));
        }
        if word.trailing_punct {
            runs.push(std::mem::take(&mut current));
        }
    }
    runs.push(current);

    let mut introduced = Vec::new();
    for run in runs.into_iter().filter(|r| r.len() >= 2) {
        let phrase = run.join(" ");
        if original.contains(&phrase) {
            continue;
        }
        let has_unknown_word = run
            .iter()
            .any(|w| !known_words.contains(&w.to_lowercase()));
        if has_unknown_word && !introduced.contains(&phrase) {
            introduced.push(phrase);
        }
    }
    introduced
}
