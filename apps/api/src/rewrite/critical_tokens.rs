//! Critical tokens: substrings of the original that every rewrite must keep verbatim.
//!
//! Extracted once per request and only read afterwards.
//!
//! # Kinds
//! - Dates (`05/03/2024`, `5-3-24`, `2024-03-05`), percentages (`15%`, `2,5%`), numbers (`45`, `1.000`, `3,14`)
//! - Acronyms: 2+ uppercase letters, digits and hyphens allowed (`ONU`, `ADN`, `COVID-19`)
//! - Proper nouns: capitalized words that do not start a sentence, and mixed-case words anywhere (`OpenAI`)
//! - Technical terms: lowercase words at least `min_technical_term_chars` long,
//!   minus the configured `common_words`
//!
//! Technical terms match case-insensitively; everything else is case-sensitive.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::TokenRules;

/// Dates win over percentages, percentages over bare numbers (leftmost-first alternation).
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<date>\b\d{4}-\d{2}-\d{2}\b | \b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b)
        | (?P<pct>\d+(?:[.,]\d+)?%)
        | (?P<num>\d+(?:[.,]\d+)*)",
    )
    .expect("numeric token regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Date,
    Percentage,
    Number,
    Acronym,
    ProperNoun,
    TechnicalTerm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriticalToken {
    pub text: String,
    pub kind: TokenKind,
}

impl CriticalToken {
    fn case_sensitive(&self) -> bool {
        self.kind != TokenKind::TechnicalTerm
    }

    /// True if the token occurs in `text` on word boundaries.
    pub fn is_present_in(&self, text: &str) -> bool {
        if self.case_sensitive() {
            contains_bounded(text, &self.text)
        } else {
            contains_bounded(&text.to_lowercase(), &self.text.to_lowercase())
        }
    }
}

/// Ordered, de-duplicated set of critical tokens (order of first appearance).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CriticalTokenSet {
    tokens: Vec<CriticalToken>,
}

impl CriticalTokenSet {
    pub fn extract(text: &str, rules: &TokenRules) -> Self {
        let mut set = CriticalTokenSet::default();

        for caps in NUMERIC_RE.captures_iter(text) {
            let (m, kind) = if let Some(m) = caps.name("date") {
                (m, TokenKind::Date)
            } else if let Some(m) = caps.name("pct") {
                (m, TokenKind::Percentage)
            } else if let Some(m) = caps.name("num") {
                (m, TokenKind::Number)
            } else {
                continue;
            };
            set.push(m.as_str(), kind);
        }

        for word in words(text) {
            if let Some(kind) = classify_word(&word, rules) {
                set.push(word.core, kind);
            }
        }

        set
    }

    fn push(&mut self, text: &str, kind: TokenKind) {
        if !self.tokens.iter().any(|t| t.text == text) {
            self.tokens.push(CriticalToken {
                text: text.to_string(),
                kind,
            });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CriticalToken> {
        self.tokens.iter()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.tokens.iter().any(|t| t.text == text)
    }

    /// Tokens that do not occur in `candidate`, in extraction order.
    pub fn missing_from(&self, candidate: &str) -> Vec<&CriticalToken> {
        self.tokens
            .iter()
            .filter(|t| !t.is_present_in(candidate))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared text helpers (also used by the hard rules)
// ────────────────────────────────────────────────────────────────────────────

/// A whitespace token with surrounding punctuation stripped.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Word<'a> {
    pub core: &'a str,
    /// First word of the text or of a sentence.
    pub sentence_start: bool,
    /// The raw token ended with punctuation (`,`, `.`, `)`...).
    pub trailing_punct: bool,
}

pub(crate) fn words(text: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut next_starts_sentence = true;

    for raw in text.split_whitespace() {
        let core = raw.trim_matches(|c: char| !c.is_alphanumeric());
        let opens_sentence = raw.starts_with(['¿', '¡']);
        let trailing_punct = core.len() < raw.len() && !raw.ends_with(core);

        if !core.is_empty() {
            out.push(Word {
                core,
                sentence_start: next_starts_sentence || opens_sentence,
                trailing_punct,
            });
        }

        next_starts_sentence = if core.is_empty() {
            next_starts_sentence || raw.ends_with(['.', '!', '?', '…'])
        } else {
            raw.ends_with(['.', '!', '?', ':', '…'])
        };
    }

    out
}

/// Every numeric value in `text` (dates verbatim, percentages without `%`).
pub(crate) fn numeric_values(text: &str) -> HashSet<String> {
    NUMERIC_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('%').to_string())
        .collect()
}

/// Substring search that only accepts matches not glued to other alphanumerics.
pub(crate) fn contains_bounded(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let starts_alnum = needle.chars().next().is_some_and(char::is_alphanumeric);
    let ends_alnum = needle.chars().next_back().is_some_and(char::is_alphanumeric);

    haystack.match_indices(needle).any(|(i, _)| {
        let before_ok = !starts_alnum
            || !haystack[..i]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric);
        let after_ok = !ends_alnum
            || !haystack[i + needle.len()..]
                .chars()
                .next()
                .is_some_and(char::is_alphanumeric);
        before_ok && after_ok
    })
}

pub(crate) fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn is_acronym(word: &str) -> bool {
    let uppercase = word.chars().filter(|c| c.is_uppercase()).count();
    uppercase >= 2
        && word
            .chars()
            .all(|c| c.is_uppercase() || c.is_ascii_digit() || c == '-')
}

fn is_mixed_case(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest: Vec<char> = chars.collect();
    let inner_upper = rest.iter().any(|c| c.is_uppercase());
    let inner_lower = rest.iter().any(|c| c.is_lowercase());
    // "OpenAI", "McDonald", "iPhone"
    inner_upper && (inner_lower || first.is_lowercase())
}

fn classify_word(word: &Word<'_>, rules: &TokenRules) -> Option<TokenKind> {
    let core = word.core;
    if !core.chars().any(char::is_alphabetic) {
        return None; // numbers are handled by the numeric pass
    }
    if is_acronym(core) {
        return Some(TokenKind::Acronym);
    }
    if is_mixed_case(core) {
        return Some(TokenKind::ProperNoun);
    }
    if is_capitalized(core) && !word.sentence_start {
        return Some(TokenKind::ProperNoun);
    }
    let all_lower = core
        .chars()
        .all(|c| c.is_lowercase() || c == '-' || c == '\'');
    if all_lower
        && core.chars().count() >= rules.min_technical_term_chars
        && !rules.common_words.iter().any(|w| w == core)
    {
        return Some(TokenKind::TechnicalTerm);
    }
    None
}
