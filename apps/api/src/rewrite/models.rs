//! Request-scoped data model for one rewrite run.
//!
//! Everything here is created once and never mutated after construction:
//! `RewriteRequest` on entry, one `AttemptRecord` per resolved attempt, and a
//! single `RewriteOutcome` at the end.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RewriteSettings;
use crate::llm_client::catalog;

// ────────────────────────────────────────────────────────────────────────────
// Mode
// ────────────────────────────────────────────────────────────────────────────

/// Rewriting mode. Strict keeps wording as literal as possible and uses the
/// higher similarity threshold; balanced allows more natural phrasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Strict,
    Balanced,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Balanced => "balanced",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Mode::Strict),
            "balanced" => Ok(Mode::Balanced),
            other => Err(RequestError::UnknownMode(other.to_string())),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request
// ────────────────────────────────────────────────────────────────────────────

/// Input validation failures. Raised before the orchestrator runs, so no
/// attempt is ever consumed by an invalid request.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("input_text cannot be empty")]
    EmptyText,

    #[error("input_text has {actual} characters (maximum {max})")]
    TextTooLong { actual: usize, max: usize },

    #[error("min_words and max_words must be greater than 0")]
    NonPositiveRange,

    #[error("min_words ({min}) cannot be greater than max_words ({max})")]
    InvertedRange { min: u32, max: u32 },

    #[error("max_attempts must be between 1 and {limit} (got {actual})")]
    AttemptsOutOfBounds { actual: u32, limit: u32 },

    #[error("unknown mode '{0}' (expected 'strict' or 'balanced')")]
    UnknownMode(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

/// A validated rewrite request. Construct it through [`RewriteRequest::validate`].
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub text: String,
    pub min_words: u32,
    pub max_words: u32,
    pub mode: Mode,
    pub max_attempts: u32,
    pub model: Option<String>,
    /// Short correlation id used in logs and echoed to the caller.
    pub session_id: String,
}

/// Raw request fields as they arrive from the HTTP boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteRequestBody {
    pub input_text: String,
    pub min_words: u32,
    pub max_words: u32,
    pub mode: Option<String>,
    pub max_attempts: Option<u32>,
    pub model: Option<String>,
}

impl RewriteRequest {
    /// Applies defaults from `settings` and checks every request invariant.
    pub fn validate(
        body: RewriteRequestBody,
        settings: &RewriteSettings,
        session_id: String,
    ) -> Result<Self, RequestError> {
        if body.input_text.trim().is_empty() {
            return Err(RequestError::EmptyText);
        }

        let chars = body.input_text.chars().count();
        if chars > settings.max_input_chars {
            return Err(RequestError::TextTooLong {
                actual: chars,
                max: settings.max_input_chars,
            });
        }

        if body.min_words == 0 || body.max_words == 0 {
            return Err(RequestError::NonPositiveRange);
        }
        if body.min_words > body.max_words {
            return Err(RequestError::InvertedRange {
                min: body.min_words,
                max: body.max_words,
            });
        }

        let max_attempts = body.max_attempts.unwrap_or(settings.default_max_attempts);
        if max_attempts == 0 || max_attempts > settings.max_attempts_limit {
            return Err(RequestError::AttemptsOutOfBounds {
                actual: max_attempts,
                limit: settings.max_attempts_limit,
            });
        }

        let mode = match body.mode.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => settings.default_mode,
        };

        let model = match body.model {
            Some(id) if !id.trim().is_empty() => {
                let id = id.trim().to_string();
                if catalog::find(&id).is_none() {
                    return Err(RequestError::UnknownModel(id));
                }
                Some(id)
            }
            _ => None,
        };

        Ok(RewriteRequest {
            text: body.input_text,
            min_words: body.min_words,
            max_words: body.max_words,
            mode,
            max_attempts,
            model,
            session_id,
        })
    }

    pub fn in_range(&self, word_count: u32) -> bool {
        self.min_words <= word_count && word_count <= self.max_words
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Usage metrics (pass-through from the generation backend)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cached_tokens += other.cached_tokens;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Attempts
// ────────────────────────────────────────────────────────────────────────────

/// Terminal status of a single attempt. Every recorded attempt has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    /// The generation call failed or timed out.
    GenerationFailed,
    OutOfRange,
    RejectedByHardRules,
    RejectedBySemanticSimilarity,
    /// In range and hard rules passed, but similarity could not be computed.
    SimilarityUnavailable,
    Accepted,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::GenerationFailed => "GENERATION_FAILED",
            AttemptStatus::OutOfRange => "OUT_OF_RANGE",
            AttemptStatus::RejectedByHardRules => "REJECTED_BY_HARD_RULES",
            AttemptStatus::RejectedBySemanticSimilarity => "REJECTED_BY_SEMANTIC_SIMILARITY",
            AttemptStatus::SimilarityUnavailable => "SIMILARITY_UNAVAILABLE",
            AttemptStatus::Accepted => "ACCEPTED",
        }
    }
}

/// One resolved attempt. Appended to the run's history and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 1-based, contiguous within a run.
    pub attempt_number: u32,
    pub proposed_text: String,
    /// `None` when generation failed and there is nothing to count.
    pub word_count: Option<u32>,
    /// `word_count - target_words`.
    pub delta: Option<i64>,
    pub status: AttemptStatus,
    /// `None` when the semantic check never ran or could not produce a score.
    pub similarity_score: Option<f32>,
    pub usage: Option<TokenUsage>,
    /// Why the candidate was rejected (hard rule, threshold).
    pub rejection_reason: Option<String>,
    /// Collaborator failure message (generation or similarity backend).
    pub error_message: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Outcome
// ────────────────────────────────────────────────────────────────────────────

/// Terminal status of the whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// Already in range, or an attempt passed every check.
    Accepted,
    /// Budget exhausted; the best in-range, hard-rule-passing candidate is returned.
    BestEffort,
    /// No usable candidate, or a fatal collaborator failure. Final text is the original.
    Rejected,
    /// The caller or the server stopped the run.
    Cancelled,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Accepted => "ACCEPTED",
            OutcomeStatus::BestEffort => "BEST_EFFORT",
            OutcomeStatus::Rejected => "REJECTED",
            OutcomeStatus::Cancelled => "CANCELLED",
        }
    }
}

/// The single result of a rewrite run.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub session_id: String,
    pub original_text: String,
    pub original_word_count: u32,
    pub final_text: String,
    pub final_word_count: u32,
    /// `None` when no rewriting was needed.
    pub target_words: Option<u32>,
    pub mode: Mode,
    pub model: Option<String>,
    pub status: OutcomeStatus,
    pub total_attempts: u32,
    pub validation_reason: String,
    pub attempts: Vec<AttemptRecord>,
    pub error: Option<String>,
}

impl RewriteOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Accepted
    }

    /// Sum of the usage reported by every attempt, if any attempt reported usage.
    pub fn token_usage(&self) -> Option<TokenUsage> {
        self.attempts
            .iter()
            .filter_map(|a| a.usage.as_ref())
            .fold(None, |acc, usage| {
                let mut total = acc.unwrap_or_default();
                total.add(usage);
                Some(total)
            })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
