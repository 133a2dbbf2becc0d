//! Presentation of a `RewriteOutcome`: the JSON response and the downloadable text report.
//! Pure projection; nothing here changes what the orchestrator decided.

use std::fmt;

use serde::Serialize;

use crate::rewrite::models::{AttemptRecord, AttemptStatus, OutcomeStatus, RewriteOutcome, TokenUsage};

#[derive(Debug, Serialize)]
pub struct AttemptView {
    pub attempt_number: u32,
    pub proposed_text: String,
    pub word_count: Option<u32>,
    pub delta: Option<i64>,
    pub status: AttemptStatus,
    /// Rounded to 3 decimals.
    pub similarity_score: Option<f64>,
    /// `None` when the candidate never reached the hard rules.
    pub hard_rules_passed: Option<bool>,
    pub rejection_reason: Option<String>,
    pub error_message: Option<String>,
}

impl From<&AttemptRecord> for AttemptView {
    fn from(a: &AttemptRecord) -> Self {
        let hard_rules_passed = match a.status {
            AttemptStatus::GenerationFailed | AttemptStatus::OutOfRange => None,
            AttemptStatus::RejectedByHardRules => Some(false),
            AttemptStatus::RejectedBySemanticSimilarity
            | AttemptStatus::SimilarityUnavailable
            | AttemptStatus::Accepted => Some(true),
        };

        Self {
            attempt_number: a.attempt_number,
            proposed_text: a.proposed_text.clone(),
            word_count: a.word_count,
            delta: a.delta,
            status: a.status,
            similarity_score: a.similarity_score.map(round3),
            hard_rules_passed,
            rejection_reason: a.rejection_reason.clone(),
            error_message: a.error_message.clone(),
        }
    }
}

/// JSON body of `POST /api/rewrite`.
#[derive(Debug, Serialize)]
pub struct RewriteResponse {
    pub success: bool,
    pub session_id: String,
    pub original_text: String,
    pub original_word_count: u32,
    pub final_text: String,
    pub final_word_count: u32,
    pub status: OutcomeStatus,
    pub total_attempts: u32,
    pub validation_reason: String,
    pub target_words: Option<u32>,
    pub mode: String,
    pub model: Option<String>,
    pub error: Option<String>,
    pub attempts: Vec<AttemptView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_metrics: Option<TokenUsage>,
    pub summary: String,
}

impl RewriteResponse {
    pub fn from_outcome(outcome: &RewriteOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            session_id: outcome.session_id.clone(),
            original_text: outcome.original_text.clone(),
            original_word_count: outcome.original_word_count,
            final_text: outcome.final_text.clone(),
            final_word_count: outcome.final_word_count,
            status: outcome.status,
            total_attempts: outcome.total_attempts,
            validation_reason: outcome.validation_reason.clone(),
            target_words: outcome.target_words,
            mode: outcome.mode.to_string(),
            model: outcome.model.clone(),
            error: outcome.error.clone(),
            attempts: outcome.attempts.iter().map(AttemptView::from).collect(),
            token_metrics: outcome.token_usage(),
            summary: summary(outcome),
        }
    }
}

fn round3(score: f32) -> f64 {
    (f64::from(score) * 1000.0).round() / 1000.0
}

/// One human-readable line per terminal status.
pub fn summary(outcome: &RewriteOutcome) -> String {
    let words = format!(
        "{} → {} words",
        outcome.original_word_count, outcome.final_word_count
    );
    match outcome.status {
        OutcomeStatus::Accepted if outcome.total_attempts == 0 => {
            format!("Already within range ({} words); no rewrite needed.", outcome.original_word_count)
        }
        OutcomeStatus::Accepted => {
            format!("Accepted after {} attempt(s): {words}.", outcome.total_attempts)
        }
        OutcomeStatus::BestEffort => format!(
            "No attempt was accepted in {} attempt(s); returning the best candidate by \
             similarity ({words}).",
            outcome.total_attempts
        ),
        OutcomeStatus::Rejected => match &outcome.error {
            Some(error) => format!("Rewrite failed: {error}"),
            None => format!(
                "No usable candidate in {} attempt(s); the original text is returned.",
                outcome.total_attempts
            ),
        },
        OutcomeStatus::Cancelled => "Rewrite cancelled; the original text is returned.".to_string(),
    }
}

/// Plain-text report served by `POST /api/download`.
pub fn render_report(outcome: &RewriteOutcome) -> String {
    Report(outcome).to_string()
}

struct Report<'a>(&'a RewriteOutcome);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.0;
        let target = outcome
            .target_words
            .map(|t| t.to_string())
            .unwrap_or_else(|| "n/a".to_string());

        writeln!(f, "REWRITE REPORT")?;
        writeln!(f, "==============")?;
        writeln!(f, "Session: {}", outcome.session_id)?;
        writeln!(f)?;
        writeln!(f, "ORIGINAL TEXT ({} words):", outcome.original_word_count)?;
        writeln!(f, "{}", outcome.original_text)?;
        writeln!(f)?;
        writeln!(f, "FINAL TEXT ({} words):", outcome.final_word_count)?;
        writeln!(f, "{}", outcome.final_text)?;
        writeln!(f)?;
        writeln!(f, "METRICS:")?;
        writeln!(f, "- Total attempts: {}", outcome.total_attempts)?;
        writeln!(f, "- Target words: {target}")?;
        writeln!(f, "- Mode: {}", outcome.mode)?;
        if let Some(model) = &outcome.model {
            writeln!(f, "- Model: {model}")?;
        }
        writeln!(f, "- Status: {}", outcome.status.as_str())?;
        writeln!(f, "- Validation reason: {}", outcome.validation_reason)?;
        if let Some(usage) = outcome.token_usage() {
            writeln!(
                f,
                "- Tokens: {} prompt, {} completion, {} total",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            )?;
        }
        if let Some(error) = &outcome.error {
            writeln!(f, "- Error: {error}")?;
        }

        if !outcome.attempts.is_empty() {
            writeln!(f)?;
            writeln!(f, "ATTEMPTS:")?;
        }
        for a in &outcome.attempts {
            write_attempt(f, a)?;
        }
        Ok(())
    }
}

fn write_attempt(f: &mut fmt::Formatter<'_>, a: &AttemptRecord) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "  Attempt {}:", a.attempt_number)?;
    writeln!(f, "    - Status: {}", a.status.as_str())?;
    if let Some(wc) = a.word_count {
        writeln!(f, "    - Words: {wc}")?;
    }
    if let Some(delta) = a.delta.filter(|d| *d != 0) {
        writeln!(f, "    - Delta: {delta:+}")?;
    }
    if let Some(score) = a.similarity_score {
        writeln!(f, "    - Similarity: {score:.3}")?;
    }
    if let Some(reason) = &a.rejection_reason {
        writeln!(f, "    - Reason: {reason}")?;
    }
    if let Some(error) = &a.error_message {
        writeln!(f, "    - Error: {error}")?;
    }
    Ok(())
}
