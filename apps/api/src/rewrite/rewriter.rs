//! Generative rewriter: the boundary to the text-generation backend.
//!
//! `Rewriter` is the seam: the orchestrator only sees "instructions in, text + usage out".
//! `LlmRewriter` is the production backend over [`LlmClient`].

use async_trait::async_trait;
use thiserror::Error;

use crate::llm_client::{CompletionRequest, LlmClient, LlmError};
use crate::rewrite::critical_tokens::CriticalTokenSet;
use crate::rewrite::feedback::RetryFeedback;
use crate::rewrite::models::{Mode, TokenUsage};
use crate::rewrite::prompts::{
    BALANCED_INSTRUCTION, CONDENSE_DIRECTION, EXPAND_DIRECTION, REWRITE_PROMPT_TEMPLATE,
    REWRITE_SYSTEM, STRICT_INSTRUCTION,
};

/// Everything one generation call needs.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub original: &'a str,
    pub original_word_count: u32,
    pub min_words: u32,
    pub max_words: u32,
    pub target_words: u32,
    pub mode: Mode,
    pub critical_tokens: &'a CriticalTokenSet,
    /// Empty on the first attempt.
    pub feedback: Option<&'a RetryFeedback>,
    /// Overrides the backend's default model.
    pub model: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// Timeout, rate limit, server error, malformed response: the next attempt may succeed.
    #[error("{0}")]
    Transient(String),

    /// Credentials or configuration: every further attempt would fail the same way.
    #[error("{0}")]
    Fatal(String),
}

impl GenerationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, GenerationError::Fatal(_))
    }
}

impl From<LlmError> for GenerationError {
    fn from(e: LlmError) -> Self {
        if e.is_retryable() {
            GenerationError::Transient(e.to_string())
        } else {
            GenerationError::Fatal(e.to_string())
        }
    }
}

/// The generation capability. Implement this to swap backends or to fake them in tests.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, request: &GenerationRequest<'_>) -> Result<Generation, GenerationError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmRewriter
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmRewriter {
    llm: LlmClient,
    default_model: String,
}

impl LlmRewriter {
    pub fn new(llm: LlmClient, default_model: String) -> Self {
        Self { llm, default_model }
    }
}

#[async_trait]
impl Rewriter for LlmRewriter {
    async fn rewrite(&self, request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        let prompt = build_rewrite_prompt(request);
        let completion = self
            .llm
            .complete(&CompletionRequest {
                model: request.model.unwrap_or(&self.default_model),
                system: REWRITE_SYSTEM,
                prompt: &prompt,
                max_tokens: completion_token_budget(request.target_words),
                temperature: temperature(request.mode),
            })
            .await?;

        let text = clean_completion(&completion.text);
        if text.is_empty() {
            return Err(GenerationError::Transient(
                "model returned only formatting, no text".to_string(),
            ));
        }

        Ok(Generation {
            text: text.to_string(),
            usage: completion.usage,
        })
    }
}

/// Completion token ceiling for a target length. Generous enough for any language
/// the model writes, tight enough that a runaway answer is cut off.
pub fn completion_token_budget(target_words: u32) -> u32 {
    target_words.saturating_mul(3).saturating_add(64)
}

fn temperature(mode: Mode) -> f32 {
    match mode {
        Mode::Strict => 0.2,
        Mode::Balanced => 0.7,
    }
}

/// Fills the rewrite template for one attempt.
pub fn build_rewrite_prompt(request: &GenerationRequest<'_>) -> String {
    let direction = if request.original_word_count > request.max_words {
        CONDENSE_DIRECTION
    } else {
        EXPAND_DIRECTION
    };

    let mode_instruction = match request.mode {
        Mode::Strict => STRICT_INSTRUCTION,
        Mode::Balanced => BALANCED_INSTRUCTION,
    };

    let critical_tokens = if request.critical_tokens.is_empty() {
        "(none)".to_string()
    } else {
        request
            .critical_tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let feedback = request
        .feedback
        .map(|f| format!("7. PREVIOUS ATTEMPT: {}\n", f.render()))
        .unwrap_or_default();

    REWRITE_PROMPT_TEMPLATE
        .replace("{min_words}", &request.min_words.to_string())
        .replace("{max_words}", &request.max_words.to_string())
        .replace("{target_words}", &request.target_words.to_string())
        .replace("{direction}", direction)
        .replace("{mode_instruction}", mode_instruction)
        .replace("{critical_tokens}", &critical_tokens)
        .replace("{feedback}", &feedback)
        // last: the original text may itself contain braces
        .replace("{original_text}", request.original)
}

/// Labels a model may put before its answer. Matched whole, never as a prefix.
const COMPLETION_LABELS: &[&str] = &[
    "texto",
    "texto reescrito",
    "texto final",
    "versión final",
    "version final",
    "reescritura",
    "text",
    "rewritten text",
    "final text",
    "final version",
];

/// Strips code fences, wrapping quotes and a leading label ("Texto:", "Rewritten text:")
/// that models sometimes add despite instructions.
pub fn clean_completion(text: &str) -> &str {
    let mut text = text.trim();

    if let Some(stripped) = text.strip_prefix("```") {
        let stripped = stripped
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or(stripped);
        text = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    }

    if let Some((label, rest)) = text.split_once(':') {
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if COMPLETION_LABELS.contains(&label.as_str()) && !rest.trim().is_empty() {
            text = rest.trim();
        }
    }

    for (open, close) in [('"', '"'), ('“', '”'), ('«', '»'), ('\'', '\'')] {
        if text.len() > 1 && text.starts_with(open) && text.ends_with(close) {
            let inner = &text[open.len_utf8()..text.len() - close.len_utf8()];
            if !inner.contains(open) && !inner.contains(close) {
                text = inner.trim();
                break;
            }
        }
    }

    text
}
