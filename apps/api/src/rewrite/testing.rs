//! Deterministic fakes for the rewriter and embedder seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::rewrite::feedback::RetryFeedback;
use crate::rewrite::models::TokenUsage;
use crate::rewrite::rewriter::{Generation, GenerationError, GenerationRequest, Rewriter};
use crate::rewrite::semantic::Embedder;

pub const TRIANGLE: &str = "El área del triángulo es 45 cm² según Pitágoras.";

/// `base` followed by filler words until the text has `total` words.
pub fn padded(base: &str, total: u32) -> String {
    let mut text = base.to_string();
    let have = crate::rewrite::word_counter::count(base);
    for _ in have..total {
        text.push_str(" contenido");
    }
    text
}

/// `n` filler words.
pub fn filler(n: u32) -> String {
    vec!["contenido"; n as usize].join(" ")
}

pub fn usage(total: u64) -> TokenUsage {
    TokenUsage {
        prompt_tokens: total / 2,
        completion_tokens: total - total / 2,
        total_tokens: total,
        cached_tokens: 0,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rewriters
// ────────────────────────────────────────────────────────────────────────────

/// What the rewriter saw on one call.
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub target_words: u32,
    pub feedback: Option<RetryFeedback>,
    pub model: Option<String>,
}

/// Replays a queue of responses; the last one repeats once the queue is drained.
pub struct ScriptedRewriter {
    responses: Mutex<VecDeque<Result<Generation, GenerationError>>>,
    last: Mutex<Option<Result<Generation, GenerationError>>>,
    calls: Mutex<Vec<SeenCall>>,
}

impl ScriptedRewriter {
    pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        let responses = responses
            .into_iter()
            .map(|r| {
                r.map(|text| Generation {
                    text,
                    usage: Some(usage(100)),
                })
            })
            .collect();
        Self {
            responses: Mutex::new(responses),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    pub fn failing(error: GenerationError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Rewriter for ScriptedRewriter {
    async fn rewrite(&self, request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        self.calls.lock().unwrap().push(SeenCall {
            target_words: request.target_words,
            feedback: request.feedback.cloned(),
            model: request.model.map(String::from),
        });

        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(GenerationError::Transient("script exhausted".into()))),
        }
    }
}

/// Sleeps before answering. Drives the timeout paths under a paused clock.
pub struct SlowRewriter {
    pub delay: Duration,
    pub text: String,
}

#[async_trait]
impl Rewriter for SlowRewriter {
    async fn rewrite(&self, _request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        tokio::time::sleep(self.delay).await;
        Ok(Generation {
            text: self.text.clone(),
            usage: None,
        })
    }
}

/// Cancels `token` from inside its first call and then never answers.
pub struct CancellingRewriter {
    pub token: CancellationToken,
}

#[async_trait]
impl Rewriter for CancellingRewriter {
    async fn rewrite(&self, _request: &GenerationRequest<'_>) -> Result<Generation, GenerationError> {
        self.token.cancel();
        std::future::pending().await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Embedders
// ────────────────────────────────────────────────────────────────────────────

/// Maps the original to `[1, 0]` and each scored text to a unit vector whose
/// cosine with the original equals its score. Unscored texts score 1.0.
pub struct ScriptedEmbedder {
    original: String,
    scores: HashMap<String, f32>,
    default_score: f32,
}

impl ScriptedEmbedder {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            scores: HashMap::new(),
            default_score: 1.0,
        }
    }

    pub fn with_score(mut self, text: impl Into<String>, score: f32) -> Self {
        self.scores.insert(text.into(), score);
        self
    }

    pub fn with_default_score(mut self, score: f32) -> Self {
        self.default_score = score;
        self
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if text == self.original {
            return Ok(vec![1.0, 0.0]);
        }
        let s = self.scores.get(text).copied().unwrap_or(self.default_score);
        Ok(vec![s, (1.0 - s * s).max(0.0).sqrt()])
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding service unreachable")
    }
}

/// Never answers. Drives the similarity timeout path.
pub struct HangingEmbedder;

#[async_trait]
impl Embedder for HangingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        std::future::pending().await
    }
}
