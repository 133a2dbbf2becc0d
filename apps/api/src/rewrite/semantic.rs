//! Semantic validator: cosine similarity between original and candidate embeddings.
//!
//! The embedding backend is pluggable through [`Embedder`]. A backend failure is a
//! [`SimilarityError`], never a low score, so callers can tell "diverged" from
//! "could not check".

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SimilarityThresholds;
use crate::llm_client::LlmClient;
use crate::rewrite::models::Mode;

/// Converts text to a vector. Implement this to swap embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Embeddings through the shared [`LlmClient`].
pub struct LlmEmbedder {
    llm: LlmClient,
    model: String,
}

impl LlmEmbedder {
    pub fn new(llm: LlmClient, model: String) -> Self {
        Self { llm, model }
    }
}

#[async_trait]
impl Embedder for LlmEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.llm.embed(&self.model, text).await?)
    }
}

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("embedding backend failed: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("embedding dimensions differ ({original} vs {candidate})")]
    DimensionMismatch { original: usize, candidate: usize },

    #[error("embedding backend returned an empty vector")]
    EmptyEmbedding,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticVerdict {
    pub score: f32,
    pub threshold: f32,
    pub passed: bool,
}

#[derive(Clone)]
pub struct SemanticValidator {
    embedder: Arc<dyn Embedder>,
    thresholds: SimilarityThresholds,
}

impl SemanticValidator {
    pub fn new(embedder: Arc<dyn Embedder>, thresholds: SimilarityThresholds) -> Self {
        Self {
            embedder,
            thresholds,
        }
    }

    pub fn threshold(&self, mode: Mode) -> f32 {
        self.thresholds.for_mode(mode)
    }

    /// Embeds both texts and compares their cosine similarity with the mode's threshold.
    pub async fn validate(
        &self,
        original: &str,
        candidate: &str,
        mode: Mode,
    ) -> Result<SemanticVerdict, SimilarityError> {
        let a = self.embedder.embed(original).await?;
        let b = self.embedder.embed(candidate).await?;

        let score = cosine_similarity(&a, &b)?;
        let threshold = self.threshold(mode);

        Ok(SemanticVerdict {
            score,
            threshold,
            passed: score >= threshold,
        })
    }
}

/// Cosine similarity clamped to [0, 1]. Zero-norm vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.is_empty() || b.is_empty() {
        return Err(SimilarityError::EmptyEmbedding);
    }
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            original: a.len(),
            candidate: b.len(),
        });
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom < f64::EPSILON {
        return Ok(0.0);
    }

    let raw = dot / denom;
    if !raw.is_finite() {
        return Ok(0.0);
    }

    Ok(raw.clamp(0.0, 1.0) as f32)
}
