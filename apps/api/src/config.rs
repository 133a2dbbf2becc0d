use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::rewrite::models::Mode;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub default_model: String,
    pub embedding_model: String,
    pub llm_http_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
    pub rewrite: RewriteSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = RewriteSettings::default();
        let rewrite = RewriteSettings {
            default_max_attempts: env_or("DEFAULT_MAX_ATTEMPTS", defaults.default_max_attempts)?,
            max_attempts_limit: env_or("MAX_ATTEMPTS_LIMIT", defaults.max_attempts_limit)?,
            default_mode: env_parse("DEFAULT_MODE", defaults.default_mode, |raw| {
                raw.parse::<Mode>().map_err(anyhow::Error::from)
            })?,
            thresholds: SimilarityThresholds {
                strict: env_or("SIMILARITY_THRESHOLD_STRICT", defaults.thresholds.strict)?,
                balanced: env_or("SIMILARITY_THRESHOLD_BALANCED", defaults.thresholds.balanced)?,
            },
            max_input_chars: env_or("MAX_INPUT_CHARS", defaults.max_input_chars)?,
            fallback: env_parse("FALLBACK_POLICY", defaults.fallback, FallbackPolicy::parse)?,
            target_bias: env_or("TARGET_BIAS", defaults.target_bias)?,
            attempt_timeout: Duration::from_secs(env_or(
                "ATTEMPT_TIMEOUT_SECS",
                defaults.attempt_timeout.as_secs(),
            )?),
            request_timeout: Duration::from_secs(env_or(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            token_rules: TokenRules {
                min_technical_term_chars: env_or(
                    "MIN_TECHNICAL_TERM_CHARS",
                    defaults.token_rules.min_technical_term_chars,
                )?,
                flag_new_entities: env_or(
                    "FLAG_NEW_ENTITIES",
                    defaults.token_rules.flag_new_entities,
                )?,
                ..defaults.token_rules
            },
        };
        rewrite.validate()?;

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            default_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| crate::llm_client::catalog::DEFAULT_MODEL.to_string()),
            embedding_model: std::env::var("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            llm_http_timeout: Duration::from_secs(env_or("LLM_HTTP_TIMEOUT_SECS", 60u64)?),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            rewrite,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestration settings
// ────────────────────────────────────────────────────────────────────────────

/// What to return when the attempt budget runs out without an accepted candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Return the best in-range, hard-rule-passing candidate as BEST_EFFORT.
    BestCandidate,
    /// Always return REJECTED with the original text unchanged.
    Fail,
}

impl FallbackPolicy {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "best_candidate" | "best-candidate" => Ok(FallbackPolicy::BestCandidate),
            "fail" => Ok(FallbackPolicy::Fail),
            other => bail!("unknown fallback policy '{other}' (expected best_candidate or fail)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityThresholds {
    pub strict: f32,
    pub balanced: f32,
}

impl SimilarityThresholds {
    pub fn for_mode(&self, mode: Mode) -> f32 {
        match mode {
            Mode::Strict => self.strict,
            Mode::Balanced => self.balanced,
        }
    }
}

/// Heuristic knobs for critical-token extraction and the new-facts check.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRules {
    /// Lowercase words at least this long are treated as technical terms.
    pub min_technical_term_chars: usize,
    pub flag_new_entities: bool,
    /// Phrases that introduce external claims. Lowercase.
    pub new_claim_markers: Vec<String>,
    /// Long everyday words that never count as technical terms. Lowercase.
    pub common_words: Vec<String>,
}

impl Default for TokenRules {
    fn default() -> Self {
        Self {
            min_technical_term_chars: 12,
            flag_new_entities: true,
            new_claim_markers: [
                "según estudios",
                "estudios recientes",
                "se ha demostrado",
                "los expertos afirman",
                "studies show",
                "research shows",
                "according to experts",
                "it has been proven",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            common_words: [
                "aproximadamente",
                "anteriormente",
                "característica",
                "características",
                "completamente",
                "considerablemente",
                "constantemente",
                "correspondiente",
                "correspondientes",
                "directamente",
                "especialmente",
                "frecuentemente",
                "generalmente",
                "independientemente",
                "inmediatamente",
                "necesariamente",
                "particularmente",
                "posteriormente",
                "principalmente",
                "relativamente",
                "respectivamente",
                "significativamente",
                "simultáneamente",
                "approximately",
                "characteristic",
                "characteristics",
                "considerably",
                "corresponding",
                "particularly",
                "respectively",
                "significantly",
                "specifically",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Immutable settings handed to the orchestrator at construction.
#[derive(Debug, Clone)]
pub struct RewriteSettings {
    pub default_max_attempts: u32,
    pub max_attempts_limit: u32,
    pub default_mode: Mode,
    pub thresholds: SimilarityThresholds,
    pub max_input_chars: usize,
    pub fallback: FallbackPolicy,
    /// Fraction of the range span the target sits away from the nearest bound.
    pub target_bias: f32,
    pub attempt_timeout: Duration,
    pub request_timeout: Duration,
    pub token_rules: TokenRules,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            default_max_attempts: 5,
            max_attempts_limit: 10,
            default_mode: Mode::Balanced,
            thresholds: SimilarityThresholds {
                strict: 0.85,
                balanced: 0.75,
            },
            max_input_chars: 5000,
            fallback: FallbackPolicy::BestCandidate,
            target_bias: 0.4,
            attempt_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(240),
            token_rules: TokenRules::default(),
        }
    }
}

impl RewriteSettings {
    pub fn validate(&self) -> Result<()> {
        if self.default_max_attempts == 0 {
            bail!("DEFAULT_MAX_ATTEMPTS must be at least 1");
        }
        if self.max_attempts_limit < self.default_max_attempts {
            bail!(
                "MAX_ATTEMPTS_LIMIT ({}) must be >= DEFAULT_MAX_ATTEMPTS ({})",
                self.max_attempts_limit,
                self.default_max_attempts
            );
        }
        for (name, value) in [
            ("SIMILARITY_THRESHOLD_STRICT", self.thresholds.strict),
            ("SIMILARITY_THRESHOLD_BALANCED", self.thresholds.balanced),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1] (got {value})");
            }
        }
        if self.max_input_chars == 0 {
            bail!("MAX_INPUT_CHARS must be positive");
        }
        if !(self.target_bias > 0.0 && self.target_bias <= 0.5) {
            bail!("TARGET_BIAS must be within (0, 0.5] (got {})", self.target_bias);
        }
        if self.attempt_timeout.is_zero() || self.request_timeout.is_zero() {
            bail!("ATTEMPT_TIMEOUT_SECS and REQUEST_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Env helpers
// ────────────────────────────────────────────────────────────────────────────

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_parse(key, default, |raw| raw.trim().parse::<T>().map_err(anyhow::Error::from))
}

fn env_parse<T>(key: &str, default: T, parse: impl FnOnce(&str) -> Result<T>) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => parse(&raw).with_context(|| format!("Invalid value for '{key}': {raw:?}")),
        Err(_) => Ok(default),
    }
}
