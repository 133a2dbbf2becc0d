//! Rewrite orchestrator: the bounded attempt loop.
//!
//! Flow per request:
//!   count words → already in range? return unchanged
//!   → compute target → extract critical tokens
//!   → loop: generate → count → hard rules → semantic gate → accept / retry
//!   → budget or deadline exhausted: apply the fallback policy.
//!
//! Invariants:
//! - Never more than `max_attempts` generation calls; attempts are numbered 1..=n with no gaps.
//! - A candidate that failed the hard rules is never returned.
//! - A `REJECTED` or `CANCELLED` outcome always carries the original text.
//! - No generation call starts after cancellation has been observed.

use std::sync::Arc;

use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{FallbackPolicy, RewriteSettings};
use crate::rewrite::critical_tokens::CriticalTokenSet;
use crate::rewrite::feedback::{feedback_for, RetryFeedback};
use crate::rewrite::hard_rules::{HardRuleVerdict, HardRulesValidator};
use crate::rewrite::models::{
    AttemptRecord, AttemptStatus, OutcomeStatus, RewriteOutcome, RewriteRequest,
};
use crate::rewrite::rewriter::{GenerationRequest, Rewriter};
use crate::rewrite::semantic::{Embedder, SemanticValidator};
use crate::rewrite::word_counter;

pub struct RewriteOrchestrator {
    rewriter: Arc<dyn Rewriter>,
    semantic: SemanticValidator,
    hard_rules: HardRulesValidator,
    settings: RewriteSettings,
}

/// Why the loop stopped without an accepted candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopCause {
    BudgetExhausted,
    DeadlineReached,
}

/// Mutable state of one run. Lives only inside `run`.
struct RunState<'a> {
    request: &'a RewriteRequest,
    original_word_count: u32,
    target_words: u32,
    attempts: Vec<AttemptRecord>,
    /// Index into `attempts` of the highest-scoring in-range, hard-rule-passing candidate.
    best: Option<usize>,
    feedback: Option<RetryFeedback>,
}

impl<'a> RunState<'a> {
    fn next_attempt_number(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }

    fn record(&mut self, record: AttemptRecord, threshold: f32) {
        info!(
            attempt = record.attempt_number,
            word_count = ?record.word_count,
            delta = ?record.delta,
            status = record.status.as_str(),
            similarity = ?record.similarity_score,
            "attempt resolved"
        );

        if let Some(feedback) = feedback_for(&record, self.target_words, threshold) {
            self.feedback = Some(feedback);
        }

        if record.status == AttemptStatus::RejectedBySemanticSimilarity {
            let score = record.similarity_score.unwrap_or(0.0);
            let beats_best = match self.best {
                Some(i) => score > self.attempts[i].similarity_score.unwrap_or(0.0),
                None => true,
            };
            if beats_best {
                self.best = Some(self.attempts.len());
            }
        }

        self.attempts.push(record);
    }

    fn outcome(
        self,
        status: OutcomeStatus,
        final_text: String,
        validation_reason: String,
        error: Option<String>,
    ) -> RewriteOutcome {
        let final_word_count = word_counter::count(&final_text);
        RewriteOutcome {
            session_id: self.request.session_id.clone(),
            original_text: self.request.text.clone(),
            original_word_count: self.original_word_count,
            final_text,
            final_word_count,
            target_words: Some(self.target_words),
            mode: self.request.mode,
            model: self.request.model.clone(),
            status,
            total_attempts: self.attempts.len() as u32,
            validation_reason,
            attempts: self.attempts,
            error,
        }
    }

    fn cancelled(self) -> RewriteOutcome {
        let reason = format!(
            "Rewrite cancelled after {} completed attempt(s); original text returned.",
            self.attempts.len()
        );
        let original = self.request.text.clone();
        self.outcome(OutcomeStatus::Cancelled, original, reason, None)
    }
}

/// Result of one attempt from the loop's point of view.
enum Step {
    Continue,
    Accepted { text: String, reason: String },
    Cancelled,
    Fatal(String),
}

impl RewriteOrchestrator {
    pub fn new(
        rewriter: Arc<dyn Rewriter>,
        embedder: Arc<dyn Embedder>,
        settings: RewriteSettings,
    ) -> Self {
        Self {
            rewriter,
            semantic: SemanticValidator::new(embedder, settings.thresholds),
            hard_rules: HardRulesValidator::new(settings.token_rules.clone()),
            settings,
        }
    }

    pub fn settings(&self) -> &RewriteSettings {
        &self.settings
    }

    /// Runs one request to a single terminal outcome. Never fails: every collaborator
    /// error ends up in the attempt history or the outcome's reason.
    pub async fn run(&self, request: &RewriteRequest, cancel: &CancellationToken) -> RewriteOutcome {
        let span = info_span!("rewrite", session = %request.session_id, mode = %request.mode);
        let outcome = self.run_inner(request, cancel).instrument(span).await;

        let usage = outcome.token_usage().unwrap_or_default();
        info!(
            target: "rewrite::audit",
            session = %outcome.session_id,
            status = outcome.status.as_str(),
            attempts = outcome.total_attempts,
            original_words = outcome.original_word_count,
            final_words = outcome.final_word_count,
            target_words = ?outcome.target_words,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "rewrite finished"
        );

        outcome
    }

    async fn run_inner(&self, request: &RewriteRequest, cancel: &CancellationToken) -> RewriteOutcome {
        let request_deadline = Instant::now() + self.settings.request_timeout;
        let original_word_count = word_counter::count(&request.text);

        if request.in_range(original_word_count) {
            info!(words = original_word_count, "original already within range");
            return RewriteOutcome {
                session_id: request.session_id.clone(),
                original_text: request.text.clone(),
                original_word_count,
                final_text: request.text.clone(),
                final_word_count: original_word_count,
                target_words: None,
                mode: request.mode,
                model: request.model.clone(),
                status: OutcomeStatus::Accepted,
                total_attempts: 0,
                validation_reason: format!(
                    "The original text already has {original_word_count} words, within [{}, {}]. \
                     No rewrite needed.",
                    request.min_words, request.max_words
                ),
                attempts: Vec::new(),
                error: None,
            };
        }

        let target_words = word_counter::target_words(
            original_word_count,
            request.min_words,
            request.max_words,
            self.settings.target_bias,
        );
        let critical = CriticalTokenSet::extract(&request.text, &self.settings.token_rules);
        info!(
            words = original_word_count,
            min = request.min_words,
            max = request.max_words,
            target = target_words,
            critical_tokens = critical.len(),
            "rewrite needed"
        );

        let mut run = RunState {
            request,
            original_word_count,
            target_words,
            attempts: Vec::with_capacity(request.max_attempts as usize),
            best: None,
            feedback: None,
        };

        let mut stop = StopCause::BudgetExhausted;

        while run.next_attempt_number() <= request.max_attempts {
            if cancel.is_cancelled() {
                return run.cancelled();
            }

            let now = Instant::now();
            if now >= request_deadline {
                warn!(attempts = run.attempts.len(), "request deadline reached");
                stop = StopCause::DeadlineReached;
                break;
            }
            let attempt_deadline = (now + self.settings.attempt_timeout).min(request_deadline);

            match self.attempt(&mut run, &critical, attempt_deadline, cancel).await {
                Step::Continue => {}
                Step::Accepted { text, reason } => {
                    return run.outcome(OutcomeStatus::Accepted, text, reason, None);
                }
                Step::Cancelled => return run.cancelled(),
                Step::Fatal(message) => {
                    warn!(error = %message, "generation backend failed permanently");
                    let reason = format!(
                        "Generation backend failed permanently on attempt {}; original text returned.",
                        run.attempts.len()
                    );
                    return run.outcome(
                        OutcomeStatus::Rejected,
                        request.text.clone(),
                        reason,
                        Some(message),
                    );
                }
            }
        }

        self.fallback(run, stop)
    }

    /// Runs one attempt and records it. Returns without recording when cancelled.
    async fn attempt(
        &self,
        run: &mut RunState<'_>,
        critical: &CriticalTokenSet,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Step {
        let request = run.request;
        let attempt_number = run.next_attempt_number();
        let threshold = self.semantic.threshold(request.mode);

        let mut record = AttemptRecord {
            attempt_number,
            proposed_text: String::new(),
            word_count: None,
            delta: None,
            status: AttemptStatus::GenerationFailed,
            similarity_score: None,
            usage: None,
            rejection_reason: None,
            error_message: None,
        };

        // ── generate ────────────────────────────────────────────────────────
        let generation_request = GenerationRequest {
            original: &request.text,
            original_word_count: run.original_word_count,
            min_words: request.min_words,
            max_words: request.max_words,
            target_words: run.target_words,
            mode: request.mode,
            critical_tokens: critical,
            feedback: run.feedback.as_ref(),
            model: request.model.as_deref(),
        };

        debug!(attempt = attempt_number, feedback = run.feedback.is_some(), "generating");
        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Cancelled,
            res = timeout_at(deadline, self.rewriter.rewrite(&generation_request)) => res,
        };

        let generation = match generated {
            Ok(Ok(generation)) => generation,
            Ok(Err(e)) => {
                record.error_message = Some(e.to_string());
                run.record(record, threshold);
                if e.is_fatal() {
                    return Step::Fatal(e.to_string());
                }
                return Step::Continue;
            }
            Err(_) => {
                record.error_message =
                    Some("generation did not finish before the attempt deadline".to_string());
                run.record(record, threshold);
                return Step::Continue;
            }
        };

        let word_count = word_counter::count(&generation.text);
        record.proposed_text = generation.text;
        record.usage = generation.usage;
        record.word_count = Some(word_count);
        record.delta = Some(word_counter::delta(word_count, run.target_words));

        // ── length ──────────────────────────────────────────────────────────
        if !request.in_range(word_count) {
            record.status = AttemptStatus::OutOfRange;
            record.rejection_reason = Some(format!(
                "{word_count} words, outside [{}, {}]",
                request.min_words, request.max_words
            ));
            run.record(record, threshold);
            return Step::Continue;
        }

        // ── hard rules ──────────────────────────────────────────────────────
        if let HardRuleVerdict::Fail(violation) =
            self.hard_rules
                .validate(&request.text, &record.proposed_text, critical)
        {
            record.status = AttemptStatus::RejectedByHardRules;
            record.rejection_reason = Some(violation.to_string());
            run.record(record, threshold);
            return Step::Continue;
        }

        // ── semantic gate ───────────────────────────────────────────────────
        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Cancelled,
            res = timeout_at(
                deadline,
                self.semantic.validate(&request.text, &record.proposed_text, request.mode),
            ) => res,
        };

        match verdict {
            Ok(Ok(v)) => {
                record.similarity_score = Some(v.score);
                if v.passed {
                    let reason = format!(
                        "Attempt {attempt_number} accepted: {word_count} words (target {}), \
                         similarity {:.3} >= {:.3}.",
                        run.target_words, v.score, v.threshold
                    );
                    let text = record.proposed_text.clone();
                    record.status = AttemptStatus::Accepted;
                    run.record(record, threshold);
                    return Step::Accepted { text, reason };
                }
                record.status = AttemptStatus::RejectedBySemanticSimilarity;
                record.rejection_reason = Some(format!(
                    "similarity {:.3} below threshold {:.3}",
                    v.score, v.threshold
                ));
            }
            Ok(Err(e)) => {
                record.status = AttemptStatus::SimilarityUnavailable;
                record.error_message = Some(e.to_string());
            }
            Err(_) => {
                record.status = AttemptStatus::SimilarityUnavailable;
                record.error_message =
                    Some("similarity check did not finish before the attempt deadline".to_string());
            }
        }

        run.record(record, threshold);
        Step::Continue
    }

    /// Resolves a run that ended without an accepted candidate.
    fn fallback(&self, run: RunState<'_>, stop: StopCause) -> RewriteOutcome {
        let threshold = self.semantic.threshold(run.request.mode);

        let stopped = match stop {
            StopCause::BudgetExhausted => format!(
                "Attempt budget of {} exhausted without an accepted rewrite",
                run.request.max_attempts
            ),
            StopCause::DeadlineReached => format!(
                "Request deadline reached after {} attempt(s) without an accepted rewrite",
                run.attempts.len()
            ),
        };

        if let Some(best) = run.best.map(|i| run.attempts[i].clone()) {
            let score = best.similarity_score.unwrap_or_default();
            return match self.settings.fallback {
                FallbackPolicy::BestCandidate => {
                    let reason = format!(
                        "{stopped}. Similarity threshold {threshold:.3} was not met; returning \
                         attempt {} ({} words, similarity {score:.3}) as best effort.",
                        best.attempt_number,
                        best.word_count.unwrap_or_default(),
                    );
                    run.outcome(OutcomeStatus::BestEffort, best.proposed_text, reason, None)
                }
                FallbackPolicy::Fail => {
                    let reason = format!(
                        "{stopped}. Best similarity {score:.3} was below threshold {threshold:.3} \
                         and the fallback policy is fail; original text returned."
                    );
                    let original = run.request.text.clone();
                    run.outcome(OutcomeStatus::Rejected, original, reason, None)
                }
            };
        }

        let count = |status: AttemptStatus| run.attempts.iter().filter(|a| a.status == status).count();
        let unavailable = count(AttemptStatus::SimilarityUnavailable);
        let failed = count(AttemptStatus::GenerationFailed);

        let detail = if unavailable > 0 {
            format!(
                "The semantic validator was unavailable: similarity could not be computed for \
                 {unavailable} in-range candidate(s) that passed the hard rules"
            )
        } else if failed == run.attempts.len() && failed > 0 {
            "Generation failed on every attempt".to_string()
        } else {
            "No in-range candidate passed the hard rules".to_string()
        };

        let error = if failed == run.attempts.len() {
            run.attempts.last().and_then(|a| a.error_message.clone())
        } else {
            None
        };

        let reason = format!("{stopped}. {detail}; original text returned.");
        let original = run.request.text.clone();
        run.outcome(OutcomeStatus::Rejected, original, reason, error)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::rewrite::feedback::FeedbackIssue;
    use crate::rewrite::models::Mode;
    use crate::rewrite::rewriter::GenerationError;
    use crate::rewrite::testing::{
        filler, padded, CancellingRewriter, FailingEmbedder, HangingEmbedder, ScriptedEmbedder,
        ScriptedRewriter, SlowRewriter, TRIANGLE,
    };

    fn request(text: &str, min: u32, max: u32, max_attempts: u32) -> RewriteRequest {
        RewriteRequest {
            text: text.to_string(),
            min_words: min,
            max_words: max,
            mode: Mode::Balanced,
            max_attempts,
            model: None,
            session_id: "test0001".to_string(),
        }
    }

    fn orchestrator(
        rewriter: Arc<dyn Rewriter>,
        embedder: Arc<dyn Embedder>,
        settings: RewriteSettings,
    ) -> RewriteOrchestrator {
        RewriteOrchestrator::new(rewriter, embedder, settings)
    }

    fn statuses(outcome: &RewriteOutcome) -> Vec<AttemptStatus> {
        outcome.attempts.iter().map(|a| a.status).collect()
    }

    #[tokio::test]
    async fn test_in_range_original_returned_without_calls() {
        let rewriter = Arc::new(ScriptedRewriter::always(filler(5)));
        let orch = orchestrator(
            rewriter.clone(),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );

        let outcome = orch
            .run(&request(TRIANGLE, 5, 10, 3), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Accepted);
        assert_eq!(outcome.total_attempts, 0);
        assert!(outcome.attempts.is_empty());
        assert_eq!(outcome.final_text, TRIANGLE);
        assert_eq!(outcome.final_word_count, 9);
        assert_eq!(outcome.target_words, None);
        assert_eq!(rewriter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_original_expanded_on_first_attempt() {
        let candidate = padded(TRIANGLE, 24);
        let rewriter = Arc::new(ScriptedRewriter::always(candidate.clone()));
        let orch = orchestrator(
            rewriter.clone(),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );

        let mut req = request(TRIANGLE, 20, 30, 5);
        req.mode = Mode::Strict;
        let outcome = orch.run(&req, &CancellationToken::new()).await;

        assert_eq!(outcome.status, OutcomeStatus::Accepted);
        assert!(outcome.is_success());
        assert_eq!(outcome.final_text, candidate);
        assert_eq!(outcome.final_word_count, 24);
        assert_eq!(outcome.original_word_count, 9);
        assert_eq!(outcome.target_words, Some(24));
        assert_eq!(outcome.total_attempts, 1);
        assert_eq!(outcome.token_usage().unwrap().total_tokens, 100);

        let calls = rewriter.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target_words, 24);
        assert!(calls[0].feedback.is_none());
    }

    #[tokio::test]
    async fn test_persistently_short_output_exhausts_budget() {
        let rewriter = Arc::new(ScriptedRewriter::always(filler(15)));
        let orch = orchestrator(
            rewriter.clone(),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 4), &CancellationToken::new())
            .await;

        assert_eq!(outcome.total_attempts, 4);
        assert_eq!(rewriter.call_count(), 4);
        assert_eq!(statuses(&outcome), vec![AttemptStatus::OutOfRange; 4]);
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(outcome.final_text, TRIANGLE);
        assert!(outcome.validation_reason.contains("budget of 4 exhausted"));
        assert!(outcome.validation_reason.contains("No in-range candidate"));

        let second = &rewriter.calls()[1];
        let feedback = second.feedback.as_ref().unwrap();
        assert_eq!(feedback.delta, -9);
        assert!(feedback.render().contains("missing 9 words"));
    }

    #[tokio::test]
    async fn test_dropped_number_fails_hard_rules_despite_similarity() {
        let candidate = padded("El área del triángulo es cuarenta cm² según Pitágoras.", 24);
        let rewriter = Arc::new(ScriptedRewriter::always(candidate));
        let orch = orchestrator(
            rewriter,
            Arc::new(ScriptedEmbedder::new(TRIANGLE).with_default_score(1.0)),
            RewriteSettings::default(),
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 2), &CancellationToken::new())
            .await;

        assert_eq!(statuses(&outcome), vec![AttemptStatus::RejectedByHardRules; 2]);
        assert!(outcome.attempts[0]
            .rejection_reason
            .as_deref()
            .unwrap()
            .contains("\"45\""));
        assert!(outcome.attempts.iter().all(|a| a.similarity_score.is_none()));
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(outcome.final_text, TRIANGLE);
    }

    #[tokio::test]
    async fn test_unavailable_validator_is_distinguished_from_low_similarity() {
        let rewriter = Arc::new(ScriptedRewriter::new(vec![
            Ok(filler(10)),
            Ok(padded(TRIANGLE, 24)),
        ]));
        let orch = orchestrator(
            rewriter.clone(),
            Arc::new(FailingEmbedder),
            RewriteSettings::default(),
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 3), &CancellationToken::new())
            .await;

        assert_eq!(
            statuses(&outcome),
            vec![
                AttemptStatus::OutOfRange,
                AttemptStatus::SimilarityUnavailable,
                AttemptStatus::SimilarityUnavailable,
            ]
        );
        assert!(outcome.attempts[1].similarity_score.is_none());
        assert!(outcome.attempts[1].error_message.is_some());
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert!(outcome.validation_reason.contains("semantic validator was unavailable"));
        assert!(!outcome.validation_reason.contains("below threshold"));

        // unavailable similarity says nothing new, so the length feedback is kept
        let calls = rewriter.calls();
        assert_eq!(calls[1].feedback, calls[2].feedback);
        assert_eq!(calls[2].feedback.as_ref().unwrap().issue, FeedbackIssue::Length);
    }

    #[tokio::test]
    async fn test_best_scoring_candidate_returned_as_best_effort() {
        let (a, b, c) = (padded(TRIANGLE, 24), padded(TRIANGLE, 25), padded(TRIANGLE, 26));
        let rewriter = Arc::new(ScriptedRewriter::new(vec![
            Ok(a.clone()),
            Ok(b.clone()),
            Ok(c.clone()),
        ]));
        let embedder = ScriptedEmbedder::new(TRIANGLE)
            .with_score(a, 0.60)
            .with_score(b.clone(), 0.70)
            .with_score(c, 0.65);
        let orch = orchestrator(rewriter, Arc::new(embedder), RewriteSettings::default());

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 3), &CancellationToken::new())
            .await;

        assert_eq!(
            statuses(&outcome),
            vec![AttemptStatus::RejectedBySemanticSimilarity; 3]
        );
        assert_eq!(outcome.status, OutcomeStatus::BestEffort);
        assert_eq!(outcome.final_text, b);
        assert_eq!(outcome.final_word_count, 25);
        assert!(outcome.validation_reason.contains("returning attempt 2"));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_fail_policy_returns_original() {
        let candidate = padded(TRIANGLE, 24);
        let rewriter = Arc::new(ScriptedRewriter::always(candidate));
        let settings = RewriteSettings {
            fallback: FallbackPolicy::Fail,
            ..RewriteSettings::default()
        };
        let orch = orchestrator(
            rewriter,
            Arc::new(ScriptedEmbedder::new(TRIANGLE).with_default_score(0.5)),
            settings,
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 2), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(outcome.final_text, TRIANGLE);
        assert!(outcome.validation_reason.contains("fallback policy is fail"));
    }

    #[tokio::test]
    async fn test_semantic_feedback_reaches_next_attempt() {
        let (a, b) = (padded(TRIANGLE, 24), padded(TRIANGLE, 25));
        let rewriter = Arc::new(ScriptedRewriter::new(vec![Ok(a.clone()), Ok(b)]));
        let embedder = ScriptedEmbedder::new(TRIANGLE).with_score(a, 0.5);
        let orch = orchestrator(rewriter.clone(), Arc::new(embedder), RewriteSettings::default());

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 5), &CancellationToken::new())
            .await;

        assert_eq!(outcome.status, OutcomeStatus::Accepted);
        assert_eq!(outcome.total_attempts, 2);
        assert_eq!(rewriter.call_count(), 2);

        let feedback = rewriter.calls()[1].feedback.clone().unwrap();
        assert!(matches!(feedback.issue, FeedbackIssue::Meaning { .. }));
        assert_eq!(feedback.delta, 0);
    }

    #[tokio::test]
    async fn test_attempts_numbered_contiguously() {
        let dropped_number = padded("El área del triángulo es cm² según Pitágoras.", 24);
        let faithful = padded(TRIANGLE, 24);
        let rewriter = Arc::new(ScriptedRewriter::new(vec![
            Err(GenerationError::Transient("rate limited".into())),
            Ok(filler(40)),
            Ok(dropped_number.clone()),
            Ok(faithful.clone()),
        ]));
        let embedder = ScriptedEmbedder::new(TRIANGLE)
            .with_score(dropped_number.clone(), 0.99)
            .with_default_score(0.5);
        let orch = orchestrator(rewriter, Arc::new(embedder), RewriteSettings::default());

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 4), &CancellationToken::new())
            .await;

        let numbers: Vec<u32> = outcome.attempts.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(
            statuses(&outcome),
            vec![
                AttemptStatus::GenerationFailed,
                AttemptStatus::OutOfRange,
                AttemptStatus::RejectedByHardRules,
                AttemptStatus::RejectedBySemanticSimilarity,
            ]
        );
        assert_eq!(outcome.status, OutcomeStatus::BestEffort);
        assert_eq!(outcome.final_text, faithful);
        assert_ne!(outcome.final_text, dropped_number);
        assert!(outcome.validation_reason.contains("returning attempt 4"));
    }

    #[tokio::test]
    async fn test_transient_failures_never_exceed_budget() {
        let rewriter = Arc::new(ScriptedRewriter::failing(GenerationError::Transient(
            "upstream 503".into(),
        )));
        let orch = orchestrator(
            rewriter.clone(),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 3), &CancellationToken::new())
            .await;

        assert_eq!(rewriter.call_count(), 3);
        assert_eq!(statuses(&outcome), vec![AttemptStatus::GenerationFailed; 3]);
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert!(outcome.validation_reason.contains("Generation failed on every attempt"));
        assert_eq!(outcome.error.as_deref(), Some("upstream 503"));
    }

    #[tokio::test]
    async fn test_fatal_generation_error_aborts_immediately() {
        let rewriter = Arc::new(ScriptedRewriter::failing(GenerationError::Fatal(
            "invalid api key".into(),
        )));
        let orch = orchestrator(
            rewriter.clone(),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 5), &CancellationToken::new())
            .await;

        assert_eq!(rewriter.call_count(), 1);
        assert_eq!(outcome.total_attempts, 1);
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(outcome.final_text, TRIANGLE);
        assert_eq!(outcome.error.as_deref(), Some("invalid api key"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let rewriter = Arc::new(ScriptedRewriter::always(padded(TRIANGLE, 24)));
        let orch = orchestrator(
            rewriter.clone(),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = orch.run(&request(TRIANGLE, 20, 30, 5), &cancel).await;

        assert_eq!(outcome.status, OutcomeStatus::Cancelled);
        assert_eq!(outcome.total_attempts, 0);
        assert_eq!(outcome.final_text, TRIANGLE);
        assert_eq!(rewriter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_in_flight_generation() {
        let cancel = CancellationToken::new();
        let orch = orchestrator(
            Arc::new(CancellingRewriter {
                token: cancel.clone(),
            }),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );

        let outcome = orch.run(&request(TRIANGLE, 20, 30, 5), &cancel).await;

        assert_eq!(outcome.status, OutcomeStatus::Cancelled);
        assert!(outcome.attempts.is_empty());
        assert_eq!(outcome.final_text, TRIANGLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_generation_times_out_per_attempt() {
        let orch = orchestrator(
            Arc::new(SlowRewriter {
                delay: Duration::from_secs(120),
                text: padded(TRIANGLE, 24),
            }),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 2), &CancellationToken::new())
            .await;

        assert_eq!(statuses(&outcome), vec![AttemptStatus::GenerationFailed; 2]);
        assert!(outcome.attempts[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("deadline"));
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_deadline_stops_loop_and_applies_fallback() {
        let settings = RewriteSettings {
            request_timeout: Duration::from_secs(120),
            ..RewriteSettings::default()
        };
        let orch = orchestrator(
            Arc::new(SlowRewriter {
                delay: Duration::from_secs(50),
                text: padded(TRIANGLE, 24),
            }),
            Arc::new(ScriptedEmbedder::new(TRIANGLE).with_default_score(0.5)),
            settings,
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 5), &CancellationToken::new())
            .await;

        // 0-50s and 50-100s complete; the third attempt is cut at 120s
        assert_eq!(
            statuses(&outcome),
            vec![
                AttemptStatus::RejectedBySemanticSimilarity,
                AttemptStatus::RejectedBySemanticSimilarity,
                AttemptStatus::GenerationFailed,
            ]
        );
        assert_eq!(outcome.status, OutcomeStatus::BestEffort);
        assert!(outcome.validation_reason.contains("deadline reached after 3"));
        assert!(outcome.validation_reason.contains("returning attempt 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_similarity_timeout_is_unavailable_not_rejection() {
        let orch = orchestrator(
            Arc::new(ScriptedRewriter::always(padded(TRIANGLE, 24))),
            Arc::new(HangingEmbedder),
            RewriteSettings::default(),
        );

        let outcome = orch
            .run(&request(TRIANGLE, 20, 30, 1), &CancellationToken::new())
            .await;

        assert_eq!(statuses(&outcome), vec![AttemptStatus::SimilarityUnavailable]);
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert!(outcome.validation_reason.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_requested_model_forwarded() {
        let rewriter = Arc::new(ScriptedRewriter::always(padded(TRIANGLE, 24)));
        let orch = orchestrator(
            rewriter.clone(),
            Arc::new(ScriptedEmbedder::new(TRIANGLE)),
            RewriteSettings::default(),
        );
        let mut req = request(TRIANGLE, 20, 30, 1);
        req.model = Some("gpt-4o".to_string());

        let outcome = orch.run(&req, &CancellationToken::new()).await;

        assert_eq!(outcome.model.as_deref(), Some("gpt-4o"));
        assert_eq!(rewriter.calls()[0].model.as_deref(), Some("gpt-4o"));
    }
}
