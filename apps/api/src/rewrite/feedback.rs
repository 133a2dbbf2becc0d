//! Retry feedback: turns the previous attempt's outcome into an exact instruction.
//!
//! Pure formatting: no I/O, no loop state. The delta is always numeric and exact;
//! "make it a bit longer" is never sent.

use crate::rewrite::models::{AttemptRecord, AttemptStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackIssue {
    /// Outside the word range.
    Length,
    /// Broke a hard rule; carries the rule's reason.
    Fidelity(String),
    /// Below the similarity threshold.
    Meaning { score: f32, threshold: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryFeedback {
    pub previous_word_count: u32,
    pub target_words: u32,
    pub delta: i64,
    pub issue: FeedbackIssue,
}

impl RetryFeedback {
    pub fn render(&self) -> String {
        let mut out = format!(
            "Your previous version had {} words and the target is {}. {}",
            self.previous_word_count,
            self.target_words,
            length_instruction(self.delta, self.target_words)
        );

        match &self.issue {
            FeedbackIssue::Length => {}
            FeedbackIssue::Fidelity(reason) => {
                out.push_str(&format!(
                    " It was rejected for fidelity: {reason}. Be more literal and restore \
                     fidelity to the original."
                ));
            }
            FeedbackIssue::Meaning { score, threshold } => {
                out.push_str(&format!(
                    " Its meaning drifted from the original (similarity {score:.2}, minimum \
                     {threshold:.2}). Stay closer to the original wording."
                ));
            }
        }

        out
    }
}

fn length_instruction(delta: i64, target: u32) -> String {
    let k = delta.unsigned_abs();
    let words = if k == 1 { "word" } else { "words" };
    match delta.signum() {
        -1 => format!("It is missing {k} {words}: add exactly {k} {words}."),
        1 => format!("It is {k} {words} over: remove exactly {k} {words}."),
        _ => format!("Its length was right: keep it at {target} words."),
    }
}

/// Feedback for the next attempt, or `None` when the previous attempt says nothing
/// new about the text (generation or similarity backend failure) and the prior
/// feedback should be kept.
pub fn feedback_for(record: &AttemptRecord, target_words: u32, threshold: f32) -> Option<RetryFeedback> {
    let (word_count, delta) = (record.word_count?, record.delta?);

    let issue = match record.status {
        AttemptStatus::OutOfRange => FeedbackIssue::Length,
        AttemptStatus::RejectedByHardRules => FeedbackIssue::Fidelity(
            record
                .rejection_reason
                .clone()
                .unwrap_or_else(|| "a critical detail changed".to_string()),
        ),
        AttemptStatus::RejectedBySemanticSimilarity => FeedbackIssue::Meaning {
            score: record.similarity_score?,
            threshold,
        },
        AttemptStatus::GenerationFailed
        | AttemptStatus::SimilarityUnavailable
        | AttemptStatus::Accepted => return None,
    };

    Some(RetryFeedback {
        previous_word_count: word_count,
        target_words,
        delta,
        issue,
    })
}
