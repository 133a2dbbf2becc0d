//! Word-count rewriting: bring a text into a word range without changing what it says.
//!
//! Pipeline per request (driven by `orchestrator`):
//!   word_counter → critical_tokens → rewriter → hard_rules → semantic → feedback
//!
//! `formatter` and `handlers` are presentation only.

pub mod critical_tokens;
pub mod feedback;
pub mod formatter;
pub mod handlers;
pub mod hard_rules;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod rewriter;
pub mod semantic;
pub mod word_counter;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::RewriteOrchestrator;
pub use rewriter::LlmRewriter;
pub use semantic::LlmEmbedder;
