//! LLM prompt constants for length adjustment.
//!
//! The model answers with plain text only; the rewriter strips stray fences or
//! quotes before the word counter sees it.

pub const REWRITE_SYSTEM: &str = "\
You are an editor of educational assessment items. You adjust the length of a \
multiple-choice question stem so it fits a word range, keeping its meaning exactly. \
You never add facts, never remove facts, and never answer the question.\n\
\n\
Respond with the rewritten text only. No explanations, no lists, no quotes, no markdown.";

/// Replace: {min_words}, {max_words}, {target_words}, {direction}, {mode_instruction},
///          {critical_tokens}, {original_text}, {feedback}
pub const REWRITE_PROMPT_TEMPLATE: &str = "\
Rewrite the following text so that it has between {min_words} and {max_words} words. \
Aim for exactly {target_words} words ({direction}).\n\
\n\
ORIGINAL TEXT:\n\
{original_text}\n\
\n\
RULES:\n\
1. Keep the same meaning, intent and difficulty.\n\
2. Do NOT add facts, examples, statistics, names or sources that are not in the original.\n\
3. Keep numbers, dates, percentages, units, proper nouns and acronyms exactly as written.\n\
4. Write in the same language as the original text.\n\
5. {mode_instruction}\n\
6. Keep these tokens verbatim: {critical_tokens}\n\
{feedback}\
\n\
Return ONLY the final text.";

pub const STRICT_INSTRUCTION: &str = "Be as literal as possible: change only what the length \
requires and reuse the original wording wherever you can.";

pub const BALANCED_INSTRUCTION: &str = "Balance fidelity and natural phrasing: you may \
rephrase, but every idea must come from the original.";

pub const EXPAND_DIRECTION: &str = "the original is too short: expand it";

pub const CONDENSE_DIRECTION: &str = "the original is too long: condense it";
