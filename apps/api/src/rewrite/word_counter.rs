//! Word counting: the single source of truth for every length decision.
//!
//! A word is a whitespace-separated token containing at least one alphanumeric
//! character. Isolated punctuation ("—", "-", "…") does not count; hyphenated
//! compounds ("bien-estar") and numbers with units ("45cm²") count once.
//! The model's own idea of length is never trusted; everything goes through [`count`].

/// Counts words in `text` under the definition above.
pub fn count(text: &str) -> u32 {
    let words = text
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count();
    u32::try_from(words).unwrap_or(u32::MAX)
}

/// Signed distance from `target`: negative means words are missing.
pub fn delta(word_count: u32, target: u32) -> i64 {
    i64::from(word_count) - i64::from(target)
}

/// Picks the word count a rewrite should aim for.
///
/// Short originals aim `offset` words above `min`, long ones `offset` below `max`,
/// where `offset = round(span * bias)` kept within `[1, span - 1]` so the target
/// lands strictly inside the range whenever the range allows it.
pub fn target_words(original_count: u32, min: u32, max: u32, bias: f32) -> u32 {
    let span = max.saturating_sub(min);
    if span < 2 {
        return if original_count > max { max } else { min };
    }

    let offset = ((span as f32) * bias).round() as u32;
    let offset = offset.clamp(1, span - 1);

    if original_count > max {
        max - offset
    } else {
        min + offset
    }
}
