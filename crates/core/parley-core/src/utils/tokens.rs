//! Reference tokenizer profile used for context trimming
//!
//! Contexts are measured with one fixed profile regardless of the target
//! model. Text is pre-split like byte-pair tokenizers do (contractions, words
//! with their leading space, digit runs, punctuation runs, whitespace runs)
//! and each piece costs one token per four characters, at least one.

use regex::Regex;
use std::sync::OnceLock;

const CHARS_PER_TOKEN: usize = 4;

fn pre_tokenizer() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"'(?:s|t|re|ve|m|ll|d)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+")
            .expect("pre-tokenizer pattern is valid")
    })
}

fn piece_cost(piece: &str) -> usize {
    piece.chars().count().div_ceil(CHARS_PER_TOKEN).max(1)
}

/// Byte offsets where each piece starts, paired with its token cost
fn pieces(text: &str) -> Vec<(usize, usize)> {
    pre_tokenizer()
        .find_iter(text)
        .map(|m| (m.start(), piece_cost(m.as_str())))
        .collect()
}

/// Count tokens in `text` under the reference profile
pub fn count_tokens(text: &str) -> usize {
    pieces(text).iter().map(|(_, cost)| cost).sum()
}

/// Keep the trailing `max_tokens` tokens of `text`, dropping from the front.
///
/// The most recent context sits at the end of a prompt, so the oldest
/// material is discarded first.
pub fn trim_tokens(text: &str, max_tokens: usize) -> &str {
    let pieces = pieces(text);
    let mut total: usize = pieces.iter().map(|(_, cost)| cost).sum();
    if total <= max_tokens {
        return text;
    }

    for (start, cost) in &pieces {
        if total <= max_tokens {
            return &text[*start..];
        }
        total -= cost;
    }
    ""
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("hello"), 2);
        assert_eq!(count_tokens("hi there"), 3);
        assert_eq!(count_tokens("it's"), 2);
    }

    #[test]
    fn test_trim_tokens_noop_under_limit() {
        let text = "short context";
        assert_eq!(trim_tokens(text, 100), text);
    }

    #[test]
    fn test_trim_tokens_drops_from_front() {
        let text = "oldest middle newest";
        let trimmed = trim_tokens(text, 4);
        assert!(text.ends_with(trimmed));
        assert!(trimmed.ends_with("newest"));
        assert!(!trimmed.contains("oldest"));
        assert!(count_tokens(trimmed) <= 4);
    }

    #[test]
    fn test_trim_tokens_zero_budget() {
        assert_eq!(trim_tokens("anything at all", 0), "");
    }

    #[test]
    fn test_trim_tokens_multibyte_safe() {
        let text = "héllo wörld ünïcode façade";
        let trimmed = trim_tokens(text, 3);
        assert!(text.ends_with(trimmed));
    }
}
