//! Token estimation for synthesized usage statistics.
//!
//! The backend's streaming mode does not report per-chunk usage, so the
//! adapter estimates it with the `cl100k_base` encoding (the tokenizer family
//! OpenAI clients expect). If the encoder cannot be built, a ~4 chars per
//! token heuristic is used instead.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoder() -> Option<&'static CoreBPE> {
    ENCODER
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!(error = %e, "cl100k_base unavailable, using char heuristic");
                None
            }
        })
        .as_ref()
}

/// Estimate how many tokens `text` would consume. Returns 0 for empty text.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    match encoder() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
        None => heuristic_tokens(text),
    }
}

fn heuristic_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(heuristic_tokens(""), 0);
    }

    #[test]
    fn non_empty_text_has_tokens() {
        assert!(estimate_tokens("Hello") >= 1);
        assert!(estimate_tokens("The quick brown fox jumps over the lazy dog.") >= 5);
    }

    #[test]
    fn estimate_is_deterministic() {
        let text = "2 + 2 = 4\n\nThis is a simple addition problem.";
        assert_eq!(estimate_tokens(text), estimate_tokens(text));
    }

    #[test]
    fn heuristic_rounds_up() {
        assert_eq!(heuristic_tokens("a"), 1);
        assert_eq!(heuristic_tokens("abcd"), 1);
        assert_eq!(heuristic_tokens("abcde"), 2);
    }
}
