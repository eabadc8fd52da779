//! Turns a thread into the single prompt text handed to a capability, and keeps
//! that text inside the configured size limits.

use crate::models::Thread;

pub const MESSAGE_DELIMITER: &str = "\n\n---\n\n";
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated due to length]";
pub const DEFAULT_TRUNCATION_RESERVE: usize = 100;

pub fn flatten(thread: &Thread) -> String {
    thread
        .messages
        .iter()
        .map(|message| {
            format!(
                "From: {}\n{}",
                message.sender_name.trim(),
                message.body.trim()
            )
        })
        .collect::<Vec<_>>()
        .join(MESSAGE_DELIMITER)
}

/// Characters of actual message text, ignoring sender headers and delimiters.
pub fn body_char_len(thread: &Thread) -> usize {
    thread
        .messages
        .iter()
        .map(|message| char_len(message.body.trim()))
        .sum()
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub fn estimate_tokens(char_count: usize, chars_per_token: usize) -> usize {
    char_count.div_ceil(chars_per_token.max(1))
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    truncate_with_reserve(text, max_chars, DEFAULT_TRUNCATION_RESERVE)
}

/// Keeps the longest run of whole sentences that fits in `max_chars - reserve`
/// and appends [`TRUNCATION_MARKER`].
///
/// The reserve never drops below the marker length, so the result is at most
/// `max_chars` long. A limit shorter than the marker itself yields the marker
/// clipped to the limit.
pub fn truncate_with_reserve(text: &str, max_chars: usize, reserve: usize) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }

    let marker_len = char_len(TRUNCATION_MARKER);
    if max_chars < marker_len {
        return TRUNCATION_MARKER.trim_start().chars().take(max_chars).collect();
    }

    let budget = max_chars.saturating_sub(reserve.max(marker_len));
    let kept = sentence_prefix(text, budget);
    if kept.is_empty() {
        return TRUNCATION_MARKER.trim_start().to_string();
    }

    let mut truncated = String::with_capacity(kept.len() + TRUNCATION_MARKER.len());
    truncated.push_str(kept);
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Longest prefix of `text` ending on a sentence terminator whose trimmed
/// length is at most `budget` chars.
fn sentence_prefix(text: &str, budget: usize) -> &str {
    let mut best_end = 0usize;
    let mut chars_seen = 0usize;

    for (byte_index, ch) in text.char_indices() {
        chars_seen += 1;
        if chars_seen > budget {
            break;
        }
        if matches!(ch, '.' | '!' | '?') {
            best_end = byte_index + ch.len_utf8();
        }
    }

    text[..best_end].trim()
}

#[cfg(test)]
mod tests {
    use super::{
        TRUNCATION_MARKER, body_char_len, char_len, estimate_tokens, flatten, truncate,
        truncate_with_reserve,
    };
    use crate::models::{Message, Thread};

    fn thread(messages: &[(&str, &str)]) -> Thread {
        Thread {
            subject: "Quarterly planning".to_string(),
            messages: messages
                .iter()
                .map(|(sender, body)| Message {
                    sender_name: (*sender).to_string(),
                    body: (*body).to_string(),
                    timestamp: None,
                })
                .collect(),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn flatten_preserves_message_order() {
        let flattened = flatten(&thread(&[
            ("Ana", "First message."),
            ("Ben", "Second message."),
        ]));

        assert_eq!(
            flattened,
            "From: Ana\nFirst message.\n\n---\n\nFrom: Ben\nSecond message."
        );
    }

    #[test]
    fn body_length_ignores_headers() {
        let thread = thread(&[("Ana", "  Twenty chars here. "), ("Ben", "Another twenty chars")]);
        assert_eq!(body_char_len(&thread), 38);
    }

    #[test]
    fn truncate_is_noop_within_limit() {
        let text = "Short text. Nothing to cut.";
        assert_eq!(truncate(text, 200), text);
    }

    #[test]
    fn truncate_keeps_whole_sentences_and_appends_marker() {
        let sentence = "This sentence has exactly enough words to matter. ";
        let text = sentence.repeat(20);

        let truncated = truncate(&text, 300);

        assert!(char_len(&truncated) <= 300);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        let body = truncated.trim_end_matches(TRUNCATION_MARKER);
        assert!(body.ends_with("matter."), "cut mid-sentence: {body:?}");
        assert!(char_len(body) <= 200);
    }

    #[test]
    fn truncate_without_any_fitting_sentence_still_marks() {
        let text = "a".repeat(1_000);
        let truncated = truncate(&text, 150);

        assert_eq!(truncated, TRUNCATION_MARKER.trim_start());
    }

    #[test]
    fn truncate_is_idempotent() {
        let inputs = [
            "One. Two! Three? ".repeat(40),
            "no terminators at all ".repeat(30),
            "Émoji ünïcode sentences 🎉. ".repeat(25),
            String::new(),
        ];

        for input in inputs {
            for limit in [0, 10, 35, 36, 80, 150, 400, 10_000] {
                let once = truncate(&input, limit);
                assert_eq!(truncate(&once, limit), once, "limit={limit}");
                assert!(
                    char_len(&once) <= limit || char_len(&input) <= limit,
                    "limit={limit} produced {} chars",
                    char_len(&once)
                );
            }
        }
    }

    #[test]
    fn tiny_limits_clip_the_marker() {
        let truncated = truncate_with_reserve(&"x".repeat(50), 5, 100);
        assert_eq!(char_len(&truncated), 5);
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(0, 4), 0);
        assert_eq!(estimate_tokens(1, 4), 1);
        assert_eq!(estimate_tokens(16_001, 4), 4_001);
    }
}
