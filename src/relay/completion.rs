//! Completion seam: one call per request, failures returned as data.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::relay::context::Prompt;
use crate::relay::message::truncate_chars;

/// Appended when an answer is cut to fit the character budget.
pub const TRUNCATION_NOTICE: &str = "\n\n… (truncated)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// Transport failure before a response arrived.
    Http(String),
    /// Provider returned an error status or error object.
    Api(String),
    /// Response body did not have the expected shape.
    Parse(String),
    /// Response contained no text.
    Empty,
    /// No answer within the configured timeout.
    Timeout(Duration),
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Api(e) => write!(f, "API error: {e}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Empty => write!(f, "Empty response"),
            Self::Timeout(d) => write!(f, "No answer within {}s", d.as_secs()),
        }
    }
}

impl std::error::Error for CompletionError {}

impl CompletionError {
    /// Text shown to the user in place of an answer.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(d) => format!(
                "⏳ No answer from Gemini after {}s. Tap regenerate to try again.",
                d.as_secs()
            ),
            other => format!("⚠️ Gemini Error: {other}"),
        }
    }
}

/// A text completion backend.
pub trait Completion: Send + Sync {
    fn complete(&self, prompt: &Prompt) -> impl Future<Output = Result<String, CompletionError>> + Send;
}

/// Cut `text` to `max_chars` characters (with a notice) and append `attribution`.
pub fn finalize_answer(text: &str, max_chars: usize, attribution: Option<&str>) -> String {
    let notice_chars = TRUNCATION_NOTICE.chars().count();
    let mut answer = if text.chars().count() <= max_chars {
        text.to_string()
    } else if max_chars <= notice_chars {
        // No room for the notice.
        truncate_chars(text, max_chars).to_string()
    } else {
        let budget = max_chars - notice_chars;
        format!("{}{}", truncate_chars(text, budget).trim_end(), TRUNCATION_NOTICE)
    };

    if let Some(attribution) = attribution {
        answer.push_str("\n\n");
        answer.push_str(attribution);
    }
    answer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_answer_untouched() {
        assert_eq!(finalize_answer("hello", 100, None), "hello");
    }

    #[test]
    fn test_long_answer_truncated_within_budget() {
        let text = "x".repeat(5000);
        let answer = finalize_answer(&text, 4000, None);
        assert!(answer.ends_with(TRUNCATION_NOTICE));
        assert_eq!(answer.chars().count(), 4000);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let text = "é".repeat(50);
        let answer = finalize_answer(&text, 30, None);
        assert!(answer.ends_with(TRUNCATION_NOTICE));
        assert!(answer.chars().count() <= 30);
    }

    #[test]
    fn test_tiny_limit_drops_notice_but_keeps_limit() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let answer = finalize_answer(text, 5, None);
        assert_eq!(answer, "abcde");

        let exact = TRUNCATION_NOTICE.chars().count();
        assert_eq!(finalize_answer(text, exact, None).chars().count(), exact);
    }

    #[test]
    fn test_attribution_appended() {
        assert_eq!(finalize_answer("hi", 100, Some("via Gemini")), "hi\n\nvia Gemini");
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            CompletionError::Api("500: boom".into()).user_message(),
            "⚠️ Gemini Error: API error: 500: boom"
        );
        assert!(
            CompletionError::Timeout(Duration::from_secs(60))
                .user_message()
                .contains("after 60s")
        );
    }
}
