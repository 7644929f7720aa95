//! Prompt assembly: system instruction + bounded history + the new user turn.

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One stored exchange half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Everything sent to the completion endpoint for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    /// Oldest first; the last entry is the new user turn.
    pub turns: Vec<ConversationTurn>,
}

/// Build a prompt from the last `depth` turns of `history` plus `text`.
///
/// Older turns are dropped from the prompt only; `history` is not touched.
/// The window never opens on an assistant turn whose question was cut off.
pub fn assemble(
    system_instruction: Option<&str>,
    history: &[ConversationTurn],
    depth: usize,
    text: &str,
) -> Prompt {
    let mut start = history.len().saturating_sub(depth);
    while history.get(start).is_some_and(|turn| turn.role == Role::Assistant) {
        start += 1;
    }
    let mut turns = Vec::with_capacity(history.len() - start + 1);
    turns.extend_from_slice(&history[start..]);
    turns.push(ConversationTurn::user(text));

    Prompt {
        system: system_instruction
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        turns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationTurn::user(format!("q{i}"))
                } else {
                    ConversationTurn::assistant(format!("a{i}"))
                }
            })
            .collect()
    }

    #[test]
    fn test_empty_history() {
        let prompt = assemble(None, &[], 30, "hello");
        assert_eq!(prompt.system, None);
        assert_eq!(prompt.turns, vec![ConversationTurn::user("hello")]);
    }

    #[test]
    fn test_keeps_only_most_recent_turns_in_order() {
        let stored = history(60);
        let prompt = assemble(None, &stored, 30, "new");
        assert_eq!(prompt.turns.len(), 31);
        assert_eq!(&prompt.turns[..30], &stored[30..]);
        assert_eq!(prompt.turns[30], ConversationTurn::user("new"));
    }

    #[test]
    fn test_short_history_is_sent_whole() {
        let stored = history(3);
        let prompt = assemble(None, &stored, 30, "new");
        assert_eq!(&prompt.turns[..3], &stored[..]);
    }

    #[test]
    fn test_odd_depth_does_not_start_with_answer() {
        let stored = history(6);
        let prompt = assemble(None, &stored, 3, "new");
        // The window is a3, q4, a5; a3 lost its question.
        assert_eq!(
            prompt.turns,
            vec![
                ConversationTurn::user("q4"),
                ConversationTurn::assistant("a5"),
                ConversationTurn::user("new"),
            ]
        );
    }

    #[test]
    fn test_system_instruction() {
        let prompt = assemble(Some("be brief"), &[], 30, "x");
        assert_eq!(prompt.system.as_deref(), Some("be brief"));
        assert_eq!(assemble(Some("  "), &[], 30, "x").system, None);
    }

    #[test]
    fn test_role_round_trip_strings() {
        assert_eq!(Role::parse(Role::User.as_str()), Some(Role::User));
        assert_eq!(Role::parse(Role::Assistant.as_str()), Some(Role::Assistant));
        assert_eq!(Role::parse("model"), None);
    }
}
