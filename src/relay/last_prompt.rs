//! Most recent prompt per chat, replayed by the regenerate button.

use std::collections::HashMap;
use std::sync::Mutex;

/// A prompt together with the conversation its exchange belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastPrompt {
    pub prompt: String,
    pub conversation_id: i64,
}

#[derive(Default)]
pub struct LastPromptCache {
    prompts: Mutex<HashMap<i64, LastPrompt>>,
}

impl LastPromptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `prompt` for `chat_id`, replacing any previous one.
    pub fn set(&self, chat_id: i64, prompt: &str, conversation_id: i64) {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(chat_id, LastPrompt { prompt: prompt.to_string(), conversation_id });
    }

    pub fn get(&self, chat_id: i64) -> Option<LastPrompt> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&chat_id)
            .cloned()
    }
}
