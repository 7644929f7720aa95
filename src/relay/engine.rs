//! Relay engine - turns triggering messages into Gemini answers.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::HistoryScope;
use crate::relay::completion::{Completion, CompletionError, finalize_answer};
use crate::relay::context::{ConversationTurn, Prompt, Role, assemble};
use crate::relay::history::{HistoryError, HistoryStore};
use crate::relay::last_prompt::LastPromptCache;
use crate::relay::locks::ConversationLocks;
use crate::relay::message::{ChatKind, InboundMessage, Sender, html_escape};
use crate::relay::telegram::Outbound;
use crate::relay::trigger::{Trigger, classify};

pub const THINKING: &str = "thinking... 💭";
pub const ASK_SOMETHING: &str = "Ask something 🙂";
pub const NO_PREVIOUS_PROMPT: &str = "No previous prompt.";
pub const GREETING: &str = "👋 Hi! DM me anything.\nIn groups, mention me to get an answer.";

/// Engine settings resolved at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bot_user_id: i64,
    /// Bot handle without the leading `@`.
    pub bot_username: String,
    pub system_instruction: Option<String>,
    /// Number of stored turns sent as context.
    pub history_depth: usize,
    pub history_scope: HistoryScope,
    pub max_answer_chars: usize,
    pub attribution: Option<String>,
    pub completion_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bot_user_id: 0,
            bot_username: String::new(),
            system_instruction: None,
            history_depth: 30,
            history_scope: HistoryScope::Chat,
            max_answer_chars: 4000,
            attribution: None,
            completion_timeout: Duration::from_secs(60),
        }
    }
}

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not addressed to the bot.
    Ignored,
    /// Addressed to the bot with nothing to ask; a prompt request was sent.
    PromptRequested,
    /// Regenerate pressed before anything was asked in this chat.
    NoPreviousPrompt,
    /// An answer was delivered.
    Answered,
    /// The completion failed and the error text was delivered instead.
    CompletionFailed,
    /// Neither the edit nor the fallback send went through.
    DeliveryFailed,
}

/// The relay engine.
pub struct RelayEngine<C, T> {
    config: RelayConfig,
    history: HistoryStore,
    last_prompts: LastPromptCache,
    locks: ConversationLocks,
    completion: C,
    outbound: T,
}

impl<C: Completion, T: Outbound> RelayEngine<C, T> {
    pub fn new(config: RelayConfig, history: HistoryStore, completion: C, outbound: T) -> Self {
        Self {
            config,
            history,
            last_prompts: LastPromptCache::new(),
            locks: ConversationLocks::new(),
            completion,
            outbound,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn last_prompts(&self) -> &LastPromptCache {
        &self.last_prompts
    }

    /// Key that history is stored under for a message in `chat_id` from `user_id`.
    pub fn conversation_id(&self, chat_id: i64, user_id: i64) -> i64 {
        match self.config.history_scope {
            HistoryScope::Chat => chat_id,
            HistoryScope::User => user_id,
        }
    }

    /// Handle an incoming text message.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Outcome {
        let trigger = classify(msg, self.config.bot_user_id, &self.config.bot_username);

        match trigger {
            Trigger::Ignore => Outcome::Ignored,
            Trigger::AskSomething => {
                info!("❓ Empty prompt from {} in {}", msg.sender.display_name(), msg.chat_id);
                if let Err(e) = self
                    .outbound
                    .send_text(msg.chat_id, ASK_SOMETHING, Some(msg.message_id), false)
                    .await
                {
                    warn!("Failed to ask for a prompt: {e}");
                }
                Outcome::PromptRequested
            }
            Trigger::Respond { prompt, mention } => {
                info!(
                    "📨 {} ({}) in {}: \"{}\"",
                    msg.sender.display_name(),
                    msg.sender.user_id,
                    msg.chat_id,
                    prompt.chars().take(50).collect::<String>()
                );

                let conversation_id = self.conversation_id(msg.chat_id, msg.sender.user_id);
                let _guard = self.locks.acquire(conversation_id).await;

                self.last_prompts.set(msg.chat_id, &prompt, conversation_id);
                let mention = mention.then(|| msg.sender.mention_html());
                self.relay(msg.chat_id, conversation_id, &prompt, mention.as_deref(), false).await
            }
        }
    }

    /// Replay the last prompt of `chat_id` on behalf of `actor`.
    ///
    /// The replay runs in the conversation that owns the prompt; `actor` is
    /// only mentioned in the reply.
    pub async fn handle_regenerate(&self, chat_id: i64, chat_kind: ChatKind, actor: &Sender) -> Outcome {
        let Some(last) = self.last_prompts.get(chat_id) else {
            info!("🔄 Regenerate in {} with no previous prompt", chat_id);
            if let Err(e) = self.outbound.send_text(chat_id, NO_PREVIOUS_PROMPT, None, false).await {
                warn!("Failed to send notice: {e}");
            }
            return Outcome::NoPreviousPrompt;
        };

        let owner = last.conversation_id;
        let _guard = self.locks.acquire(owner).await;
        // A message may have landed while we waited.
        let last = self
            .last_prompts
            .get(chat_id)
            .filter(|fresh| fresh.conversation_id == owner)
            .unwrap_or(last);

        info!("🔄 Regenerate by {} in {}", actor.display_name(), chat_id);
        let mention = (chat_kind == ChatKind::Group).then(|| actor.mention_html());
        self.relay(chat_id, last.conversation_id, &last.prompt, mention.as_deref(), true).await
    }

    /// Forget the stored history of the caller's conversation.
    pub async fn reset(&self, chat_id: i64, user_id: i64) -> Result<usize, HistoryError> {
        let conversation_id = self.conversation_id(chat_id, user_id);
        let _guard = self.locks.acquire(conversation_id).await;
        let removed = self.history.clear(conversation_id)?;
        info!("🧹 Cleared {} turn(s) of conversation {}", removed, conversation_id);
        Ok(removed)
    }

    /// Placeholder, completion, edit, then record the exchange.
    ///
    /// A regenerate whose prompt is the newest exchange in history is sent
    /// without that exchange, and its answer replaces the stored one.
    async fn relay(
        &self,
        chat_id: i64,
        conversation_id: i64,
        prompt: &str,
        mention: Option<&str>,
        regenerate: bool,
    ) -> Outcome {
        let depth = self.config.history_depth;
        let (history, replaces) = self.load_context(conversation_id, prompt, regenerate);
        let request = assemble(self.config.system_instruction.as_deref(), &history, depth, prompt);

        if let Err(e) = self.outbound.send_typing(chat_id).await {
            debug!("{e}");
        }
        let placeholder = match self.outbound.send_text(chat_id, THINKING, None, false).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("No placeholder, will send the answer directly: {e}");
                None
            }
        };

        let result = self.complete_with_timeout(&request).await;

        let (body, answered) = match result {
            Ok(answer) => {
                if replaces {
                    self.replace_answer(conversation_id, prompt, &answer);
                } else {
                    self.record_exchange(conversation_id, prompt, &answer);
                }
                let body = finalize_answer(
                    &answer,
                    self.config.max_answer_chars,
                    self.config.attribution.as_deref(),
                );
                (body, true)
            }
            Err(e) => {
                error!("Completion failed for chat {}: {e}", chat_id);
                (e.user_message(), false)
            }
        };

        let text = render_reply(mention, &body);
        if !self.deliver(chat_id, placeholder, &text).await {
            return Outcome::DeliveryFailed;
        }

        if answered {
            info!("✅ Answered in {} ({} chars)", chat_id, text.chars().count());
            Outcome::Answered
        } else {
            Outcome::CompletionFailed
        }
    }

    async fn complete_with_timeout(&self, request: &Prompt) -> Result<String, CompletionError> {
        let limit = self.config.completion_timeout;
        match tokio::time::timeout(limit, self.completion.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(limit)),
        }
    }

    /// Recent turns for a request, and whether they had the replayed exchange cut off.
    fn load_context(&self, conversation_id: i64, prompt: &str, regenerate: bool) -> (Vec<ConversationTurn>, bool) {
        let limit = self.config.history_depth + if regenerate { 2 } else { 0 };
        let mut history = self.history.read_recent(conversation_id, limit).unwrap_or_else(|e| {
            warn!("Failed to read history for {}: {e}", conversation_id);
            Vec::new()
        });

        let replaces = regenerate && ends_with_exchange(&history, prompt);
        if replaces {
            history.truncate(history.len() - 2);
        }
        (history, replaces)
    }

    fn replace_answer(&self, conversation_id: i64, prompt: &str, answer: &str) {
        match self.history.replace_last_answer(conversation_id, answer) {
            Ok(true) => {}
            Ok(false) => self.record_exchange(conversation_id, prompt, answer),
            Err(e) => warn!("Failed to replace answer: {e}"),
        }
    }

    fn record_exchange(&self, conversation_id: i64, prompt: &str, answer: &str) {
        if let Err(e) = self.history.append(conversation_id, Role::User, prompt) {
            warn!("Failed to store prompt: {e}");
            return;
        }
        if let Err(e) = self.history.append(conversation_id, Role::Assistant, answer) {
            warn!("Failed to store answer: {e}");
        }
    }

    /// Edit the placeholder, falling back to a fresh message.
    async fn deliver(&self, chat_id: i64, placeholder: Option<i64>, text: &str) -> bool {
        if let Some(message_id) = placeholder {
            match self.outbound.edit_text(chat_id, message_id, text, true).await {
                Ok(()) => return true,
                Err(e) => warn!("Edit failed, sending a new message: {e}"),
            }
        }

        match self.outbound.send_text(chat_id, text, None, true).await {
            Ok(_) => true,
            Err(e) => {
                error!("Could not deliver answer to {}: {e}", chat_id);
                false
            }
        }
    }
}

/// Whether `history` ends with `prompt` and its answer.
fn ends_with_exchange(history: &[ConversationTurn], prompt: &str) -> bool {
    matches!(
        history,
        [.., question, answer]
            if question.role == Role::User && question.content == prompt && answer.role == Role::Assistant
    )
}

/// Escape the answer for HTML and prefix the mention, if any.
pub fn render_reply(mention: Option<&str>, body: &str) -> String {
    match mention {
        Some(mention) => format!("{mention}\n\n{}", html_escape(body)),
        None => html_escape(body),
    }
}
