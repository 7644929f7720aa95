//! Decides whether an inbound message should reach the model, and with what prompt.

use regex::RegexBuilder;

use crate::relay::message::{ChatKind, InboundMessage};

/// What to do with an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Not addressed to the bot.
    Ignore,
    /// Addressed to the bot, but there is nothing to ask.
    AskSomething,
    /// Send `prompt` to the model. `mention` is set for group chats.
    Respond { prompt: String, mention: bool },
}

/// Classify a message for a bot with the given user id and handle (without `@`).
pub fn classify(msg: &InboundMessage, bot_user_id: i64, bot_username: &str) -> Trigger {
    match msg.chat_kind {
        ChatKind::Private => {
            if msg.text.trim().is_empty() {
                Trigger::AskSomething
            } else {
                Trigger::Respond { prompt: msg.text.clone(), mention: false }
            }
        }
        ChatKind::Group => classify_group(msg, bot_user_id, bot_username),
    }
}

fn classify_group(msg: &InboundMessage, bot_user_id: i64, bot_username: &str) -> Trigger {
    let handle = format!("@{bot_username}");
    let mentioned = !bot_username.is_empty()
        && msg.mentions.iter().any(|m| m.eq_ignore_ascii_case(&handle));

    let reply_to_bot = msg
        .reply_to
        .as_ref()
        .is_some_and(|r| r.author_id == Some(bot_user_id));

    if !(mentioned || reply_to_bot) {
        return Trigger::Ignore;
    }

    let mut prompt = strip_mention(&msg.text, bot_username);
    if prompt.is_empty()
        && let Some(ref reply) = msg.reply_to
    {
        prompt = reply.text.trim().to_string();
    }

    if prompt.is_empty() {
        Trigger::AskSomething
    } else {
        Trigger::Respond { prompt, mention: true }
    }
}

/// Remove every `@handle` occurrence (case-insensitive) and trim the result.
///
/// A match only counts when the handle ends there, so `@botfather` is kept
/// when stripping `@bot`.
pub fn strip_mention(text: &str, bot_username: &str) -> String {
    if bot_username.is_empty() {
        return text.trim().to_string();
    }
    let pattern = format!("@{}", regex::escape(bot_username));
    let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
        return text.trim().to_string();
    };

    let mut stripped = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        let continues_handle = text[m.end()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if continues_handle {
            continue;
        }
        stripped.push_str(&text[last..m.start()]);
        last = m.end();
    }
    stripped.push_str(&text[last..]);
    stripped.trim().to_string()
}
