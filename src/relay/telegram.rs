//! Telegram client using teloxide.

use std::future::Future;

use teloxide::prelude::*;
use teloxide::types::{ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, ReplyParameters};
use tracing::warn;

/// Callback data carried by the regenerate button.
pub const REGENERATE_ACTION: &str = "regen";

/// Outbound side of the chat transport.
pub trait Outbound: Send + Sync {
    /// Send an HTML message, returning its id.
    fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
        with_regenerate: bool,
    ) -> impl Future<Output = Result<i64, String>> + Send;

    /// Replace the text of a message we sent earlier.
    fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        with_regenerate: bool,
    ) -> impl Future<Output = Result<(), String>> + Send;

    fn send_typing(&self, chat_id: i64) -> impl Future<Output = Result<(), String>> + Send;
}

fn regenerate_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🔄 Regenerate",
        REGENERATE_ACTION,
    )]])
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Outbound for TelegramClient {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
        with_regenerate: bool,
    ) -> Result<i64, String> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);

        if let Some(msg_id) = reply_to_message_id {
            let reply_params = ReplyParameters::new(MessageId(msg_id as i32));
            request = request.reply_parameters(reply_params);
        }
        if with_regenerate {
            request = request.reply_markup(regenerate_keyboard());
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        with_regenerate: bool,
    ) -> Result<(), String> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
            .parse_mode(ParseMode::Html);

        if with_regenerate {
            request = request.reply_markup(regenerate_keyboard());
        }

        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to edit message {message_id}: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), String> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to send typing: {e}"))
    }
}
