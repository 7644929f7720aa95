//! Inbound message types and HTML rendering helpers.
//!
//! Replies are sent with Telegram's HTML parse mode, so anything that did not
//! originate from us (model output, user names) is escaped before it is sent.

/// Kind of chat a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// The user who sent a message or pressed a button.
#[derive(Debug, Clone)]
pub struct Sender {
    pub user_id: i64,
    /// Public handle without the leading `@`.
    pub username: Option<String>,
    pub first_name: String,
}

/// The message being replied to.
#[derive(Debug, Clone)]
pub struct ReplyTo {
    /// Author of the replied-to message, if known.
    pub author_id: Option<i64>,
    pub text: String,
}

/// A text message from the chat transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub sender: Sender,
    pub text: String,
    /// Text of each mention entity, e.g. `@some_bot`.
    pub mentions: Vec<String>,
    pub reply_to: Option<ReplyTo>,
}

/// Escape a string for Telegram HTML text.
pub fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape a string for an HTML attribute value (also escapes quotes).
fn html_escape_attr(s: &str) -> String {
    html_escape(s).replace('"', "&quot;")
}

/// Safely truncate a string to at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

impl Sender {
    /// Render a mention: `@handle` when public, otherwise a `tg://user` link.
    ///
    /// ```text
    /// @alice
    /// <a href="tg://user?id=923847">Alice</a>
    /// ```
    pub fn mention_html(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => format!("@{}", html_escape(username)),
            None => format!(
                "<a href=\"tg://user?id={}\">{}</a>",
                self.user_id,
                html_escape_attr(&self.first_name)
            ),
        }
    }

    /// Name for log lines.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }
}
