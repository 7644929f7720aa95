//! Relay module - forwards Telegram messages to Gemini and edits the answer in place.

pub mod completion;
pub mod context;
pub mod engine;
pub mod gemini;
pub mod history;
pub mod last_prompt;
pub mod locks;
pub mod message;
pub mod telegram;
pub mod trigger;


pub use completion::{Completion, CompletionError};
pub use engine::{Outcome, RelayConfig, RelayEngine};
pub use gemini::GeminiClient;
pub use history::HistoryStore;
pub use message::{ChatKind, InboundMessage, ReplyTo, Sender};
pub use telegram::{Outbound, TelegramClient, REGENERATE_ACTION};
