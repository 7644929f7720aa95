use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `telegram_bot_token`.
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
/// Environment variable that overrides `gemini_api_key`.
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

/// Telegram rejects messages longer than 4096 characters; leave room for the mention and suffix.
const MAX_ANSWER_CHARS_LIMIT: usize = 4000;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// Which key history is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryScope {
    /// One history per chat, shared by everyone in a group.
    #[default]
    Chat,
    /// One history per sender, following them across chats.
    User,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    #[serde(default)]
    gemini_api_key: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_api_base")]
    api_base: String,
    /// Prepended to every request as the model's system instruction.
    system_instruction: Option<String>,
    #[serde(default = "default_history_depth")]
    history_depth: usize,
    #[serde(default)]
    history_scope: HistoryScope,
    #[serde(default = "default_true")]
    persist_history: bool,
    #[serde(default = "default_max_answer_chars")]
    max_answer_chars: usize,
    max_output_tokens: Option<u32>,
    #[serde(default = "default_completion_timeout_secs")]
    completion_timeout_secs: u64,
    /// Appended on its own line under every answer.
    attribution: Option<String>,
    /// Directory for state files (logs, history). Defaults to current directory.
    data_dir: Option<String>,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_history_depth() -> usize {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_answer_chars() -> usize {
    MAX_ANSWER_CHARS_LIMIT
}

fn default_completion_timeout_secs() -> u64 {
    60
}

pub struct Config {
    pub telegram_bot_token: String,
    pub gemini_api_key: String,
    pub model: String,
    pub api_base: String,
    pub system_instruction: Option<String>,
    /// Number of most recent turns sent as context.
    pub history_depth: usize,
    pub history_scope: HistoryScope,
    pub persist_history: bool,
    pub max_answer_chars: usize,
    pub max_output_tokens: Option<u32>,
    pub completion_timeout: Duration,
    pub attribution: Option<String>,
    /// Directory for state files (logs, history).
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from a JSON file, letting the process environment supply credentials.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load from a JSON file with an explicit environment lookup.
    pub fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let mut file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if let Some(token) = env(TELEGRAM_TOKEN_ENV).filter(|t| !t.is_empty()) {
            file.telegram_bot_token = token;
        }
        if let Some(key) = env(GEMINI_KEY_ENV).filter(|k| !k.is_empty()) {
            file.gemini_api_key = key;
        }

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(format!(
                "telegram_bot_token is required (config file or {TELEGRAM_TOKEN_ENV})"
            )));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.gemini_api_key.is_empty() {
            return Err(ConfigError::Validation(format!(
                "gemini_api_key is required (config file or {GEMINI_KEY_ENV})"
            )));
        }
        if file.model.trim().is_empty() {
            return Err(ConfigError::Validation("model must not be empty".into()));
        }
        if file.history_depth == 0 {
            return Err(ConfigError::Validation("history_depth must be at least 1".into()));
        }
        if file.max_answer_chars == 0 || file.max_answer_chars > MAX_ANSWER_CHARS_LIMIT {
            return Err(ConfigError::Validation(format!(
                "max_answer_chars must be between 1 and {MAX_ANSWER_CHARS_LIMIT}"
            )));
        }
        if file.completion_timeout_secs == 0 {
            return Err(ConfigError::Validation("completion_timeout_secs must be at least 1".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            gemini_api_key: file.gemini_api_key,
            model: file.model,
            api_base: file.api_base.trim_end_matches('/').to_string(),
            system_instruction: file.system_instruction.filter(|s| !s.trim().is_empty()),
            history_depth: file.history_depth,
            history_scope: file.history_scope,
            persist_history: file.persist_history,
            max_answer_chars: file.max_answer_chars,
            max_output_tokens: file.max_output_tokens,
            completion_timeout: Duration::from_secs(file.completion_timeout_secs),
            attribution: file.attribution.filter(|s| !s.trim().is_empty()),
            data_dir,
        })
    }

    /// Where the history database lives, if history is persisted.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.persist_history.then(|| self.data_dir.join("history.db"))
    }
}
