use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{MessageEntityKind, User};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;

use gemrelay::config::Config;
use gemrelay::relay::engine::GREETING;
use gemrelay::relay::{
    ChatKind, GeminiClient, HistoryStore, InboundMessage, RelayConfig, RelayEngine, ReplyTo,
    Sender, TelegramClient, REGENERATE_ACTION,
};

type Engine = RelayEngine<GeminiClient, TelegramClient>;

struct BotState {
    engine: Engine,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "say hello.")]
    Start,
    #[command(description = "show this help.")]
    Help,
    #[command(description = "forget the conversation history.")]
    Reset,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gemrelay.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("gemrelay.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting gemrelay...");
    info!("Loaded config from {config_path}");
    info!("Model: {}, history depth: {}, scope: {:?}", config.model, config.history_depth, config.history_scope);

    let bot = Bot::new(&config.telegram_bot_token);

    let me = match bot.get_me().await {
        Ok(me) => me,
        Err(e) => {
            error!("Failed to get bot info: {e}");
            std::process::exit(1);
        }
    };
    info!("Bot user ID: {}, username: @{}", me.id, me.username());

    let history = match config.history_path() {
        Some(path) => HistoryStore::open(&path),
        None => {
            info!("History persistence disabled, keeping it in memory");
            HistoryStore::in_memory()
        }
    };
    let history = match history {
        Ok(history) => history,
        Err(e) => {
            error!("Failed to open history: {e}");
            std::process::exit(1);
        }
    };

    let relay_config = RelayConfig {
        bot_user_id: me.id.0 as i64,
        bot_username: me.username().to_string(),
        system_instruction: config.system_instruction.clone(),
        history_depth: config.history_depth,
        history_scope: config.history_scope,
        max_answer_chars: config.max_answer_chars,
        attribution: config.attribution.clone(),
        completion_timeout: config.completion_timeout,
    };
    let gemini = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.api_base.clone(),
        config.model.clone(),
        config.max_output_tokens,
    );
    let telegram = TelegramClient::new(bot.clone());
    let state = Arc::new(BotState {
        engine: RelayEngine::new(relay_config, history, gemini, telegram),
    });

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register commands: {e}");
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
                .branch(dptree::endpoint(handle_new_message)),
        )
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("Bot running in polling mode…");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state, me])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    match cmd {
        Command::Start => {
            bot.send_message(msg.chat.id, GREETING).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Reset => {
            let Some(ref user) = msg.from else {
                return Ok(());
            };
            let reply = match state.engine.reset(msg.chat.id.0, user.id.0 as i64).await {
                Ok(removed) => format!("🧹 Forgot {removed} message(s)."),
                Err(e) => {
                    error!("Failed to clear history: {e}");
                    "⚠️ Could not clear the history.".to_string()
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
    }
    Ok(())
}

async fn handle_new_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(inbound) = telegram_to_inbound(&msg) else {
        return Ok(());
    };

    let outcome = state.engine.handle_message(&inbound).await;
    debug!("Message {} in {} → {:?}", inbound.message_id, inbound.chat_id, outcome);
    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback: {e}");
    }

    if q.data.as_deref() != Some(REGENERATE_ACTION) {
        return Ok(());
    }
    let Some(ref message) = q.message else {
        return Ok(());
    };

    let chat = message.chat();
    let chat_kind = if chat.is_private() { ChatKind::Private } else { ChatKind::Group };
    let actor = user_to_sender(&q.from);

    let outcome = state.engine.handle_regenerate(chat.id.0, chat_kind, &actor).await;
    debug!("Regenerate in {} → {:?}", chat.id, outcome);
    Ok(())
}

fn user_to_sender(user: &User) -> Sender {
    Sender {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
    }
}

/// Map a Telegram text message from a private chat or group to the relay's view of it.
fn telegram_to_inbound(msg: &Message) -> Option<InboundMessage> {
    let text = msg.text()?;
    let user = msg.from.as_ref()?;

    let chat_kind = if msg.chat.is_private() {
        ChatKind::Private
    } else if msg.chat.is_group() || msg.chat.is_supergroup() {
        ChatKind::Group
    } else {
        return None;
    };

    let mentions = msg
        .parse_entities()
        .unwrap_or_default()
        .into_iter()
        .filter(|entity| matches!(entity.kind(), MessageEntityKind::Mention))
        .map(|entity| entity.text().to_string())
        .collect();

    let reply_to = msg.reply_to_message().map(|reply| ReplyTo {
        author_id: reply.from.as_ref().map(|u| u.id.0 as i64),
        text: reply.text().or(reply.caption()).unwrap_or("").to_string(),
    });

    Some(InboundMessage {
        message_id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        chat_kind,
        sender: user_to_sender(user),
        text: text.to_string(),
        mentions,
        reply_to,
    })
}
