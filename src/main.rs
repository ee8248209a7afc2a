use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ThreadId};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use northbot::chatbot::{AI_CHANNEL_KEY, Engine, ReplyTarget, TelegramClient};
use northbot::config::Config;

struct BotState {
    config: Config,
    engine: Engine,
    telegram: TelegramClient,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "northbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("northbot.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file: {e}");
            std::process::exit(1);
        }
    };
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

    info!("🚀 Starting northbot...");
    info!("Loaded config from {config_path}");
    info!("Owner IDs: {:?}", config.owner_ids);

    let engine = match Engine::open(&config) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start engine: {e}");
            std::process::exit(1);
        }
    };

    match engine.get_activation_target(AI_CHANNEL_KEY) {
        Ok(Some(chat)) => info!("AI channel: {chat}"),
        Ok(None) => info!("No AI channel yet, an owner must send /set_ai"),
        Err(e) => warn!("Failed to read AI channel: {e}"),
    }

    let bot = Bot::new(&config.telegram_bot_token);
    let state = Arc::new(BotState {
        config,
        engine,
        telegram: TelegramClient::new(bot.clone()),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_new_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    state.engine.close();
    info!("👋 Shut down");
}

/// Bot command at the start of `text`, without any `@botname` suffix.
fn command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    Some(name.split('@').next().unwrap_or(name))
}

fn reply_target(msg: &Message) -> ReplyTarget {
    ReplyTarget {
        chat_id: msg.chat.id.0,
        thread_id: msg
            .thread_id
            .filter(|_| msg.is_topic_message)
            .map(|ThreadId(MessageId(id))| id),
        reply_to_message_id: Some(msg.id.0),
    }
}

async fn handle_new_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let username = user.username.as_deref().unwrap_or(&user.first_name);
    let target = reply_target(&msg);

    match command(text) {
        Some("set_ai") => {
            if !state.config.is_owner(user.id.0) {
                info!("Ignoring /set_ai from non-owner {} ({})", username, user.id);
                return Ok(());
            }
            let reply = match state
                .engine
                .set_activation_target(AI_CHANNEL_KEY, &msg.chat.id.0.to_string())
            {
                Ok(()) => "✅ تم تفعيل الذكاء الاصطناعي في هذه المحادثة.",
                Err(e) => {
                    error!("Failed to save AI channel: {e}");
                    "⚠️ حدث خطأ، يرجى المحاولة مرة أخرى."
                }
            };
            state.telegram.send_message(target, reply).await.ok();
            return Ok(());
        }
        Some("reset") => {
            if is_ai_channel(&state, msg.chat.id) {
                match state.engine.reset_conversation(&target.conversation_id()).await {
                    Ok(_) => {
                        state.telegram.send_message(target, "🧹 تم مسح المحادثة.").await.ok();
                    }
                    Err(e) => error!("Failed to reset conversation: {e}"),
                }
            }
            return Ok(());
        }
        Some(_) => return Ok(()),
        None => {}
    }

    if !is_ai_channel(&state, msg.chat.id) {
        return Ok(());
    }

    let preview: String = text.chars().take(100).collect();
    info!("📨 {} ({}): \"{}\"", username, user.id, preview);

    let mut typing = bot.send_chat_action(msg.chat.id, ChatAction::Typing);
    if let Some(thread) = target.thread_id {
        typing = typing.message_thread_id(ThreadId(MessageId(thread)));
    }
    typing.await.ok();

    let reply = state.engine.handle_turn(&target.conversation_id(), text).await;
    if let Err(e) = state.telegram.send_reply(target, reply).await {
        warn!("Reply to {} not delivered: {e}", target.conversation_id());
    }

    Ok(())
}

fn is_ai_channel(state: &BotState, chat_id: ChatId) -> bool {
    match state.engine.get_activation_target(AI_CHANNEL_KEY) {
        Ok(Some(channel)) => channel == chat_id.0.to_string(),
        Ok(None) => false,
        Err(e) => {
            warn!("Failed to read AI channel: {e}");
            false
        }
    }
}
