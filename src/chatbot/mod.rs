//! Chatbot module - conversation state and turn handling.

pub mod chunker;
pub mod conversation;
pub mod database;
pub mod engine;
pub mod image;
pub mod intent;
pub mod message;
pub mod telegram;


pub use conversation::ConversationStore;
pub use database::{Database, DatabaseError};
pub use engine::{AI_CHANNEL_KEY, Engine, EngineError, EngineSettings, Reply};
pub use intent::{Intent, IntentClassifier};
pub use message::{ConversationThread, Message, Role};
pub use telegram::{ReplyTarget, TelegramClient};
