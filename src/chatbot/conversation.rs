//! Bounded per-conversation history on top of the database.
//!
//! The store does no locking of its own: two turns on the same thread that
//! interleave their load and persist will race, and the later `persist` wins.
//! `Engine` serializes turns per thread so this never happens in the bot.

use std::sync::Arc;

use tracing::{debug, info};

use crate::chatbot::database::{Database, DatabaseError};
use crate::chatbot::message::{ConversationThread, Message};

pub struct ConversationStore {
    db: Arc<Database>,
}

impl ConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get_history(&self, thread_id: &str) -> Result<Option<Vec<Message>>, DatabaseError> {
        self.db.load_history(thread_id)
    }

    /// Load the thread (seeding the system message if new), append `message`
    /// and trim to `window` turns. Nothing is written until `persist`.
    pub fn append_and_trim(
        &self,
        thread_id: &str,
        message: Message,
        system_prompt: &str,
        window: usize,
    ) -> Result<ConversationThread, DatabaseError> {
        let mut thread = match self.db.load_history(thread_id)? {
            Some(stored) => ConversationThread::from_stored(stored, system_prompt),
            None => {
                debug!("New conversation thread {}", thread_id);
                ConversationThread::seeded(system_prompt)
            }
        };
        thread.push(message, window);
        Ok(thread)
    }

    /// Write the full sequence in one statement; returns once it is durable.
    pub fn persist(&self, thread_id: &str, thread: &ConversationThread) -> Result<(), DatabaseError> {
        self.db.save_history(thread_id, thread.messages())?;
        debug!("💾 Saved thread {} ({} messages)", thread_id, thread.len());
        Ok(())
    }

    pub fn purge(&self, thread_id: &str) -> Result<bool, DatabaseError> {
        let removed = self.db.delete_history(thread_id)?;
        if removed {
            info!("🧹 Purged history for thread {}", thread_id);
        }
        Ok(removed)
    }
}
