//! Chat roles, messages and the bounded conversation thread.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One `{role, content}` entry, serialized exactly as stored and sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// History of one conversation: a single system message followed by at most
/// `window` turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationThread {
    messages: Vec<Message>,
}

impl ConversationThread {
    /// Start a thread holding only the system message.
    pub fn seeded(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Rebuild from stored messages.
    ///
    /// A missing leading system message is supplied from `system_prompt`, and
    /// any system messages past index 0 are dropped.
    pub fn from_stored(stored: Vec<Message>, system_prompt: &str) -> Self {
        let mut iter = stored.into_iter().peekable();
        let has_system = matches!(iter.peek(), Some(first) if first.role == Role::System);
        let system = if has_system { iter.next() } else { None }
            .unwrap_or_else(|| Message::system(system_prompt));

        let mut messages = vec![system];
        messages.extend(iter.filter(|m| m.role != Role::System));
        Self { messages }
    }

    /// Append and drop the oldest non-system messages beyond `window`.
    pub fn push(&mut self, message: Message, window: usize) {
        self.messages.push(message);
        self.trim(window);
    }

    pub fn trim(&mut self, window: usize) {
        let cap = 1 + window;
        if self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(1..1 + excess);
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Number of non-system messages.
    pub fn turns(&self) -> usize {
        self.messages.len() - 1
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
