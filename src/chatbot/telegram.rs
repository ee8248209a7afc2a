//! Telegram client using teloxide.

use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ReplyParameters, ThreadId};
use tracing::{info, warn};

use crate::chatbot::engine::Reply;

/// Where a reply goes: a chat, optionally a forum topic inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTarget {
    pub chat_id: i64,
    pub thread_id: Option<i32>,
    pub reply_to_message_id: Option<i32>,
}

impl ReplyTarget {
    /// Conversation id for this target: the chat, plus the topic in forums.
    pub fn conversation_id(&self) -> String {
        match self.thread_id {
            Some(thread) => format!("{}:{}", self.chat_id, thread),
            None => self.chat_id.to_string(),
        }
    }
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub async fn send_message(&self, target: ReplyTarget, text: &str) -> Result<i32, String> {
        let mut request = self.bot.send_message(ChatId(target.chat_id), text);

        if let Some(thread) = target.thread_id {
            request = request.message_thread_id(ThreadId(MessageId(thread)));
        }
        if let Some(msg_id) = target.reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id)));
        }

        request.await.map(|msg| msg.id.0).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Send an image from bytes.
    pub async fn send_image(
        &self,
        target: ReplyTarget,
        image_data: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<i32, String> {
        info!("📷 Sending image to chat {} ({} bytes)", target.chat_id, image_data.len());

        let input_file = InputFile::memory(image_data).file_name("image.png");
        let mut request = self.bot.send_photo(ChatId(target.chat_id), input_file);

        if let Some(cap) = caption {
            request = request.caption(cap);
        }
        if let Some(thread) = target.thread_id {
            request = request.message_thread_id(ThreadId(MessageId(thread)));
        }
        if let Some(msg_id) = target.reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id)));
        }

        request.await.map(|msg| msg.id.0).map_err(|e| {
            let msg = format!("Failed to send image: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Deliver an engine reply. Text segments go out in order; the first
    /// failed send stops the rest.
    pub async fn send_reply(&self, target: ReplyTarget, reply: Reply) -> Result<(), String> {
        match reply {
            Reply::Text { segments } => {
                for segment in &segments {
                    self.send_message(target, segment).await?;
                }
            }
            Reply::Image { bytes, engine } => {
                let caption = image_caption(&engine);
                self.send_image(target, bytes, Some(&caption)).await?;
            }
            Reply::Failure { message } => {
                self.send_message(target, &message).await?;
            }
        }
        Ok(())
    }
}

pub fn image_caption(engine: &str) -> String {
    format!("🎨 المحرك: {engine}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_includes_forum_topic() {
        let plain = ReplyTarget {
            chat_id: -1001234,
            thread_id: None,
            reply_to_message_id: Some(7),
        };
        assert_eq!(plain.conversation_id(), "-1001234");

        let topic = ReplyTarget {
            thread_id: Some(42),
            ..plain
        };
        assert_eq!(topic.conversation_id(), "-1001234:42");
    }

    #[test]
    fn test_image_caption_names_engine() {
        assert!(image_caption("cloudflare").ends_with("cloudflare"));
    }
}
