//! Chatbot engine - turns `(conversation id, text)` into a reply.
//!
//! The engine is the one process-wide object: it is opened at startup from
//! the config, shared by every handler, and closed on shutdown. It never
//! returns an error from `handle_turn`; every failure becomes `Reply::Failure`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedMutexGuard, watch};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::chatbot::chunker::chunk;
use crate::chatbot::conversation::ConversationStore;
use crate::chatbot::database::{Database, DatabaseError};
use crate::chatbot::image::ImageGenerationPipeline;
use crate::chatbot::intent::IntentClassifier;
use crate::chatbot::message::{ConversationThread, Message};
use crate::config::{Config, ImageBackend};
use crate::provider::cloudflare::CloudflareImage;
use crate::provider::groq::GroqChat;
use crate::provider::huggingface::HuggingFaceImage;
use crate::provider::pollinations::PollinationsImage;
use crate::provider::registry::RegistryError;
use crate::provider::{
    Capability, Orchestrator, ProviderDescriptor, ProviderError, ProviderRegistry, Request,
    RetryPolicy,
};

/// Settings key holding the chat where the bot answers.
pub const AI_CHANNEL_KEY: &str = "ai_channel";

/// What the platform layer should send back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Ready-to-send pieces, each within the transport limit.
    Text { segments: Vec<String> },
    Image { bytes: Vec<u8>, engine: String },
    Failure { message: String },
}

/// Startup failures.
#[derive(Debug)]
pub enum EngineError {
    Io(std::io::Error),
    Database(DatabaseError),
    Registry(RegistryError),
    Provider(ProviderError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to prepare data directory: {e}"),
            Self::Database(e) => write!(f, "failed to open database: {e}"),
            Self::Registry(e) => write!(f, "invalid provider configuration: {e}"),
            Self::Provider(e) => write!(f, "failed to build provider: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Database(e) => Some(e),
            Self::Registry(e) => Some(e),
            Self::Provider(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<DatabaseError> for EngineError {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

impl From<RegistryError> for EngineError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

/// Per-turn behavior and the user-facing texts.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub system_prompt: String,
    pub creator_note: Option<String>,
    pub identity_keywords: Vec<String>,
    pub history_window: usize,
    pub max_message_chars: usize,
    /// Every text provider failed.
    pub busy_message: String,
    /// Every image provider failed.
    pub image_failed_message: String,
    /// Image keyword with no description after it.
    pub empty_prompt_message: String,
    /// History could not be read.
    pub error_message: String,
    pub shutdown_message: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            system_prompt: crate::config::DEFAULT_SYSTEM_PROMPT.to_string(),
            creator_note: None,
            identity_keywords: Vec::new(),
            history_window: 15,
            max_message_chars: 2000,
            busy_message: "عذراً، أواجه ضغطاً حالياً. حاول مجدداً بعد دقيقة. 🛡️".to_string(),
            image_failed_message: "❌ عذراً، فشلت في توليد الصورة حالياً.".to_string(),
            empty_prompt_message: "🎨 صف لي ما تريد أن أرسمه، مثال: ارسم قطة في الفضاء".to_string(),
            error_message: "⚠️ حدث خطأ، يرجى المحاولة مرة أخرى.".to_string(),
            shutdown_message: "⚠️ جاري إعادة التشغيل، حاول مجدداً بعد قليل.".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            creator_note: config.creator_note.clone(),
            identity_keywords: config.identity_keywords.clone(),
            history_window: config.history_window,
            max_message_chars: config.max_message_chars,
            ..Self::default()
        }
    }
}

/// Build the text and image fallback chains described by the config.
pub fn registry_from_config(config: &Config) -> Result<ProviderRegistry, EngineError> {
    let mut registry = ProviderRegistry::new();

    for model in &config.text_models {
        registry.register(ProviderDescriptor::text(GroqChat::new(
            model.clone(),
            config.groq_api_key.clone(),
            config.temperature,
            config.text_timeout,
        )?));
    }

    for tier in &config.image_providers {
        let timeout = config.image_timeout;
        let provider = match tier.backend {
            ImageBackend::Cloudflare => ProviderDescriptor::image(CloudflareImage::new(
                config.cloudflare_account_id.clone(),
                config.cloudflare_api_token.clone(),
                tier.min_bytes,
                timeout,
            )?),
            ImageBackend::HuggingFace => ProviderDescriptor::image(HuggingFaceImage::new(
                config.hf_api_key.clone(),
                tier.min_bytes,
                timeout,
            )?),
            ImageBackend::Pollinations => {
                ProviderDescriptor::image(PollinationsImage::new(tier.min_bytes, timeout)?)
            }
        };
        registry.register(provider);
    }

    Ok(registry)
}

/// One async mutex per conversation so turns on a thread run one at a time.
#[derive(Default)]
struct TurnLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct TurnGuard<'a> {
    locks: &'a TurnLocks,
    thread_id: String,
    guard: OwnedMutexGuard<()>,
}

impl TurnLocks {
    async fn acquire(&self, thread_id: &str) -> TurnGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(thread_id.to_string()).or_default().clone()
        };
        TurnGuard {
            locks: self,
            thread_id: thread_id.to_string(),
            guard: lock.lock_owned().await,
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Held only by the map and this guard: nobody is waiting.
        if Arc::strong_count(OwnedMutexGuard::mutex(&self.guard)) <= 2 {
            map.remove(&self.thread_id);
        }
    }
}

/// The chatbot engine.
pub struct Engine {
    settings: EngineSettings,
    db: Arc<Database>,
    store: ConversationStore,
    orchestrator: Arc<Orchestrator>,
    classifier: IntentClassifier,
    images: ImageGenerationPipeline,
    turns: TurnLocks,
    shutdown: watch::Sender<bool>,
}

impl Engine {
    /// Open the database under `data_dir` and build providers from the config.
    pub fn open(config: &Config) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db = Database::open(&config.database_path())?;
        let registry = registry_from_config(config)?;
        let policy = RetryPolicy {
            max_retries_per_provider: config.max_retries_per_provider,
            backoff: config.retry_backoff,
        };

        Self::new(
            EngineSettings::from_config(config),
            Arc::new(db),
            registry,
            policy,
            IntentClassifier::new(config.image_keywords.iter().cloned()),
        )
    }

    pub fn new(
        settings: EngineSettings,
        db: Arc<Database>,
        registry: ProviderRegistry,
        policy: RetryPolicy,
        classifier: IntentClassifier,
    ) -> Result<Self, EngineError> {
        registry.validate()?;

        for capability in [Capability::Text, Capability::Image] {
            let names: Vec<&str> = registry
                .providers_for(capability)
                .iter()
                .map(|p| p.name())
                .collect();
            info!("{} providers: {}", capability, names.join(" → "));
        }

        let orchestrator = Arc::new(Orchestrator::new(Arc::new(registry), policy));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            settings,
            store: ConversationStore::new(db.clone()),
            db,
            images: ImageGenerationPipeline::new(orchestrator.clone()),
            orchestrator,
            classifier,
            turns: TurnLocks::default(),
            shutdown,
        })
    }

    /// Cancel in-flight turns and refuse new ones.
    pub fn close(&self) {
        if !self.shutdown.send_replace(true) {
            info!("🛑 Engine closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn set_activation_target(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.db.set_setting(key, value)?;
        info!("✅ {} set to {}", key, value);
        Ok(())
    }

    pub fn get_activation_target(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        self.db.get_setting(key)
    }

    /// Forget a conversation's history.
    pub async fn reset_conversation(&self, conversation_id: &str) -> Result<bool, DatabaseError> {
        let _turn = self.turns.acquire(conversation_id).await;
        self.store.purge(conversation_id)
    }

    pub async fn handle_turn(&self, conversation_id: &str, raw_text: &str) -> Reply {
        let span = info_span!("turn", conversation = %conversation_id);
        async {
            if self.is_closed() {
                warn!("Turn rejected, engine is closed");
                return self.failure(&self.settings.shutdown_message);
            }

            let mut shutdown = self.shutdown.subscribe();
            tokio::select! {
                reply = self.run_turn(conversation_id, raw_text) => reply,
                _ = wait_closed(&mut shutdown) => {
                    warn!("Turn cancelled by shutdown");
                    self.failure(&self.settings.shutdown_message)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_turn(&self, conversation_id: &str, raw_text: &str) -> Reply {
        let intent = self.classifier.classify(raw_text);
        debug!("Intent: {} ({} chars)", intent.capability, intent.payload.chars().count());

        match intent.capability {
            Capability::Image if intent.is_empty_image_prompt() => {
                info!("Image request without a description");
                self.text(&self.settings.empty_prompt_message)
            }
            Capability::Image => self.image_turn(&intent.payload).await,
            Capability::Text if intent.payload.is_empty() => Reply::Text { segments: Vec::new() },
            Capability::Text => {
                let _turn = self.turns.acquire(conversation_id).await;
                self.text_turn(conversation_id, &intent.payload).await
            }
        }
    }

    async fn text_turn(&self, conversation_id: &str, text: &str) -> Reply {
        let window = self.settings.history_window;
        let thread = match self.store.append_and_trim(
            conversation_id,
            Message::user(text),
            &self.settings.system_prompt,
            window,
        ) {
            Ok(thread) => thread,
            Err(e) => {
                error!("Failed to load history: {e}");
                return self.failure(&self.settings.error_message);
            }
        };

        let request = Request::Chat(self.request_messages(&thread, text));
        let result = match self.orchestrator.call(Capability::Text, &request).await {
            Ok(result) => result,
            Err(exhausted) => {
                error!("No reply: {exhausted}");
                return self.failure(&self.settings.busy_message);
            }
        };

        let Some(answer) = result.payload.into_text() else {
            error!("{} returned a non-text payload", result.source_provider);
            return self.failure(&self.settings.busy_message);
        };

        let mut thread = thread;
        thread.push(Message::assistant(answer.clone()), window);
        // The turn is only complete once history is durable.
        if let Err(e) = self.store.persist(conversation_id, &thread) {
            error!("Failed to save history: {e}");
        }

        info!("💬 Reply from {} ({} chars)", result.source_provider, answer.chars().count());
        self.text(&answer)
    }

    async fn image_turn(&self, prompt: &str) -> Reply {
        match self.images.generate(prompt).await {
            Ok(image) => Reply::Image {
                bytes: image.bytes,
                engine: image.engine,
            },
            Err(exhausted) => {
                error!("No image: {exhausted}");
                self.failure(&self.settings.image_failed_message)
            }
        }
    }

    /// Messages sent to the provider: the stored thread, with the creator
    /// note added to the system message on a new thread or when asked.
    fn request_messages(&self, thread: &ConversationThread, user_text: &str) -> Vec<Message> {
        let mut messages = thread.messages().to_vec();
        let Some(note) = &self.settings.creator_note else {
            return messages;
        };

        let lowered = user_text.to_lowercase();
        let asked = self
            .settings
            .identity_keywords
            .iter()
            .any(|k| lowered.contains(&k.to_lowercase()));

        if asked || thread.turns() <= 2 {
            messages[0].content = format!("{}\n{}", messages[0].content, note);
        }
        messages
    }

    fn text(&self, text: &str) -> Reply {
        Reply::Text {
            segments: chunk(text, self.settings.max_message_chars),
        }
    }

    fn failure(&self, message: &str) -> Reply {
        Reply::Failure {
            message: message.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn locked_threads(&self) -> usize {
        self.turns.len()
    }
}

async fn wait_closed(shutdown: &mut watch::Receiver<bool>) {
    // The sender lives as long as the engine, so an error cannot outlive it.
    let _ = shutdown.wait_for(|closed| *closed).await;
}
