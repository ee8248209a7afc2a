//! AI backends behind one capability contract, plus the fallback orchestrator.

pub mod cloudflare;
pub mod error;
pub mod groq;
pub mod http;
pub mod huggingface;
pub mod orchestrator;
pub mod pollinations;
pub mod registry;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::chatbot::message::Message;

pub use error::{FailureClass, ProviderError, ProviderErrorKind};
pub use orchestrator::{
    CapabilityExhausted, Orchestrated, OrchestrationResult, Orchestrator, ProviderFailure,
    RetryPolicy,
};
pub use registry::ProviderRegistry;

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default time budget for a chat completion.
pub const DEFAULT_TEXT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default time budget for an image generation.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// A category of AI function with its own fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Text,
    Image,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Input handed to a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Ordered chat messages, system message first.
    Chat(Vec<Message>),
    /// A single image-generation prompt.
    Image(String),
}

impl Request {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Chat(_) => Capability::Text,
            Self::Image(_) => Capability::Image,
        }
    }
}

/// Output returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Image(Vec<u8>),
}

impl Payload {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image(_) => None,
        }
    }

    pub fn into_image(self) -> Option<Vec<u8>> {
        match self {
            Self::Image(bytes) => Some(bytes),
            Self::Text(_) => None,
        }
    }
}

/// A conversational text backend.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;

    fn timeout(&self) -> Duration {
        DEFAULT_TEXT_TIMEOUT
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
    ) -> ProviderFuture<'a, Result<String, ProviderError>>;

    fn classify_error(&self, error: &ProviderError) -> FailureClass {
        error.class()
    }
}

/// An image generation backend.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn timeout(&self) -> Duration {
        DEFAULT_IMAGE_TIMEOUT
    }

    /// Payloads of this size or smaller are treated as placeholders.
    fn min_payload_bytes(&self) -> usize;

    fn generate<'a>(&'a self, prompt: &'a str)
    -> ProviderFuture<'a, Result<Vec<u8>, ProviderError>>;

    fn classify_error(&self, error: &ProviderError) -> FailureClass {
        error.class()
    }
}

/// One registered backend, either text or image.
#[derive(Clone)]
pub enum ProviderDescriptor {
    Text(Arc<dyn TextProvider>),
    Image(Arc<dyn ImageProvider>),
}

impl ProviderDescriptor {
    pub fn text<P: TextProvider + 'static>(provider: P) -> Self {
        Self::Text(Arc::new(provider))
    }

    pub fn image<P: ImageProvider + 'static>(provider: P) -> Self {
        Self::Image(Arc::new(provider))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Text(p) => p.name(),
            Self::Image(p) => p.name(),
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Text(_) => Capability::Text,
            Self::Image(_) => Capability::Image,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Self::Text(p) => p.timeout(),
            Self::Image(p) => p.timeout(),
        }
    }

    /// Run the backend once. Image payloads are checked against the
    /// provider's minimum size before they count as a success.
    pub async fn invoke(&self, request: &Request) -> Result<Payload, ProviderError> {
        match (self, request) {
            (Self::Text(p), Request::Chat(messages)) => {
                p.complete(messages).await.map(Payload::Text)
            }
            (Self::Image(p), Request::Image(prompt)) => {
                let bytes = p.generate(prompt).await?;
                let min = p.min_payload_bytes();
                if bytes.len() <= min {
                    return Err(ProviderError::invalid_payload(format!(
                        "image is {} bytes, expected more than {}",
                        bytes.len(),
                        min
                    )));
                }
                Ok(Payload::Image(bytes))
            }
            _ => Err(ProviderError::invalid_request(format!(
                "{} provider cannot serve a {} request",
                self.capability(),
                request.capability()
            ))),
        }
    }

    pub fn classify_error(&self, error: &ProviderError) -> FailureClass {
        match self {
            Self::Text(p) => p.classify_error(error),
            Self::Image(p) => p.classify_error(error),
        }
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name())
            .field("capability", &self.capability())
            .finish()
    }
}
