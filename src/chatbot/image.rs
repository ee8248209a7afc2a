//! Two-stage image generation: prompt enhancement, then validated generation.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chatbot::message::Message;
use crate::provider::{Capability, CapabilityExhausted, Orchestrator, Payload, Request};

/// Instruction used to rewrite a raw request before generation.
pub const ENHANCE_INSTRUCTION: &str = "Rewrite the user's request as a single detailed English \
     image-generation prompt. Output only the prompt text.";

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// Name of the image provider that produced it.
    pub engine: String,
    /// Prompt actually sent to the image providers.
    pub prompt: String,
}

pub struct ImageGenerationPipeline {
    orchestrator: Arc<Orchestrator>,
}

impl ImageGenerationPipeline {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn generate(&self, raw_prompt: &str) -> Result<GeneratedImage, CapabilityExhausted> {
        let prompt = self.enhance(raw_prompt).await;
        info!("🎨 Generating image: {}", prompt);

        let result = self
            .orchestrator
            .call(Capability::Image, &Request::Image(prompt.clone()))
            .await?;

        match result.payload {
            Payload::Image(bytes) => {
                info!("🎨 Image from {}: {} bytes", result.source_provider, bytes.len());
                Ok(GeneratedImage {
                    bytes,
                    engine: result.source_provider,
                    prompt,
                })
            }
            Payload::Text(_) => {
                warn!("{} returned text for an image request", result.source_provider);
                Err(CapabilityExhausted {
                    capability: Capability::Image,
                    failures: result.failures,
                })
            }
        }
    }

    /// Never fails: any problem falls back to the raw prompt.
    pub async fn enhance(&self, raw_prompt: &str) -> String {
        let request = Request::Chat(vec![
            Message::system(ENHANCE_INSTRUCTION),
            Message::user(raw_prompt),
        ]);

        match self.orchestrator.call(Capability::Text, &request).await {
            Ok(result) => match result.payload.into_text() {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => {
                    warn!("Prompt enhancement by {} was empty, using raw prompt", result.source_provider);
                    raw_prompt.to_string()
                }
            },
            Err(e) => {
                warn!("Prompt enhancement failed, using raw prompt: {e}");
                raw_prompt.to_string()
            }
        }
    }
}
