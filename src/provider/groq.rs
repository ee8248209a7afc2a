//! Groq chat completions (OpenAI-compatible) as a text provider.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ProviderError, ProviderFuture, TextProvider, http};
use crate::chatbot::message::Message;

pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// One Groq model; register several to get a model fallback chain.
pub struct GroqChat {
    name: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout: Duration,
    url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl GroqChat {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        Ok(Self {
            name: format!("groq:{model}"),
            model,
            api_key: api_key.filter(|k| !k.is_empty()),
            temperature,
            timeout,
            url: GROQ_API_URL.to_string(),
            http: http::client(timeout)?,
        })
    }

    /// Point at another OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::authentication("GROQ_API_KEY is not set"))?;

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(http::request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(http::request_error)?;
        debug!("Groq {} response status: {status}", self.model);

        if !status.is_success() {
            return Err(http::status_error(status, &body));
        }
        parse_completion(&body)
    }
}

fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::malformed(format!("failed to parse completion: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ProviderError::malformed("completion has no content"))
}

impl TextProvider for GroqChat {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
    ) -> ProviderFuture<'a, Result<String, ProviderError>> {
        Box::pin(self.send(messages))
    }
}
