//! Hugging Face inference (FLUX.1-schnell) image provider.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::{ImageProvider, ProviderError, ProviderFuture, http};

pub const HUGGINGFACE_API_URL: &str =
    "https://router.huggingface.co/hf-inference/models/black-forest-labs/FLUX.1-schnell";

pub struct HuggingFaceImage {
    api_key: Option<String>,
    min_bytes: usize,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

impl HuggingFaceImage {
    pub fn new(api_key: Option<String>, min_bytes: usize, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            min_bytes,
            timeout,
            http: http::client(timeout)?,
        })
    }

    async fn infer(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::authentication("HF_API_KEY is not set"))?;

        let response = self
            .http
            .post(HUGGINGFACE_API_URL)
            .bearer_auth(api_key)
            .json(&InferenceRequest { inputs: prompt })
            .send()
            .await
            .map_err(http::request_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(http::request_error)?;
        debug!("Hugging Face response status: {status}, {} bytes", body.len());

        if !status.is_success() {
            return Err(http::status_error(status, &String::from_utf8_lossy(&body)));
        }
        // Errors sometimes come back as 200 with a JSON body.
        if body.first() == Some(&b'{') {
            return Err(ProviderError::malformed(format!(
                "expected image bytes, got JSON: {}",
                String::from_utf8_lossy(&body).chars().take(200).collect::<String>()
            )));
        }
        Ok(body.to_vec())
    }
}

impl ImageProvider for HuggingFaceImage {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn min_payload_bytes(&self) -> usize {
        self.min_bytes
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> ProviderFuture<'a, Result<Vec<u8>, ProviderError>> {
        Box::pin(self.infer(prompt))
    }
}
