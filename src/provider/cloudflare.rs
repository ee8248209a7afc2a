//! Cloudflare Workers AI (flux-1-schnell) image provider.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ImageProvider, ProviderError, ProviderFuture, http};

pub const CLOUDFLARE_MODEL: &str = "@cf/black-forest-labs/flux-1-schnell";

pub struct CloudflareImage {
    account_id: Option<String>,
    api_token: Option<String>,
    min_bytes: usize,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct RunResponse {
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Deserialize)]
struct RunResult {
    image: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl CloudflareImage {
    pub fn new(
        account_id: Option<String>,
        api_token: Option<String>,
        min_bytes: usize,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            account_id: account_id.filter(|s| !s.is_empty()),
            api_token: api_token.filter(|s| !s.is_empty()),
            min_bytes,
            timeout,
            http: http::client(timeout)?,
        })
    }

    async fn run(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        let (Some(account_id), Some(api_token)) = (&self.account_id, &self.api_token) else {
            return Err(ProviderError::authentication(
                "CLOUDFLARE_ACCOUNT_ID / CLOUDFLARE_API_TOKEN are not set",
            ));
        };

        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{account_id}/ai/run/{CLOUDFLARE_MODEL}"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_token)
            .json(&RunRequest { prompt })
            .send()
            .await
            .map_err(http::request_error)?;

        let status = response.status();
        let is_image = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("image/"));
        let body = response.bytes().await.map_err(http::request_error)?;
        debug!("Cloudflare response status: {status}, {} bytes", body.len());

        if !status.is_success() {
            return Err(http::status_error(status, &String::from_utf8_lossy(&body)));
        }
        if is_image {
            return Ok(body.to_vec());
        }
        decode_run_response(&body)
    }
}

/// Workers AI wraps the image as base64 inside a JSON envelope.
fn decode_run_response(body: &[u8]) -> Result<Vec<u8>, ProviderError> {
    let parsed: RunResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::malformed(format!("failed to parse response: {e}")))?;

    if let Some(error) = parsed.errors.first() {
        return Err(ProviderError::malformed(format!("Cloudflare error: {}", error.message)));
    }

    let encoded = parsed
        .result
        .and_then(|r| r.image)
        .ok_or_else(|| ProviderError::malformed("no image in response"))?;

    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ProviderError::malformed(format!("failed to decode base64: {e}")))
}

impl ImageProvider for CloudflareImage {
    fn name(&self) -> &str {
        "cloudflare"
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
        Box::pin(self.run(prompt))
    }
}
