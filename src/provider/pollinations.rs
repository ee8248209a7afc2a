//! Pollinations: credential-free image endpoint, the open fallback tier.

use std::time::Duration;

use tracing::debug;

use super::{ImageProvider, ProviderError, ProviderFuture, http};

pub const POLLINATIONS_BASE_URL: &str = "https://image.pollinations.ai/prompt/";

pub struct PollinationsImage {
    min_bytes: usize,
    timeout: Duration,
    http: reqwest::Client,
}

impl PollinationsImage {
    pub fn new(min_bytes: usize, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            min_bytes,
            timeout,
            http: http::client(timeout)?,
        })
    }

    async fn fetch(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        let url = image_url(prompt, random_seed());
        let response = self.http.get(&url).send().await.map_err(http::request_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(http::request_error)?;
        debug!("Pollinations response status: {status}, {} bytes", body.len());

        if !status.is_success() {
            return Err(http::status_error(status, &String::from_utf8_lossy(&body)));
        }
        Ok(body.to_vec())
    }
}

pub fn image_url(prompt: &str, seed: u32) -> String {
    format!(
        "{POLLINATIONS_BASE_URL}{}?width=1024&height=1024&seed={seed}&model=flux&nologo=true",
        urlencoding::encode(prompt)
    )
}

/// Seed in `1..=1_000_000_000` from the clock; uniqueness per call is all that matters.
fn random_seed() -> u32 {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    (nanos.unsigned_abs() % 1_000_000_000) as u32 + 1
}

impl ImageProvider for PollinationsImage {
    fn name(&self) -> &str {
        "pollinations"
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
        Box::pin(self.fetch(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_prompt() {
        let url = image_url("a cat & a dog", 42);
        assert_eq!(
            url,
            "https://image.pollinations.ai/prompt/a%20cat%20%26%20a%20dog?width=1024&height=1024&seed=42&model=flux&nologo=true"
        );
    }

    #[test]
    fn test_seed_range() {
        let seed = random_seed();
        assert!((1..=1_000_000_000).contains(&seed));
    }
}
