//! Shared reqwest plumbing: client construction and error mapping.

use std::time::Duration;

use reqwest::StatusCode;

use super::ProviderError;

/// Max chars of a response body kept in an error message.
const MAX_BODY_IN_ERROR: usize = 200;

pub fn client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::transport(format!("failed to build HTTP client: {e}")))
}

/// Map a non-success HTTP status to a provider error.
pub fn status_error(status: StatusCode, body: &str) -> ProviderError {
    let body: String = body.chars().take(MAX_BODY_IN_ERROR).collect();
    let message = format!("API error {status}: {body}");
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::PAYMENT_REQUIRED => {
            ProviderError::authentication(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::timeout(message),
        s if s.is_server_error() => ProviderError::unavailable(message),
        _ => ProviderError::invalid_request(message),
    }
}

pub fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout(format!("HTTP timeout: {e}"))
    } else if e.is_decode() || e.is_body() {
        ProviderError::malformed(format!("failed to read response: {e}"))
    } else {
        ProviderError::transport(format!("HTTP error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorKind;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StatusCode::TOO_MANY_REQUESTS, ProviderErrorKind::RateLimited),
            (StatusCode::UNAUTHORIZED, ProviderErrorKind::Authentication),
            (StatusCode::FORBIDDEN, ProviderErrorKind::Authentication),
            (StatusCode::BAD_REQUEST, ProviderErrorKind::InvalidRequest),
            (StatusCode::NOT_FOUND, ProviderErrorKind::InvalidRequest),
            (StatusCode::GATEWAY_TIMEOUT, ProviderErrorKind::Timeout),
            (StatusCode::SERVICE_UNAVAILABLE, ProviderErrorKind::Unavailable),
            (StatusCode::INTERNAL_SERVER_ERROR, ProviderErrorKind::Unavailable),
        ];
        for (status, kind) in cases {
            assert_eq!(status_error(status, "").kind, kind, "{status}");
        }
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let err = status_error(StatusCode::BAD_REQUEST, &"e".repeat(5000));
        assert!(err.message.len() < 300);
    }
}
