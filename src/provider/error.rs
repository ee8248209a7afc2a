//! Provider error values and their failure classes.

use std::fmt;

/// What went wrong in a single provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// HTTP 429 or an equivalent quota signal.
    RateLimited,
    /// The call exceeded its time budget.
    Timeout,
    /// Connection or transport failure.
    Transport,
    /// Backend answered 5xx or is loading.
    Unavailable,
    /// Body could not be parsed or held no usable result.
    MalformedResponse,
    /// Result was returned but failed a validity check.
    InvalidPayload,
    /// Credentials missing or rejected.
    Authentication,
    /// The backend rejected the request shape.
    InvalidRequest,
}

/// How the orchestrator reacts to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry the same provider after a short backoff.
    RateLimited,
    /// Move on to the next provider.
    Transient,
    /// Move on to the next provider and log loudly.
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedResponse, message)
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidPayload, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Authentication, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, message)
    }

    /// Default classification shared by every built-in provider.
    pub fn class(&self) -> FailureClass {
        match self.kind {
            ProviderErrorKind::RateLimited => FailureClass::RateLimited,
            ProviderErrorKind::Timeout
            | ProviderErrorKind::Transport
            | ProviderErrorKind::Unavailable
            | ProviderErrorKind::MalformedResponse
            | ProviderErrorKind::InvalidPayload => FailureClass::Transient,
            ProviderErrorKind::Authentication | ProviderErrorKind::InvalidRequest => {
                FailureClass::Fatal
            }
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProviderError {}
