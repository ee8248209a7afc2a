//! Ordered fallback across a capability's providers.
//!
//! Providers are tried in registry order and the first success wins. Only
//! rate-limit failures are retried on the same provider, with a fixed
//! backoff; every other failure moves straight to the next provider.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{Capability, FailureClass, Payload, ProviderError, ProviderRegistry, Request};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts on a rate-limited provider before falling through.
    pub max_retries_per_provider: u32,
    /// Fixed pause between those attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries_per_provider: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Why one provider was given up on.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub class: FailureClass,
    pub error: ProviderError,
    /// Calls made to this provider, retries included.
    pub attempts: u32,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} attempt(s)): {}",
            self.provider, self.class, self.attempts, self.error
        )
    }
}

/// A successful orchestration.
#[derive(Debug, Clone, PartialEq)]
pub struct Orchestrated {
    pub payload: Payload,
    pub source_provider: String,
    /// Providers that failed before the winner, in the order tried.
    pub failures: Vec<ProviderFailure>,
}

/// Every provider of a capability failed.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityExhausted {
    pub capability: Capability,
    pub failures: Vec<ProviderFailure>,
}

impl fmt::Display for CapabilityExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} providers failed", self.capability)?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CapabilityExhausted {}

pub type OrchestrationResult = Result<Orchestrated, CapabilityExhausted>;

pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke with the configured retry budget.
    pub async fn call(&self, capability: Capability, request: &Request) -> OrchestrationResult {
        self.invoke(capability, request, self.policy.max_retries_per_provider)
            .await
    }

    pub async fn invoke(
        &self,
        capability: Capability,
        request: &Request,
        max_retries_per_provider: u32,
    ) -> OrchestrationResult {
        let mut failures = Vec::new();

        for provider in self.registry.providers_for(capability) {
            let name = provider.name();
            let budget = provider.timeout();
            let mut attempts = 0;

            loop {
                attempts += 1;
                debug!("→ {capability} via {name} (attempt {attempts})");

                let outcome = match timeout(budget, provider.invoke(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::timeout(format!(
                        "no answer within {}ms",
                        budget.as_millis()
                    ))),
                };

                let error = match outcome {
                    Ok(payload) => {
                        info!("✅ {capability} answered by {name} (attempt {attempts})");
                        return Ok(Orchestrated {
                            payload,
                            source_provider: name.to_string(),
                            failures,
                        });
                    }
                    Err(error) => error,
                };

                let class = provider.classify_error(&error);
                if class == FailureClass::RateLimited && attempts <= max_retries_per_provider {
                    warn!(
                        "⏳ {name} rate limited for {capability}, retrying in {}ms: {error}",
                        self.policy.backoff.as_millis()
                    );
                    sleep(self.policy.backoff).await;
                    continue;
                }

                match class {
                    FailureClass::Fatal => {
                        error!("{name} failed fatally for {capability}: {error}")
                    }
                    _ => warn!("{name} failed for {capability} ({class}): {error}"),
                }

                failures.push(ProviderFailure {
                    provider: name.to_string(),
                    class,
                    error,
                    attempts,
                });
                break;
            }
        }

        let exhausted = CapabilityExhausted {
            capability,
            failures,
        };
        error!("{exhausted}");
        Err(exhausted)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::chatbot::message::Message;
    use crate::provider::{ProviderDescriptor, ProviderFuture, TextProvider};

    /// Replays a script of outcomes; the last one repeats forever.
    struct Scripted {
        name: &'static str,
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        last: Result<String, ProviderError>,
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    impl Scripted {
        fn new(name: &'static str, outcomes: Vec<Result<String, ProviderError>>) -> Self {
            let last = outcomes
                .last()
                .cloned()
                .unwrap_or_else(|| Ok(String::new()));
            Self {
                name,
                script: Mutex::new(outcomes.into()),
                last,
                calls: Arc::new(AtomicU32::new(0)),
                delay: Duration::ZERO,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl TextProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        fn complete<'a>(
            &'a self,
            _messages: &'a [Message],
        ) -> ProviderFuture<'a, Result<String, ProviderError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    sleep(self.delay).await;
                }
                let next = self.script.lock().unwrap().pop_front();
                next.unwrap_or_else(|| self.last.clone())
            })
        }
    }

    fn orchestrator(providers: Vec<Scripted>) -> Orchestrator {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(ProviderDescriptor::text(provider));
        }
        Orchestrator::new(
            Arc::new(registry),
            RetryPolicy {
                max_retries_per_provider: 2,
                backoff: Duration::ZERO,
            },
        )
    }

    fn chat() -> Request {
        Request::Chat(vec![Message::system("sys"), Message::user("hi")])
    }

    #[tokio::test]
    async fn test_falls_back_in_order_and_retries_rate_limits() {
        let a = Scripted::new("a", vec![Err(ProviderError::rate_limited("429"))]);
        let b = Scripted::new("b", vec![Ok("never".into())]).slow(Duration::from_secs(5));
        let c = Scripted::new("c", vec![Ok("from c".into())]);
        let (a_calls, b_calls, c_calls) = (a.calls.clone(), b.calls.clone(), c.calls.clone());

        let result = orchestrator(vec![a, b, c])
            .invoke(Capability::Text, &chat(), 2)
            .await
            .unwrap();

        assert_eq!(result.payload, Payload::Text("from c".into()));
        assert_eq!(result.source_provider, "c");
        assert_eq!(a_calls.load(Ordering::SeqCst), 3);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 1);

        let failed: Vec<(&str, FailureClass, u32)> = result
            .failures
            .iter()
            .map(|f| (f.provider.as_str(), f.class, f.attempts))
            .collect();
        assert_eq!(
            failed,
            [
                ("a", FailureClass::RateLimited, 3),
                ("b", FailureClass::Transient, 1)
            ]
        );
        assert_eq!(result.failures[1].error.kind, crate::provider::ProviderErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let a = Scripted::new("a", vec![Ok("from a".into())]);
        let b = Scripted::new("b", vec![Ok("from b".into())]);
        let b_calls = b.calls.clone();

        let result = orchestrator(vec![a, b]).call(Capability::Text, &chat()).await.unwrap();

        assert_eq!(result.source_provider, "a");
        assert!(result.failures.is_empty());
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_recovers_on_same_provider() {
        let a = Scripted::new(
            "a",
            vec![Err(ProviderError::rate_limited("429")), Ok("second try".into())],
        );
        let a_calls = a.calls.clone();

        let result = orchestrator(vec![a]).call(Capability::Text, &chat()).await.unwrap();

        assert_eq!(result.payload, Payload::Text("second try".into()));
        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_and_fatal_are_not_retried() {
        let a = Scripted::new("a", vec![Err(ProviderError::unavailable("503"))]);
        let b = Scripted::new("b", vec![Err(ProviderError::authentication("no key"))]);
        let (a_calls, b_calls) = (a.calls.clone(), b.calls.clone());

        let exhausted = orchestrator(vec![a, b])
            .call(Capability::Text, &chat())
            .await
            .unwrap_err();

        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(exhausted.capability, Capability::Text);
        let classes: Vec<FailureClass> = exhausted.failures.iter().map(|f| f.class).collect();
        assert_eq!(classes, [FailureClass::Transient, FailureClass::Fatal]);
        assert!(exhausted.to_string().contains("all text providers failed"));
    }

    #[tokio::test]
    async fn test_zero_retries_moves_on_after_one_rate_limit() {
        let a = Scripted::new("a", vec![Err(ProviderError::rate_limited("429"))]);
        let b = Scripted::new("b", vec![Ok("b".into())]);
        let a_calls = a.calls.clone();

        let result = orchestrator(vec![a, b])
            .invoke(Capability::Text, &chat(), 0)
            .await
            .unwrap();

        assert_eq!(result.source_provider, "b");
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_capability_is_exhausted_immediately() {
        let exhausted = orchestrator(vec![])
            .call(Capability::Image, &Request::Image("x".into()))
            .await
            .unwrap_err();
        assert!(exhausted.failures.is_empty());
    }
}
