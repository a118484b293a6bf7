//! StubProvider — deterministic responses for tests and dry runs

use crate::provider::{Provider, ProviderError, ProviderOptions, ProviderResponse, ProviderResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scripted behavior for one call.
#[derive(Clone, Debug)]
pub enum StubBehavior {
    /// Respond with this content.
    Respond(String),
    /// Respond after sleeping.
    RespondAfter { content: String, latency: Duration },
    /// Fail with a transient error.
    FailTransient(String),
    /// Fail with a permanent error.
    Fail(String),
}

/// A sequence of behaviors — each call pops the next one. When exhausted,
/// every further call returns the default response.
pub struct StubProvider {
    behaviors: Mutex<Vec<StubBehavior>>,
    default_response: String,
    default_latency: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubProvider {
    /// Always answer with `response` immediately.
    pub fn constant(response: impl Into<String>) -> Self {
        Self {
            behaviors: Mutex::new(Vec::new()),
            default_response: response.into(),
            default_latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Consume `behaviors` in order, then fall back to an empty response.
    pub fn sequence(behaviors: Vec<StubBehavior>) -> Self {
        Self {
            behaviors: Mutex::new(behaviors),
            default_response: String::new(),
            default_latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fixed latency applied to the default response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_behavior(&self) -> StubBehavior {
        let mut behaviors = self.behaviors.lock().unwrap_or_else(|e| e.into_inner());
        if behaviors.is_empty() {
            StubBehavior::RespondAfter {
                content: self.default_response.clone(),
                latency: self.default_latency,
            }
        } else {
            behaviors.remove(0)
        }
    }
}

#[async_trait::async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn send_prompt(
        &self,
        prompt: &str,
        _options: &ProviderOptions,
        cancel: CancellationToken,
    ) -> ProviderResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        let (content, latency) = match self.next_behavior() {
            StubBehavior::Respond(content) => (content, Duration::ZERO),
            StubBehavior::RespondAfter { content, latency } => (content, latency),
            StubBehavior::FailTransient(message) => {
                return Err(ProviderError::Status {
                    code: 503,
                    message,
                })
            }
            StubBehavior::Fail(message) => return Err(ProviderError::RequestFailed(message)),
        };

        if !latency.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        Ok(ProviderResponse {
            content,
            model: Some("stub".to_string()),
            tokens: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn constant_response_and_prompt_recording() {
        let stub = StubProvider::constant("pong");
        let cancel = CancellationToken::new();
        let response = stub
            .send_prompt("ping", &ProviderOptions::default(), cancel)
            .await
            .unwrap();
        assert_eq!(response.content, "pong");
        assert_eq!(stub.call_count(), 1);
        assert_eq!(stub.prompts(), vec!["ping"]);
    }

    #[tokio::test]
    async fn sequence_then_default() {
        let stub = StubProvider::sequence(vec![
            StubBehavior::Respond("first".into()),
            StubBehavior::Fail("boom".into()),
        ]);
        let cancel = CancellationToken::new();
        let opts = ProviderOptions::default();
        assert_eq!(
            stub.send_prompt("a", &opts, cancel.clone()).await.unwrap().content,
            "first"
        );
        assert!(stub.send_prompt("b", &opts, cancel.clone()).await.is_err());
        assert_eq!(stub.send_prompt("c", &opts, cancel).await.unwrap().content, "");
    }

    #[tokio::test]
    async fn cancellation_interrupts_latency() {
        let stub = StubProvider::constant("slow").with_latency(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = stub
            .send_prompt("x", &ProviderOptions::default(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }
}
