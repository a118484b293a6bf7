//! Runner — retry wrapper above the executor
//!
//! The executor itself never retries. The runner re-dispatches runs that
//! failed with a transient provider error, backing off exponentially up to
//! an attempt cap. Cancellation and timeouts are never retried.

use crate::executor::{ExecuteOptions, Executor, RETRYABLE_KEY};
use redprobe_core::{Template, TemplateResult, TemplateStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^attempt, capped.
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

pub struct Runner {
    executor: Arc<Executor>,
    policy: RetryPolicy,
}

impl Runner {
    pub fn new(executor: Arc<Executor>, policy: RetryPolicy) -> Self {
        Self { executor, policy }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Execute with retries on whitelisted transient failures.
    pub async fn run(
        &self,
        template: &Template,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> TemplateResult {
        let mut attempt = 0u32;
        loop {
            let result = self.executor.execute(template, options, cancel).await;
            attempt += 1;
            if result.status != TemplateStatus::Failed
                || attempt >= self.policy.max_attempts
                || !is_retryable(&result)
                || cancel.is_cancelled()
            {
                return result;
            }
            let delay = self.delay_for_attempt(attempt - 1);
            info!(
                template = %template.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return result,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.policy.delay_for(attempt)
    }
}

fn is_retryable(result: &TemplateResult) -> bool {
    result
        .details
        .get(RETRYABLE_KEY)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubBehavior, StubProvider};
    use redprobe_core::Severity;

    fn template(id: &str) -> Template {
        Template {
            id: id.into(),
            name: "T".into(),
            version: "1.0".into(),
            description: String::new(),
            category: String::new(),
            severity: Severity::Info,
            tags: vec![],
            variables: Default::default(),
            prompt: "ping".into(),
            detection: vec![],
            metadata: Default::default(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_to_success() {
        let stub = Arc::new(StubProvider::sequence(vec![
            StubBehavior::FailTransient("overloaded".into()),
            StubBehavior::FailTransient("overloaded".into()),
            StubBehavior::Respond("ok".into()),
        ]));
        let runner = Runner::new(Arc::new(Executor::new(stub.clone())), fast_policy());
        let result = runner
            .run(
                &template("probe_v1.0"),
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status, TemplateStatus::Completed);
        assert_eq!(stub.call_count(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let stub = Arc::new(StubProvider::sequence(vec![StubBehavior::Fail(
            "bad request".into(),
        )]));
        let runner = Runner::new(Arc::new(Executor::new(stub.clone())), fast_policy());
        let result = runner
            .run(
                &template("probe_v1.0"),
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status, TemplateStatus::Failed);
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn attempt_cap_is_honored() {
        let stub = Arc::new(StubProvider::sequence(vec![
            StubBehavior::FailTransient("x".into()),
            StubBehavior::FailTransient("x".into()),
            StubBehavior::FailTransient("x".into()),
            StubBehavior::FailTransient("x".into()),
        ]));
        let runner = Runner::new(Arc::new(Executor::new(stub.clone())), fast_policy());
        let result = runner
            .run(
                &template("probe_v1.0"),
                &ExecuteOptions::default(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status, TemplateStatus::Failed);
        assert_eq!(stub.call_count(), 3);
    }

    #[tokio::test]
    async fn cancellation_is_never_retried() {
        let stub = Arc::new(StubProvider::constant("ok"));
        let runner = Runner::new(Arc::new(Executor::new(stub.clone())), fast_policy());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = runner
            .run(&template("probe_v1.0"), &ExecuteOptions::default(), &cancel)
            .await;
        assert_eq!(result.status, TemplateStatus::Failed);
        assert_eq!(stub.call_count(), 0);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
    }
}
