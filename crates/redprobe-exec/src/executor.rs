//! Executor — runs one resolved template against a provider
//!
//! Per-run contract: clone + resolve variables, pre-hooks in order, provider
//! dispatch, detection + scoring, then post-hooks (non-fatal). Every exit
//! path leaves the result in a terminal state.

use crate::hooks::HookChain;
use crate::provider::{Provider, ProviderError};
use redprobe_core::{
    DetectionRule, DetectionType, Error, Result, Template, TemplateResult, TemplateStatus,
};
use redprobe_template::parser;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Detail key carrying the non-fatal post-hook failure.
pub const POST_HOOK_ERROR_KEY: &str = "postHookError";
/// Detail keys consumed by the retrying runner.
pub const ERROR_KIND_KEY: &str = "error_kind";
pub const RETRYABLE_KEY: &str = "retryable";

#[derive(Clone, Debug)]
pub struct ExecuteOptions {
    pub variables: HashMap<String, String>,
    pub provider: crate::provider::ProviderOptions,
    /// Per-execution deadline; the caller's token may be stricter.
    pub timeout: Option<Duration>,
    /// Batch-level bound on outstanding provider calls.
    pub concurrency_limit: usize,
    /// Cancel batch siblings on the first failure.
    pub fail_fast: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
            provider: Default::default(),
            timeout: None,
            concurrency_limit: 4,
            fail_fast: false,
        }
    }
}

/// Maps (template, response, detected) to a 0..=100 score.
pub type Scorer = Arc<dyn Fn(&Template, &str, bool) -> u32 + Send + Sync>;

fn default_scorer() -> Scorer {
    Arc::new(|_, _, detected| if detected { 100 } else { 0 })
}

pub struct Executor {
    provider: Arc<dyn Provider>,
    hooks: HookChain,
    scorer: Scorer,
}

impl Executor {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            hooks: HookChain::new(),
            scorer: default_scorer(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Run a single template. Errors are folded into the returned result;
    /// this never panics and always terminates in Completed or Failed.
    pub async fn execute(
        &self,
        template: &Template,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> TemplateResult {
        let mut result = TemplateResult::new(&template.id, template.severity);
        result.category = template.category.clone();

        let resolved = match parser::resolve_variables(template, &options.variables) {
            Ok(t) => t,
            Err(e) => {
                return fail_with(result, e, "variable_resolution", false);
            }
        };
        result.mark_validated();
        result.start();

        if cancel.is_cancelled() {
            return fail_with(result, Error::Cancelled, "cancelled", false);
        }

        for hook in self.hooks.pre() {
            if let Err(e) = hook.run(&resolved, &mut result).await {
                let err = Error::hook(&template.id, "pre", e.to_string());
                return fail_with(result, err, "pre_hook", false);
            }
        }

        let call = self
            .provider
            .send_prompt(&resolved.prompt, &options.provider, cancel.clone());
        let provider_result = match options.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(r) => r,
                Err(_) => {
                    return fail_with(result, Error::Timeout(deadline), "timeout", false);
                }
            },
            None => call.await,
        };

        let response = match provider_result {
            Ok(r) => r,
            Err(ProviderError::Cancelled) => {
                return fail_with(result, Error::Cancelled, "cancelled", false);
            }
            Err(e) => {
                let retryable = e.is_transient();
                let err = Error::execution(&template.id, "provider", e.to_string());
                return fail_with(result, err, "provider", retryable);
            }
        };

        result.response = Some(response.content.clone());
        match evaluate_detection(&template.id, &resolved.detection, &response.content) {
            Ok(detected) => {
                result.detected = detected;
                result.set_score((self.scorer)(&resolved, &response.content, detected));
            }
            Err(e) => {
                return fail_with(result, e, "detection", false);
            }
        }

        for hook in self.hooks.post() {
            if let Err(e) = hook.run(&resolved, &mut result).await {
                warn!(template = %template.id, hook = hook.name(), error = %e, "post-hook failed");
                result.annotate(POST_HOOK_ERROR_KEY, serde_json::json!(e.to_string()));
            }
        }

        result.complete();
        debug!(
            template = %template.id,
            detected = result.detected,
            score = result.score,
            duration_ms = result.duration_ms,
            "execution complete"
        );
        result
    }

    /// Run a batch. Results come back positionally aligned with the input
    /// regardless of completion order. Items that never acquire a permit
    /// before cancellation are reported Failed with a cancellation error.
    pub async fn execute_batch(
        &self,
        templates: &[Arc<Template>],
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> Vec<TemplateResult> {
        let semaphore = Arc::new(Semaphore::new(options.concurrency_limit.max(1)));
        let batch_cancel = cancel.child_token();

        let runs = templates.iter().map(|template| {
            let semaphore = semaphore.clone();
            let token = batch_cancel.clone();
            async move {
                let _permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        let mut skipped = TemplateResult::new(&template.id, template.severity);
                        skipped.category = template.category.clone();
                        return fail_with(skipped, Error::Cancelled, "cancelled", false);
                    }
                    permit = semaphore.acquire() => match permit {
                        Ok(p) => p,
                        Err(_) => {
                            let mut skipped = TemplateResult::new(&template.id, template.severity);
                            skipped.category = template.category.clone();
                            return fail_with(skipped, Error::Cancelled, "cancelled", false);
                        }
                    },
                };
                let result = self.execute(template, options, &token).await;
                if options.fail_fast && result.status == TemplateStatus::Failed {
                    token.cancel();
                }
                result
            }
        });
        futures::future::join_all(runs).await
    }
}

fn fail_with(
    mut result: TemplateResult,
    error: Error,
    kind: &str,
    retryable: bool,
) -> TemplateResult {
    result.annotate(ERROR_KIND_KEY, serde_json::json!(kind));
    result.annotate(RETRYABLE_KEY, serde_json::json!(retryable));
    result.fail(error);
    result
}

/// A template is `detected` when any rule matches the response.
pub fn evaluate_detection(
    template_id: &str,
    rules: &[DetectionRule],
    response: &str,
) -> Result<bool> {
    for rule in rules {
        let matched = match rule.rule_type {
            DetectionType::Contains => contains(rule, response),
            DetectionType::NotContains => !contains(rule, response),
            DetectionType::Regex => regex::RegexBuilder::new(&rule.value)
                .case_insensitive(!rule.case_sensitive)
                .build()
                .map_err(|e| {
                    Error::execution(
                        template_id,
                        "detection",
                        format!("invalid detection regex '{}': {}", rule.value, e),
                    )
                })?
                .is_match(response),
        };
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}

fn contains(rule: &DetectionRule, response: &str) -> bool {
    if rule.case_sensitive {
        response.contains(&rule.value)
    } else {
        response
            .to_lowercase()
            .contains(&rule.value.to_lowercase())
    }
}
