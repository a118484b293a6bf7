//! Execution hooks — user code run around every template dispatch
//!
//! Pre- and post-hook lists are separate, ordered, and frozen once the
//! executor is built; there is no runtime mutation.

use redprobe_core::{Result, Template, TemplateResult};
use std::sync::Arc;

/// A hook observes (and may annotate) a run.
///
/// Pre-hook errors abort the run; post-hook errors are recorded on the
/// result but never change its status.
#[async_trait::async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str {
        "hook"
    }

    async fn run(&self, template: &Template, result: &mut TemplateResult) -> Result<()>;
}

/// Adapter for plain closures.
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&Template, &mut TemplateResult) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait::async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&Template, &mut TemplateResult) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, template: &Template, result: &mut TemplateResult) -> Result<()> {
        (self.f)(template, result)
    }
}

/// Ordered pre/post hook lists.
#[derive(Clone, Default)]
pub struct HookChain {
    pre: Vec<Arc<dyn Hook>>,
    post: Vec<Arc<dyn Hook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre(mut self, hook: impl Hook + 'static) -> Self {
        self.pre.push(Arc::new(hook));
        self
    }

    pub fn with_post(mut self, hook: impl Hook + 'static) -> Self {
        self.post.push(Arc::new(hook));
        self
    }

    pub fn pre(&self) -> &[Arc<dyn Hook>] {
        &self.pre
    }

    pub fn post(&self) -> &[Arc<dyn Hook>] {
        &self.post
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redprobe_core::Severity;

    fn template() -> Template {
        Template {
            id: "probe_v1.0".into(),
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

    #[tokio::test]
    async fn fn_hook_runs_in_order() {
        let chain = HookChain::new()
            .with_pre(FnHook::new("first", |_, r: &mut TemplateResult| {
                r.annotate("order", serde_json::json!(["first"]));
                Ok(())
            }))
            .with_pre(FnHook::new("second", |_, r: &mut TemplateResult| {
                if let Some(serde_json::Value::Array(items)) = r.details.get_mut("order") {
                    items.push(serde_json::json!("second"));
                }
                Ok(())
            }));

        let t = template();
        let mut result = TemplateResult::new(&t.id, t.severity);
        for hook in chain.pre() {
            hook.run(&t, &mut result).await.unwrap();
        }
        assert_eq!(
            result.details["order"],
            serde_json::json!(["first", "second"])
        );
    }
}
