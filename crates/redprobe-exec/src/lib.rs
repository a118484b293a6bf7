//! Execution layer: the provider abstraction, the per-run executor with its
//! hook chain, and the retrying runner above it.

pub mod executor;
pub mod hooks;
pub mod http_provider;
pub mod provider;
pub mod runner;
pub mod stub;

pub use executor::{
    evaluate_detection, ExecuteOptions, Executor, Scorer, ERROR_KIND_KEY, POST_HOOK_ERROR_KEY,
    RETRYABLE_KEY,
};
pub use hooks::{FnHook, Hook, HookChain};
pub use http_provider::HttpProvider;
pub use provider::{Provider, ProviderError, ProviderOptions, ProviderResponse, ProviderResult};
pub use runner::{RetryPolicy, Runner};
pub use stub::{StubBehavior, StubProvider};
