//! LLM provider trait

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provider error types
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Status { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

/// Per-call knobs forwarded to the endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug)]
pub struct ProviderResponse {
    pub content: String,
    pub model: Option<String>,
    pub tokens: Option<u32>,
}

/// External LLM endpoint abstraction. Concrete providers are injected into
/// the executor; a triggered `cancel` token aborts the in-flight call and
/// yields `ProviderError::Cancelled`.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn send_prompt(
        &self,
        prompt: &str,
        options: &ProviderOptions,
        cancel: CancellationToken,
    ) -> ProviderResult<ProviderResponse>;
}
