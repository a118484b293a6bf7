//! Generic HTTP chat-completion provider
//!
//! Speaks the plain `{"model": …, "messages": [{"role": "user", …}]}` dialect
//! most inference gateways accept, and tolerates both `choices[0].message
//! .content` and top-level `content` response shapes. Anything richer belongs
//! in a dedicated provider implementation.

use crate::provider::{Provider, ProviderError, ProviderOptions, ProviderResponse, ProviderResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct HttpProvider {
    client: Client,
    name: String,
    endpoint: String,
    api_key: Option<String>,
    default_model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: Option<u32>,
}

impl HttpProvider {
    /// The API key is read from `<NAME>_API_KEY` (name uppercased,
    /// non-alphanumerics mapped to `_`) unless one is given explicitly.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let name = name.into();
        let env_key = format!("{}_API_KEY", sanitize_env_name(&name));
        Self {
            client: Client::new(),
            api_key: std::env::var(&env_key).ok(),
            name,
            endpoint: endpoint.into(),
            default_model: "default".to_string(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

fn sanitize_env_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_prompt(
        &self,
        prompt: &str,
        options: &ProviderOptions,
        cancel: CancellationToken,
    ) -> ProviderResult<ProviderResponse> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        for (key, value) in &options.extra {
            body[key.as_str()] = value.clone();
        }

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(provider = %self.name, endpoint = %self.endpoint, "sending prompt");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = request.send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::AuthFailed(text),
                429 => ProviderError::RateLimited {
                    retry_after_ms: 60_000,
                },
                code => ProviderError::Status {
                    code,
                    message: text,
                },
            });
        }

        let parsed: ChatResponse = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = response.json() => result?,
        };
        let content = parsed
            .content
            .or_else(|| parsed.choices.into_iter().next().map(|c| c.message.content))
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no content in provider response".into())
            })?;
        Ok(ProviderResponse {
            content,
            model: parsed.model,
            tokens: parsed.usage.and_then(|u| u.completion_tokens),
        })
    }
}
