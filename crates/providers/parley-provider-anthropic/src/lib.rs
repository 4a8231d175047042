//! Anthropic (Claude) completion backend for Parley

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;
use parley_core::{
    get_required_env, CompletionProvider, CompletionRequest, ModelProviderName, ParleyError,
    ProviderSettings, Result,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// API version header sent with every request
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Shared HTTP client for connection pooling
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

/// Get or initialize the shared HTTP client
fn get_http_client() -> Client {
    HTTP_CLIENT
        .get_or_init(|| {
            Client::builder()
                .pool_max_idle_per_host(50)
                .pool_idle_timeout(Duration::from_secs(300))
                .tcp_keepalive(Duration::from_secs(60))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_else(|e| {
                    tracing::warn!("Falling back to default HTTP client: {}", e);
                    Client::new()
                })
        })
        .clone()
}

/// Messages API backend
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Backend against the public API
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(
            api_key,
            ProviderSettings::defaults_for(ModelProviderName::Anthropic).endpoint,
        )
    }

    /// Backend against a custom base URL (proxies, tests)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: get_http_client(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Backend keyed from `ANTHROPIC_API_KEY`, using the endpoint in `settings`
    pub fn from_env(settings: &ProviderSettings) -> Result<Self> {
        let api_key = get_required_env(ModelProviderName::Anthropic.api_key_env())?;
        Ok(Self::with_base_url(api_key, settings.endpoint.clone()))
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = MessagesRequest::from(&request);

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ParleyError::model(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(ParleyError::model(format!(
                "Anthropic API error ({}): {}",
                status, error_text
            )));
        }

        let response: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ParleyError::model(format!("Invalid Anthropic response: {}", e)))?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %request.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Anthropic completion finished"
            );
        }
        Ok(response.text())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

impl From<&CompletionRequest> for MessagesRequest {
    fn from(request: &CompletionRequest) -> Self {
        Self {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            system: request
                .system
                .clone()
                .filter(|s| !s.trim().is_empty()),
            temperature: request.temperature.clamp(0.0, 1.0),
            top_p: request.top_p,
            stop_sequences: request.stop.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest {
            model: "claude-3-5-haiku-20241022".to_string(),
            prompt: "should I respond?".to_string(),
            system: Some("You are Rop.".to_string()),
            temperature: 1.3,
            max_tokens: 64,
            stop: vec!["\n".to_string()],
            ..Default::default()
        };

        let body = serde_json::to_value(MessagesRequest::from(&request)).unwrap();
        assert_eq!(body["model"], "claude-3-5-haiku-20241022");
        assert_eq!(body["system"], "You are Rop.");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 1.0);
        assert_eq!(body["stop_sequences"][0], "\n");
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn test_empty_stop_sequences_omitted() {
        let body = serde_json::to_value(MessagesRequest::from(&CompletionRequest::default()))
            .unwrap();
        assert!(body.get("stop_sequences").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_response_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "[RESP"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "OND]"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 3}
        }))
        .unwrap();
        assert_eq!(response.text(), "[RESPOND]");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = AnthropicProvider::with_base_url("k", "http://localhost:9/v1/");
        assert_eq!(provider.base_url, "http://localhost:9/v1");
        assert_eq!(provider.name(), "anthropic");
    }
}
