//! OpenAI-compatible completion backend for Parley
//!
//! One backend type serves every provider that speaks the OpenAI wire format
//! (OpenAI, Grok, Groq, Together, RedPill, OpenRouter, Hyperbolic). Only the
//! base URL and API key differ.

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateCompletionRequest, CreateCompletionRequestArgs,
        Stop,
    },
    Client,
};
use async_trait::async_trait;
use parley_core::{
    get_required_env, CompletionMode, CompletionProvider, CompletionRequest, ModelProviderName,
    ParleyError, ProviderSettings, Result,
};
use std::sync::OnceLock;

/// Shared HTTP client for connection pooling across providers
static HTTP: OnceLock<reqwest::Client> = OnceLock::new();

fn shared_http() -> reqwest::Client {
    HTTP.get_or_init(|| {
        tracing::debug!("Initializing shared HTTP client for OpenAI-compatible backends");
        reqwest::Client::new()
    })
    .clone()
}

/// Backend for any OpenAI-compatible API
pub struct OpenAICompatibleProvider {
    name: String,
    client: Client<OpenAIConfig>,
}

impl OpenAICompatibleProvider {
    /// Backend for `api_base` authenticated with `api_key`
    pub fn new(name: impl Into<String>, api_base: &str, api_key: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(api_base.trim_end_matches('/'))
            .with_api_key(api_key);
        Self {
            name: name.into(),
            client: Client::with_config(config).with_http_client(shared_http()),
        }
    }

    /// Backend for a provider using its configured endpoint
    pub fn for_provider(
        provider: ModelProviderName,
        settings: &ProviderSettings,
        api_key: &str,
    ) -> Self {
        Self::new(provider.as_str(), &settings.endpoint, api_key)
    }

    /// Backend for a provider with the API key from its environment variable.
    ///
    /// A missing key is a configuration error.
    pub fn from_env(provider: ModelProviderName, settings: &ProviderSettings) -> Result<Self> {
        if provider == ModelProviderName::Anthropic {
            return Err(ParleyError::config(
                "anthropic does not speak the OpenAI wire format",
            ));
        }
        let api_key = get_required_env(provider.api_key_env())?;
        Ok(Self::for_provider(provider, settings, &api_key))
    }

    async fn complete_chat(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .chat()
            .create(build_chat_request(request)?)
            .await
            .map_err(|e| ParleyError::model(format!("{}: {}", self.name, e)))?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    async fn complete_text(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .client
            .completions()
            .create(build_text_request(request)?)
            .await
            .map_err(|e| ParleyError::model(format!("{}: {}", self.name, e)))?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .unwrap_or_default())
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let started = std::time::Instant::now();
        let text = match request.mode {
            CompletionMode::Chat => self.complete_chat(&request).await?,
            CompletionMode::Text => self.complete_text(&request).await?,
        };
        tracing::debug!(
            provider = %self.name,
            model = %request.model,
            latency_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            "Completion finished"
        );
        Ok(text)
    }
}

/// Chat request: optional system message followed by the prompt as the user
/// message
pub fn build_chat_request(request: &CompletionRequest) -> Result<CreateChatCompletionRequest> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system.as_deref().filter(|s| !s.trim().is_empty()) {
        messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(|e| ParleyError::model(e.to_string()))?,
        ));
    }
    messages.push(ChatCompletionRequestMessage::User(
        ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.clone())
            .build()
            .map_err(|e| ParleyError::model(e.to_string()))?,
    ));

    let mut builder = CreateChatCompletionRequestArgs::default();
    builder
        .model(request.model.clone())
        .messages(messages)
        .temperature(request.temperature)
        .max_tokens(request.max_tokens as u32)
        .frequency_penalty(request.frequency_penalty)
        .presence_penalty(request.presence_penalty);
    if let Some(top_p) = request.top_p {
        builder.top_p(top_p);
    }
    if !request.stop.is_empty() {
        builder.stop(Stop::StringArray(request.stop.clone()));
    }
    builder
        .build()
        .map_err(|e| ParleyError::model(e.to_string()))
}

/// Text completion request for base models
pub fn build_text_request(request: &CompletionRequest) -> Result<CreateCompletionRequest> {
    let mut builder = CreateCompletionRequestArgs::default();
    builder
        .model(request.model.clone())
        .prompt(request.prompt.clone())
        .temperature(request.temperature)
        .max_tokens(request.max_tokens as u32)
        .frequency_penalty(request.frequency_penalty)
        .presence_penalty(request.presence_penalty);
    if let Some(top_p) = request.top_p {
        builder.top_p(top_p);
    }
    if !request.stop.is_empty() {
        builder.stop(Stop::StringArray(request.stop.clone()));
    }
    builder
        .build()
        .map_err(|e| ParleyError::model(e.to_string()))
}
