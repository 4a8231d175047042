//! Completion gateway: one entry point for every model call
//!
//! Resolves the provider (per-call override, else the runtime default),
//! picks the model for the requested class, trims the context to the
//! provider's input budget and dispatches to the registered backend.

use crate::types::{
    CompletionMode, CompletionRequest, ModelClass, ModelProviderName, ProviderSettings,
};
use crate::utils::{count_tokens, trim_tokens, Logger};
use crate::{ParleyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A completion backend (one HTTP API)
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Run one completion and return the raw text
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Per-call options; unset fields fall back to provider settings
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Provider override
    pub provider: Option<ModelProviderName>,
    /// Exact model id, bypassing the class table
    pub model: Option<String>,
    /// System prompt (defaults to the gateway's)
    pub system: Option<String>,
    /// Stop sequences (defaults to the provider's)
    pub stop: Option<Vec<String>>,
    /// Response length cap
    pub max_tokens: Option<usize>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling
    pub top_p: Option<f32>,
    /// Force chat or text completion
    pub mode: Option<CompletionMode>,
}

impl CompletionOptions {
    /// Options with only a provider override
    pub fn with_provider(provider: Option<ModelProviderName>) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }
}

/// Routes completions to registered providers
pub struct CompletionGateway {
    default_provider: ModelProviderName,
    providers: HashMap<ModelProviderName, Arc<dyn CompletionProvider>>,
    settings: HashMap<ModelProviderName, ProviderSettings>,
    system_prompt: Option<String>,
    logger: Logger,
}

impl CompletionGateway {
    /// Gateway with no backends registered yet
    pub fn new(default_provider: ModelProviderName, logger: Logger) -> Self {
        Self {
            default_provider,
            providers: HashMap::new(),
            settings: HashMap::new(),
            system_prompt: None,
            logger,
        }
    }

    /// Register a backend for a provider name
    pub fn with_provider(
        mut self,
        name: ModelProviderName,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        self.providers.insert(name, provider);
        self
    }

    /// Replace the built-in settings for a provider
    pub fn with_settings(mut self, name: ModelProviderName, settings: ProviderSettings) -> Self {
        self.settings.insert(name, settings);
        self
    }

    /// System prompt used when a call does not set one
    pub fn with_system_prompt(mut self, system: Option<String>) -> Self {
        self.system_prompt = system;
        self
    }

    /// Provider used when no override is given
    pub fn default_provider(&self) -> ModelProviderName {
        self.default_provider
    }

    /// Whether a backend is registered for `name`
    pub fn has_provider(&self, name: ModelProviderName) -> bool {
        self.providers.contains_key(&name)
    }

    /// Effective settings for a provider
    pub fn settings_for(&self, name: ModelProviderName) -> ProviderSettings {
        self.settings
            .get(&name)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::defaults_for(name))
    }

    /// Complete `context` with the model for `class`
    pub async fn complete(
        &self,
        context: &str,
        class: ModelClass,
        provider: Option<ModelProviderName>,
    ) -> Result<String> {
        self.complete_with(context, class, CompletionOptions::with_provider(provider))
            .await
    }

    /// Complete with explicit options.
    ///
    /// An empty context returns an empty string without calling any backend.
    /// An override naming a provider with no registered backend is a
    /// configuration error.
    pub async fn complete_with(
        &self,
        context: &str,
        class: ModelClass,
        options: CompletionOptions,
    ) -> Result<String> {
        if context.trim().is_empty() {
            self.logger.warn("completion requested with empty context");
            return Ok(String::new());
        }

        let name = options.provider.unwrap_or(self.default_provider);
        let backend = self.providers.get(&name).ok_or_else(|| {
            ParleyError::config(format!("Unsupported provider: {} (no backend registered)", name))
        })?;
        let settings = self.settings_for(name);

        let prompt = trim_tokens(context, settings.max_input_tokens);
        if prompt.len() < context.len() {
            self.logger.debug(&format!(
                "trimmed context from {} to {} tokens for {}",
                count_tokens(context),
                count_tokens(prompt),
                name
            ));
        }

        let request = CompletionRequest {
            model: options
                .model
                .unwrap_or_else(|| settings.model_for(class).to_string()),
            prompt: prompt.to_string(),
            system: options.system.or_else(|| self.system_prompt.clone()),
            mode: options.mode.unwrap_or_else(|| settings.mode_for(class)),
            temperature: options.temperature.unwrap_or(settings.temperature),
            top_p: options.top_p,
            frequency_penalty: settings.frequency_penalty,
            presence_penalty: settings.presence_penalty,
            max_tokens: options.max_tokens.unwrap_or(settings.max_output_tokens),
            stop: options.stop.unwrap_or_else(|| settings.stop.clone()),
        };

        self.logger.debug(&format!(
            "{} {} completion via {} ({})",
            class,
            match request.mode {
                CompletionMode::Chat => "chat",
                CompletionMode::Text => "text",
            },
            backend.name(),
            request.model
        ));

        backend.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    fn gateway(provider: Arc<ScriptedProvider>) -> CompletionGateway {
        CompletionGateway::new(ModelProviderName::OpenAi, Logger::new("test"))
            .with_provider(ModelProviderName::OpenAi, provider)
    }

    #[tokio::test]
    async fn test_empty_context_skips_backend() {
        let provider = Arc::new(ScriptedProvider::new(["unused"]));
        let gateway = gateway(provider.clone());

        let text = gateway.complete("   ", ModelClass::Small, None).await.unwrap();
        assert_eq!(text, "");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_selected_by_class() {
        let provider = Arc::new(ScriptedProvider::new(["ok"]));
        let gateway = gateway(provider.clone());

        gateway
            .complete("hello", ModelClass::Small, None)
            .await
            .unwrap();
        let request = provider.requests().remove(0);
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.max_tokens, 8192);
        assert_eq!(request.mode, CompletionMode::Chat);
    }

    #[tokio::test]
    async fn test_override_beats_default() {
        let default = Arc::new(ScriptedProvider::new(["default"]));
        let hyperbolic = Arc::new(ScriptedProvider::new(["hyperbolic"]));
        let gateway = gateway(default.clone())
            .with_provider(ModelProviderName::Hyperbolic, hyperbolic.clone());

        let text = gateway
            .complete("hi", ModelClass::Medium, Some(ModelProviderName::Hyperbolic))
            .await
            .unwrap();
        assert_eq!(text, "hyperbolic");
        assert_eq!(default.call_count(), 0);
        assert_eq!(
            hyperbolic.requests()[0].model,
            "meta-llama/Meta-Llama-3.1-405B-Instruct"
        );
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_config_error() {
        let gateway = gateway(Arc::new(ScriptedProvider::new(["x"])));
        let err = gateway
            .complete("hi", ModelClass::Small, Some(ModelProviderName::Groq))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_context_trimmed_from_front() {
        let provider = Arc::new(ScriptedProvider::new(["ok"]));
        let mut settings = ProviderSettings::defaults_for(ModelProviderName::OpenAi);
        settings.max_input_tokens = 4;
        let gateway = gateway(provider.clone()).with_settings(ModelProviderName::OpenAi, settings);

        gateway
            .complete("oldest middle newest", ModelClass::Small, None)
            .await
            .unwrap();
        let prompt = provider.requests()[0].prompt.clone();
        assert!(prompt.ends_with("newest"));
        assert!(!prompt.contains("oldest"));
    }

    #[tokio::test]
    async fn test_options_override_settings() {
        let provider = Arc::new(ScriptedProvider::new(["ok"]));
        let gateway = gateway(provider.clone()).with_system_prompt(Some("be terse".into()));

        gateway
            .complete_with(
                "hi",
                ModelClass::Large,
                CompletionOptions {
                    model: Some("custom".into()),
                    max_tokens: Some(250),
                    top_p: Some(0.95),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let request = provider.requests().remove(0);
        assert_eq!(request.model, "custom");
        assert_eq!(request.max_tokens, 250);
        assert_eq!(request.top_p, Some(0.95));
        assert_eq!(request.system.as_deref(), Some("be terse"));
    }
}
