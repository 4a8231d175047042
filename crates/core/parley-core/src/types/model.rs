//! Model classes, provider names and per-provider model settings

use crate::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Capability tier requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelClass {
    /// Small text model (fast, cheaper)
    Small,
    /// Medium text model (balanced)
    Medium,
    /// Large text model (most capable)
    Large,
}

impl std::fmt::Display for ModelClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelClass::Small => write!(f, "SMALL"),
            ModelClass::Medium => write!(f, "MEDIUM"),
            ModelClass::Large => write!(f, "LARGE"),
        }
    }
}

/// Completion providers the gateway knows how to configure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProviderName {
    /// api.openai.com
    OpenAi,
    /// api.anthropic.com
    Anthropic,
    /// api.x.ai
    Grok,
    /// api.groq.com
    Groq,
    /// api.together.ai
    LlamaCloud,
    /// api.red-pill.ai
    RedPill,
    /// openrouter.ai
    OpenRouter,
    /// api.hyperbolic.xyz
    Hyperbolic,
}

impl ModelProviderName {
    /// Every built-in provider
    pub const ALL: [ModelProviderName; 8] = [
        ModelProviderName::OpenAi,
        ModelProviderName::Anthropic,
        ModelProviderName::Grok,
        ModelProviderName::Groq,
        ModelProviderName::LlamaCloud,
        ModelProviderName::RedPill,
        ModelProviderName::OpenRouter,
        ModelProviderName::Hyperbolic,
    ];

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProviderName::OpenAi => "openai",
            ModelProviderName::Anthropic => "anthropic",
            ModelProviderName::Grok => "grok",
            ModelProviderName::Groq => "groq",
            ModelProviderName::LlamaCloud => "llama_cloud",
            ModelProviderName::RedPill => "redpill",
            ModelProviderName::OpenRouter => "openrouter",
            ModelProviderName::Hyperbolic => "hyperbolic",
        }
    }

    /// Environment variable holding the API key for this provider
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ModelProviderName::OpenAi => "OPENAI_API_KEY",
            ModelProviderName::Anthropic => "ANTHROPIC_API_KEY",
            ModelProviderName::Grok => "GROK_API_KEY",
            ModelProviderName::Groq => "GROQ_API_KEY",
            ModelProviderName::LlamaCloud => "LLAMACLOUD_API_KEY",
            ModelProviderName::RedPill => "REDPILL_API_KEY",
            ModelProviderName::OpenRouter => "OPENROUTER_API_KEY",
            ModelProviderName::Hyperbolic => "HYPERBOLIC_API_KEY",
        }
    }
}

impl std::fmt::Display for ModelProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelProviderName {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "openai" => Ok(ModelProviderName::OpenAi),
            "anthropic" | "claude" => Ok(ModelProviderName::Anthropic),
            "grok" => Ok(ModelProviderName::Grok),
            "groq" => Ok(ModelProviderName::Groq),
            "llama_cloud" | "llamacloud" | "together" => Ok(ModelProviderName::LlamaCloud),
            "redpill" | "red_pill" => Ok(ModelProviderName::RedPill),
            "openrouter" | "open_router" => Ok(ModelProviderName::OpenRouter),
            "hyperbolic" => Ok(ModelProviderName::Hyperbolic),
            other => Err(ParleyError::config(format!(
                "Unsupported model provider: {}",
                other
            ))),
        }
    }
}

/// Which completion API a request should hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Chat messages (system + user)
    #[default]
    Chat,
    /// Raw prompt continuation on a base model
    Text,
}

/// Static settings for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    /// Base URL of the provider's API
    pub endpoint: String,
    /// Model id for the small tier
    pub small_model: String,
    /// Model id for the medium tier
    pub medium_model: String,
    /// Model id for the large tier
    pub large_model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Frequency penalty
    pub frequency_penalty: f32,
    /// Presence penalty
    pub presence_penalty: f32,
    /// Contexts longer than this are trimmed from the front
    pub max_input_tokens: usize,
    /// Response length cap
    pub max_output_tokens: usize,
    /// Stop sequences
    pub stop: Vec<String>,
    /// Classes served by a base model through the text completion API
    pub text_completion_classes: Vec<ModelClass>,
}

impl ProviderSettings {
    /// Model id for a class
    pub fn model_for(&self, class: ModelClass) -> &str {
        match class {
            ModelClass::Small => &self.small_model,
            ModelClass::Medium => &self.medium_model,
            ModelClass::Large => &self.large_model,
        }
    }

    /// Completion API used for a class
    pub fn mode_for(&self, class: ModelClass) -> CompletionMode {
        if self.text_completion_classes.contains(&class) {
            CompletionMode::Text
        } else {
            CompletionMode::Chat
        }
    }

    /// Built-in settings for a provider
    pub fn defaults_for(provider: ModelProviderName) -> Self {
        fn build(
            endpoint: &str,
            models: [&str; 3],
            temperature: f32,
            max_input_tokens: usize,
            max_output_tokens: usize,
        ) -> ProviderSettings {
            ProviderSettings {
                endpoint: endpoint.to_string(),
                small_model: models[0].to_string(),
                medium_model: models[1].to_string(),
                large_model: models[2].to_string(),
                temperature,
                frequency_penalty: 0.0,
                presence_penalty: 0.0,
                max_input_tokens,
                max_output_tokens,
                stop: Vec::new(),
                text_completion_classes: Vec::new(),
            }
        }

        match provider {
            ModelProviderName::OpenAi => build(
                "https://api.openai.com/v1",
                ["gpt-4o-mini", "gpt-4o", "gpt-4o"],
                0.6,
                128_000,
                8192,
            ),
            ModelProviderName::Anthropic => build(
                "https://api.anthropic.com/v1",
                [
                    "claude-3-5-haiku-20241022",
                    "claude-3-5-sonnet-20241022",
                    "claude-3-opus-20240229",
                ],
                0.3,
                200_000,
                8192,
            ),
            ModelProviderName::Grok => build(
                "https://api.x.ai/v1",
                ["grok-beta", "grok-beta", "grok-beta"],
                0.3,
                128_000,
                8192,
            ),
            ModelProviderName::Groq => build(
                "https://api.groq.com/openai/v1",
                [
                    "llama-3.1-8b-instant",
                    "llama-3.1-70b-versatile",
                    "llama-3.2-90b-text-preview",
                ],
                0.3,
                128_000,
                8192,
            ),
            ModelProviderName::LlamaCloud => build(
                "https://api.together.ai/v1",
                [
                    "meta-llama/Llama-3.2-3B-Instruct-Turbo",
                    "meta-llama-3.1-8b-instruct",
                    "meta-llama/Meta-Llama-3.1-405B-Instruct-Turbo",
                ],
                0.3,
                128_000,
                8192,
            ),
            ModelProviderName::RedPill => build(
                "https://api.red-pill.ai/v1",
                ["gpt-4o-mini", "gpt-4o", "gpt-4o"],
                0.6,
                128_000,
                8192,
            ),
            ModelProviderName::OpenRouter => build(
                "https://openrouter.ai/api/v1",
                [
                    "nousresearch/hermes-3-llama-3.1-70b",
                    "nousresearch/hermes-3-llama-3.1-405b",
                    "nousresearch/hermes-3-llama-3.1-405b",
                ],
                0.6,
                128_000,
                8192,
            ),
            ModelProviderName::Hyperbolic => ProviderSettings {
                stop: vec!["<|im_end|>".to_string(), "<".to_string()],
                text_completion_classes: vec![ModelClass::Large],
                ..build(
                    "https://api.hyperbolic.xyz/v1",
                    [
                        "meta-llama/Meta-Llama-3.1-70B-Instruct",
                        "meta-llama/Meta-Llama-3.1-405B-Instruct",
                        "meta-llama/Meta-Llama-3.1-405B",
                    ],
                    1.0,
                    128_000,
                    512,
                )
            },
        }
    }
}

/// A fully resolved request handed to a completion backend
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionRequest {
    /// Model id
    pub model: String,
    /// User prompt (already trimmed to the input budget)
    pub prompt: String,
    /// Optional system prompt
    pub system: Option<String>,
    /// Chat or raw text completion
    pub mode: CompletionMode,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling
    pub top_p: Option<f32>,
    /// Frequency penalty
    pub frequency_penalty: f32,
    /// Presence penalty
    pub presence_penalty: f32,
    /// Response length cap
    pub max_tokens: usize,
    /// Stop sequences
    pub stop: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name_parsing() {
        assert_eq!(
            "OpenAI".parse::<ModelProviderName>().unwrap(),
            ModelProviderName::OpenAi
        );
        assert_eq!(
            "llama-cloud".parse::<ModelProviderName>().unwrap(),
            ModelProviderName::LlamaCloud
        );
        let err = "ollama-9000".parse::<ModelProviderName>().unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
    }

    #[test]
    fn test_provider_name_round_trips_through_str() {
        for provider in ModelProviderName::ALL {
            assert_eq!(provider.as_str().parse::<ModelProviderName>().unwrap(), provider);
        }
    }

    #[test]
    fn test_hyperbolic_large_uses_text_completion() {
        let settings = ProviderSettings::defaults_for(ModelProviderName::Hyperbolic);
        assert_eq!(settings.mode_for(ModelClass::Large), CompletionMode::Text);
        assert_eq!(settings.mode_for(ModelClass::Medium), CompletionMode::Chat);
        assert_eq!(
            settings.model_for(ModelClass::Medium),
            "meta-llama/Meta-Llama-3.1-405B-Instruct"
        );
        assert_eq!(settings.max_output_tokens, 512);
    }
}
