//! Configuration management and environment variable loading

use crate::resilience::RetryPolicy;
use crate::types::{ModelClass, ModelProviderName, ProviderSettings};
use crate::{ParleyError, Result};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Load environment variables from a `.env` file in the current directory
/// or a parent directory. A missing file is not an error.
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("✓ Loaded environment from: {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(ParleyError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::warn!("No .env file found - using system environment variables only");
            Ok(())
        }
        Err(e) => Err(ParleyError::config(format!(
            "Failed to load .env file: {}",
            e
        ))),
    }
}

/// Load environment variables from a specific file
pub fn load_env_from_path<P: AsRef<Path>>(path: P) -> Result<()> {
    match dotenvy::from_path(path.as_ref()) {
        Ok(_) => {
            tracing::info!("✓ Loaded environment from: {}", path.as_ref().display());
            Ok(())
        }
        Err(e) => Err(ParleyError::config(format!(
            "Failed to load {} environment file: {}",
            path.as_ref().display(),
            e
        ))),
    }
}

/// Get required environment variable
pub fn get_required_env(key: &str) -> Result<String> {
    get_env_optional(key).ok_or_else(|| {
        ParleyError::config(format!(
            "Required environment variable '{}' is not set. \
             Check your .env file or system environment.",
            key
        ))
    })
}

/// Get a non-empty environment variable
pub fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    get_env_optional(key).unwrap_or_else(|| default.to_string())
}

/// Get environment variable as boolean
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get environment variable as integer
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Built-in provider settings with model-name overrides from the environment.
///
/// `{SMALL,MEDIUM,LARGE}_<PROVIDER>_MODEL` override one tier and
/// `<PROVIDER>_MODEL` overrides every tier that has no specific override.
pub fn provider_settings_from_env(provider: ModelProviderName) -> ProviderSettings {
    let mut settings = ProviderSettings::defaults_for(provider);
    let prefix = provider.as_str().to_uppercase();
    let all = get_env_optional(&format!("{}_MODEL", prefix));

    for class in [ModelClass::Small, ModelClass::Medium, ModelClass::Large] {
        let specific = get_env_optional(&format!("{}_{}_MODEL", class, prefix));
        if let Some(model) = specific.or_else(|| all.clone()) {
            match class {
                ModelClass::Small => settings.small_model = model,
                ModelClass::Medium => settings.medium_model = model,
                ModelClass::Large => settings.large_model = model,
            }
        }
    }

    if let Some(endpoint) = get_env_optional(&format!("{}_API_URL", prefix)) {
        settings.endpoint = endpoint;
    }
    settings
}

/// Two-tier platform format pass settings
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSettings {
    /// Provider serving both tiers
    pub provider: ModelProviderName,
    /// First-choice model
    pub primary_model: String,
    /// Model used once the primary tier is exhausted
    pub fallback_model: String,
    /// Attempts per tier
    pub attempts_per_tier: usize,
    /// Delay between attempts within a tier
    pub retry_delay: Duration,
    /// Response length cap
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling
    pub top_p: f32,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            provider: ModelProviderName::Hyperbolic,
            primary_model: "meta-llama/Meta-Llama-3.1-405B-Instruct".to_string(),
            fallback_model: "meta-llama/Meta-Llama-3.1-70B-Instruct".to_string(),
            attempts_per_tier: 3,
            retry_delay: Duration::from_secs(1),
            max_tokens: 250,
            temperature: 1.0,
            top_p: 0.95,
        }
    }
}

/// Agent-wide settings resolved at startup
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Default completion provider
    pub model_provider: ModelProviderName,
    /// Provider override used for reply and action generation
    pub response_provider: Option<ModelProviderName>,
    /// System prompt for chat completions (falls back to the character's)
    pub system_prompt: Option<String>,
    /// Platform format pass
    pub format: FormatSettings,
    /// Retry policy for label and payload generation
    pub retry: RetryPolicy,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model_provider: ModelProviderName::OpenAi,
            response_provider: None,
            system_prompt: None,
            format: FormatSettings::default(),
            retry: RetryPolicy::unbounded(),
        }
    }
}

impl AgentSettings {
    /// Read settings from the environment.
    ///
    /// Unknown provider names are configuration errors.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let model_provider = match get_env_optional("MODEL_PROVIDER") {
            Some(name) => name.parse()?,
            None => defaults.model_provider,
        };
        let response_provider = get_env_optional("RESPONSE_MODEL_PROVIDER")
            .map(|name| name.parse())
            .transpose()?;

        let mut format = FormatSettings::default();
        if let Some(name) = get_env_optional("FORMAT_PROVIDER") {
            format.provider = name.parse()?;
        }
        format.primary_model = get_env_or("FORMAT_PRIMARY_MODEL", &format.primary_model);
        format.fallback_model = get_env_or("FORMAT_FALLBACK_MODEL", &format.fallback_model);

        let retry = RetryPolicy::unbounded().with_max_attempts(get_env_int("RETRY_MAX_ATTEMPTS", 0));

        Ok(Self {
            model_provider,
            response_provider,
            system_prompt: get_env_optional("SYSTEM_PROMPT"),
            format,
            retry,
        })
    }
}
