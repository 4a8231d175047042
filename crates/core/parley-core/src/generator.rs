//! Content generation: replies, posts, action tags and the platform format pass

use crate::config::FormatSettings;
use crate::gateway::{CompletionGateway, CompletionOptions};
use crate::parsing::{parse_action_response, parse_json_object, ActionResponse};
use crate::resilience::{retry_with_policy, RetryPolicy};
use crate::templates::FORMAT_SYSTEM_PROMPT;
use crate::types::{CompletionMode, Content, ModelClass, ModelProviderName};
use crate::utils::{strip_wrapping_quotes, unescape_newlines, Logger};
use crate::{ParleyError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Length a generated post is cut down to
pub const POST_SOFT_LIMIT: usize = 240;

/// Platform maximum for a single post
pub const POST_HARD_LIMIT: usize = 280;

/// Apply the post length policy to raw model output.
///
/// Best effort: cut at the last newline when over the hard limit, then at up
/// to two trailing sentence boundaries while over the soft limit, then
/// truncate to the soft limit.
pub fn fit_post_length(raw: &str) -> String {
    let mut content = unescape_newlines(raw);

    if content.chars().count() > POST_HARD_LIMIT {
        if let Some(idx) = content.rfind('\n').filter(|&i| i > 0) {
            content.truncate(idx);
        }
    }

    for _ in 0..2 {
        if content.chars().count() <= POST_SOFT_LIMIT {
            break;
        }
        match content.rfind('.').filter(|&i| i > 0) {
            Some(idx) => content.truncate(idx),
            None => break,
        }
    }

    if content.chars().count() > POST_SOFT_LIMIT {
        content = content.chars().take(POST_SOFT_LIMIT).collect();
    }
    content.trim().to_string()
}

/// Produces outgoing content through the gateway
pub struct ContentGenerator {
    gateway: Arc<CompletionGateway>,
    retry: RetryPolicy,
    format: FormatSettings,
    cancel: CancellationToken,
    logger: Logger,
}

impl ContentGenerator {
    /// Create a generator
    pub fn new(
        gateway: Arc<CompletionGateway>,
        retry: RetryPolicy,
        format: FormatSettings,
        cancel: CancellationToken,
        logger: Logger,
    ) -> Self {
        Self {
            gateway,
            retry,
            format,
            cancel,
            logger,
        }
    }

    /// Free text; transport errors are retried, empty output is returned as is
    pub async fn generate_text(
        &self,
        context: &str,
        class: ModelClass,
        provider: Option<ModelProviderName>,
    ) -> Result<String> {
        if context.trim().is_empty() {
            return Ok(String::new());
        }
        retry_with_policy(&self.retry, &self.cancel, "generate_text", |_| {
            let gateway = self.gateway.clone();
            async move { gateway.complete(context, class, provider).await }
        })
        .await
    }

    /// Structured reply, retried until the model returns a JSON object.
    ///
    /// `None` for an empty context. Callers still check the content for text
    /// before delivering anything.
    pub async fn generate_message_response(
        &self,
        context: &str,
        class: ModelClass,
        provider: Option<ModelProviderName>,
    ) -> Result<Option<Content>> {
        if context.trim().is_empty() {
            self.logger.warn("message response requested with empty context");
            return Ok(None);
        }

        let content = retry_with_policy(
            &self.retry,
            &self.cancel,
            "generate_message_response",
            |attempt| {
                let gateway = self.gateway.clone();
                async move {
                    let raw = gateway.complete(context, class, provider).await?;
                    let object = parse_json_object(&raw).ok_or_else(|| {
                        ParleyError::parse(format!("no JSON object in attempt {}", attempt))
                    })?;
                    let content: Content =
                        serde_json::from_value(serde_json::Value::Object(object))?;
                    Ok(content)
                }
            },
        )
        .await?;
        Ok(Some(content))
    }

    /// Action tags for a timeline post, retried until the output parses
    pub async fn generate_tweet_actions(
        &self,
        context: &str,
        class: ModelClass,
        provider: Option<ModelProviderName>,
    ) -> Result<ActionResponse> {
        if context.trim().is_empty() {
            return Err(ParleyError::validation("action context must not be empty"));
        }
        retry_with_policy(&self.retry, &self.cancel, "generate_tweet_actions", |_| {
            let gateway = self.gateway.clone();
            async move {
                let raw = gateway.complete(context, class, provider).await?;
                parse_action_response(&raw)
            }
        })
        .await
    }

    /// Normalize raw output into one clean post.
    ///
    /// Each tier gets a fixed number of attempts with a fixed delay. When
    /// both tiers are exhausted the pass fails with a generation error.
    pub async fn format_for_platform(&self, raw: &str) -> Result<String> {
        let prompt = format!("Here is the tweet: {}", raw.trim());
        let policy = RetryPolicy::fixed(self.format.attempts_per_tier, self.format.retry_delay);
        let mut last_error = String::new();

        for model in [&self.format.primary_model, &self.format.fallback_model] {
            let options = CompletionOptions {
                provider: Some(self.format.provider),
                model: Some(model.clone()),
                system: Some(FORMAT_SYSTEM_PROMPT.to_string()),
                stop: Some(Vec::new()),
                max_tokens: Some(self.format.max_tokens),
                temperature: Some(self.format.temperature),
                top_p: Some(self.format.top_p),
                mode: Some(CompletionMode::Chat),
            };

            let attempt = retry_with_policy(&policy, &self.cancel, "format_for_platform", |_| {
                let gateway = self.gateway.clone();
                let options = options.clone();
                let prompt = prompt.as_str();
                async move {
                    let raw = gateway
                        .complete_with(prompt, ModelClass::Large, options)
                        .await?;
                    let text = strip_wrapping_quotes(&raw);
                    if text.is_empty() {
                        return Err(ParleyError::parse("format pass returned no text"));
                    }
                    Ok(text)
                }
            })
            .await;

            match attempt {
                Ok(text) => return Ok(text),
                Err(e @ (ParleyError::Cancelled(_) | ParleyError::Config(_))) => return Err(e),
                Err(e) => {
                    self.logger
                        .warn(&format!("format tier {} failed: {}", model, e));
                    last_error = e.to_string();
                }
            }
        }

        Err(ParleyError::generation(format!(
            "format pass failed on every tier: {}",
            last_error
        )))
    }

    /// Standalone post: generate, fit to length, format.
    ///
    /// `None` when the model produced nothing usable.
    pub async fn generate_post(
        &self,
        context: &str,
        class: ModelClass,
        provider: Option<ModelProviderName>,
    ) -> Result<Option<String>> {
        let raw = self.generate_text(context, class, provider).await?;
        let fitted = fit_post_length(&raw);
        if fitted.is_empty() {
            self.logger.warn("post generation returned no usable text");
            return Ok(None);
        }

        let formatted = strip_wrapping_quotes(&self.format_for_platform(&fitted).await?);
        Ok((!formatted.is_empty()).then_some(formatted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{quick_retry, ScriptedProvider};
    use std::time::Duration;

    fn generator(
        default: Arc<ScriptedProvider>,
        formatter: Arc<ScriptedProvider>,
    ) -> ContentGenerator {
        let gateway = CompletionGateway::new(ModelProviderName::OpenAi, Logger::new("test"))
            .with_provider(ModelProviderName::OpenAi, default)
            .with_provider(ModelProviderName::Hyperbolic, formatter);
        let format = FormatSettings {
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        };
        ContentGenerator::new(
            Arc::new(gateway),
            quick_retry(4),
            format,
            CancellationToken::new(),
            Logger::new("test"),
        )
    }

    #[test]
    fn test_fit_post_length_short_post_untouched() {
        assert_eq!(fit_post_length("  gm\\nwagmi  "), "gm\nwagmi");
    }

    #[test]
    fn test_fit_post_length_cuts_at_sentence() {
        let post = format!("{}. {}", "a".repeat(200), "b".repeat(60));
        assert_eq!(fit_post_length(&post), "a".repeat(200));
    }

    #[test]
    fn test_fit_post_length_drops_last_line_when_over_hard_cap() {
        let post = format!("{}\n{}", "first line.", "x".repeat(300));
        assert_eq!(fit_post_length(&post), "first line.");
    }

    #[test]
    fn test_fit_post_length_hard_truncates() {
        let post = "é".repeat(500);
        let fitted = fit_post_length(&post);
        assert_eq!(fitted.chars().count(), POST_SOFT_LIMIT);
    }

    #[tokio::test]
    async fn test_message_response_retries_until_json() {
        let default = Arc::new(ScriptedProvider::new([
            "sure thing",
            "```json\n{\"user\": \"Rop\", \"text\": \"gm\", \"action\": \"NONE\"}\n```",
        ]));
        let generator = generator(default.clone(), Arc::new(ScriptedProvider::default()));

        let content = generator
            .generate_message_response("ctx", ModelClass::Medium, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.text, "gm");
        assert_eq!(content.action.as_deref(), Some("NONE"));
        assert_eq!(default.call_count(), 2);
    }

    #[tokio::test]
    async fn test_message_response_empty_context() {
        let default = Arc::new(ScriptedProvider::default());
        let generator = generator(default.clone(), Arc::new(ScriptedProvider::default()));

        let content = generator
            .generate_message_response("", ModelClass::Medium, None)
            .await
            .unwrap();
        assert!(content.is_none());
        assert_eq!(default.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tweet_actions_retry_on_empty_output() {
        let default = Arc::new(ScriptedProvider::new(["", "[LIKE]\n[REPLY: same]"]));
        let generator = generator(default.clone(), Arc::new(ScriptedProvider::default()));

        let actions = generator
            .generate_tweet_actions("ctx", ModelClass::Medium, None)
            .await
            .unwrap();
        assert!(actions.like);
        assert_eq!(actions.reply.as_deref(), Some("same"));
        assert_eq!(default.call_count(), 2);
    }

    #[tokio::test]
    async fn test_format_falls_back_to_second_tier() {
        let formatter = Arc::new(ScriptedProvider::default());
        for _ in 0..3 {
            formatter.push_error(ParleyError::model("overloaded"));
        }
        formatter.push_response("\"clean post\"");
        let generator = generator(Arc::new(ScriptedProvider::default()), formatter.clone());

        let text = generator.format_for_platform("messy post").await.unwrap();
        assert_eq!(text, "clean post");

        let requests = formatter.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].model, "meta-llama/Meta-Llama-3.1-405B-Instruct");
        assert_eq!(requests[3].model, "meta-llama/Meta-Llama-3.1-70B-Instruct");
        assert_eq!(requests[0].prompt, "Here is the tweet: messy post");
        assert_eq!(requests[0].max_tokens, 250);
        assert_eq!(requests[0].system.as_deref(), Some(FORMAT_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_format_exhaustion_is_hard_failure() {
        let formatter = Arc::new(ScriptedProvider::default());
        let generator = generator(Arc::new(ScriptedProvider::default()), formatter.clone());

        let err = generator.format_for_platform("post").await.unwrap_err();
        assert!(matches!(err, ParleyError::Generation(_)));
        assert_eq!(formatter.call_count(), 6);
    }

    #[tokio::test]
    async fn test_generate_post_pipeline() {
        let default = Arc::new(ScriptedProvider::new(["'gm frens'"]));
        let formatter = Arc::new(ScriptedProvider::new(["gm frens, formatted"]));
        let generator = generator(default, formatter.clone());

        let post = generator
            .generate_post("ctx", ModelClass::Medium, None)
            .await
            .unwrap();
        assert_eq!(post.as_deref(), Some("gm frens, formatted"));
        assert_eq!(formatter.requests()[0].prompt, "Here is the tweet: 'gm frens'");
    }

    #[tokio::test]
    async fn test_generate_post_no_content_skips_format() {
        let default = Arc::new(ScriptedProvider::new(["   "]));
        let formatter = Arc::new(ScriptedProvider::default());
        let generator = generator(default, formatter.clone());

        let post = generator
            .generate_post("ctx", ModelClass::Medium, None)
            .await
            .unwrap();
        assert!(post.is_none());
        assert_eq!(formatter.call_count(), 0);
    }
}
