//! Standalone posts

use crate::api::{parse_created_tweet, NewTweet};
use crate::base::TwitterBase;
use parley_core::templates::{names, TWITTER_POST_TEMPLATE};
use parley_core::{Logger, Memory, ModelClass, Result, State};
use std::sync::Arc;

/// Writes and publishes posts in the agent's voice
pub struct PostGenerator {
    base: Arc<TwitterBase>,
    logger: Logger,
}

impl PostGenerator {
    /// Generator posting through `base`
    pub fn new(base: Arc<TwitterBase>) -> Self {
        Self {
            logger: base.logger("post"),
            base,
        }
    }

    /// Generate one post and publish it.
    ///
    /// `None` when the model produced nothing usable; nothing is sent then.
    /// The recorded memory holds the text as published, after the format
    /// pass.
    pub async fn generate_and_post(&self) -> Result<Option<Memory>> {
        let runtime = self.base.runtime();
        let config = self.base.config();

        let timeline = match self.base.cached_home_timeline().await {
            Ok(timeline) => self.base.format_timeline(&timeline),
            Err(e) => {
                self.logger.warn(&format!("home timeline unavailable: {}", e));
                String::new()
            }
        };
        let state = runtime
            .compose_state(
                None,
                State::new()
                    .with_value("twitterUserName", config.username.clone())
                    .with_value("timeline", timeline),
            )
            .await?;
        let context = runtime.compose_prompt(names::TWITTER_POST, TWITTER_POST_TEMPLATE, None, &state)?;

        let Some(text) = runtime
            .generator()
            .generate_post(&context, ModelClass::Medium, runtime.settings.response_provider)
            .await?
        else {
            self.logger.warn("post generation produced no text, nothing sent");
            return Ok(None);
        };

        let body = self.base.api().send_tweet(&NewTweet::text(text.clone())).await?;
        let created = parse_created_tweet(&body, &config.username)?;
        let memory = self.base.record_agent_tweet(&created, &text, None).await?;
        self.logger.info(&format!("posted {}: {}", created.id, text));
        Ok(Some(memory))
    }
}
