//! Timeline action executor
//!
//! Each requested action runs on its own: a failed like never blocks the
//! reply, and only actions that actually went through are reported.

use crate::api::{parse_created_tweet, NewTweet, Tweet};
use crate::base::{format_tweet, TwitterBase};
use crate::meme::MemeGenerator;
use bytes::Bytes;
use parley_core::memory_store::LogEntry;
use parley_core::templates::{
    names, ACTION_RESPONSE_FOOTER, TWITTER_ACTION_TEMPLATE, TWITTER_QUOTE_TEMPLATE,
};
use parley_core::{ActionResponse, ActionTag, Logger, ModelClass, Result, State};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// What was asked for and what went through for one timeline post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// Evaluated post
    pub tweet_id: String,
    /// Parsed model decision
    pub requested: ActionResponse,
    /// Actions that succeeded
    pub executed: BTreeSet<ActionTag>,
}

/// Picks and runs engagement actions for timeline posts
pub struct ActionExecutor {
    base: Arc<TwitterBase>,
    meme: Option<Arc<dyn MemeGenerator>>,
    logger: Logger,
}

impl ActionExecutor {
    /// Executor without meme support; meme requests fall back to text
    pub fn new(base: Arc<TwitterBase>) -> Self {
        Self {
            logger: base.logger("actions"),
            base,
            meme: None,
        }
    }

    /// Enable meme replies
    pub fn with_meme_generator(mut self, meme: Arc<dyn MemeGenerator>) -> Self {
        self.meme = Some(meme);
        self
    }

    /// Fetch the timeline, refresh the snapshot and evaluate every post.
    ///
    /// A failing post is logged and skipped.
    pub async fn process_timeline(&self) -> Result<Vec<ActionOutcome>> {
        let count = self.base.config().timeline_count;
        let timeline = self.base.refresh_home_timeline(count).await?;
        let mut outcomes = Vec::new();
        for tweet in &timeline {
            match self.evaluate(tweet).await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => self
                    .logger
                    .error(&format!("failed to process post {}: {}", tweet.id, e)),
            }
        }
        Ok(outcomes)
    }

    /// Decide on and run actions for one post.
    ///
    /// `None` when the post is already in memory (handled on an earlier run)
    /// or is the agent's own.
    pub async fn evaluate(&self, tweet: &Tweet) -> Result<Option<ActionOutcome>> {
        let config = self.base.config();
        if config.is_own(&tweet.user_id, &tweet.username) {
            return Ok(None);
        }
        if !self.base.ensure_tweet_memory(tweet).await? {
            self.logger
                .debug(&format!("already handled post {}, skipping", tweet.id));
            return Ok(None);
        }

        let runtime = self.base.runtime();
        let state = runtime
            .compose_state(
                None,
                State::new()
                    .with_value("twitterUserName", config.username.clone())
                    .with_value("currentTweet", format_tweet(tweet)),
            )
            .await?;
        let context = runtime.compose_prompt(
            names::TWITTER_ACTION,
            TWITTER_ACTION_TEMPLATE,
            Some(ACTION_RESPONSE_FOOTER),
            &state,
        )?;
        let requested = runtime
            .generator()
            .generate_tweet_actions(&context, ModelClass::Medium, runtime.settings.response_provider)
            .await?;

        let executed = self.execute(tweet, &requested, &state).await;
        self.logger.info(&format!(
            "post {}: requested [{}], executed [{}]",
            tweet.id,
            join(&requested.requested()),
            join(&executed)
        ));

        let outcome = ActionOutcome {
            tweet_id: tweet.id.clone(),
            requested,
            executed,
        };
        let room_id = self.base.room_id(tweet.conversation());
        if let Err(e) = runtime
            .store()
            .log(&LogEntry {
                user_id: runtime.agent_id,
                room_id,
                kind: "action".to_string(),
                body: serde_json::to_value(&outcome)?,
            })
            .await
        {
            self.logger.warn(&format!("failed to log actions: {}", e));
        }
        Ok(Some(outcome))
    }

    async fn execute(
        &self,
        tweet: &Tweet,
        requested: &ActionResponse,
        state: &State,
    ) -> BTreeSet<ActionTag> {
        let api = self.base.api();
        let mut executed = BTreeSet::new();

        if requested.like {
            match api.like_tweet(&tweet.id).await {
                Ok(()) => {
                    executed.insert(ActionTag::Like);
                }
                Err(e) => self.logger.warn(&format!("like {} failed: {}", tweet.id, e)),
            }
        }

        if requested.retweet {
            match api.retweet(&tweet.id).await {
                Ok(()) => {
                    executed.insert(ActionTag::Retweet);
                }
                Err(e) => self.logger.warn(&format!("retweet {} failed: {}", tweet.id, e)),
            }
        }

        if requested.quote.is_some() {
            match self.quote(tweet, state).await {
                Ok(true) => {
                    executed.insert(ActionTag::Quote);
                }
                Ok(false) => {}
                Err(e) => self.logger.warn(&format!("quote {} failed: {}", tweet.id, e)),
            }
        }

        if requested.reply.is_some() {
            let meme_sent = match &requested.meme {
                Some(concept) => self.meme_reply(tweet, concept).await,
                None => false,
            };
            if meme_sent {
                executed.insert(ActionTag::Meme);
            } else {
                match self.text_reply(tweet, state).await {
                    Ok(true) => {
                        executed.insert(ActionTag::Reply);
                    }
                    Ok(false) => {}
                    Err(e) => self.logger.warn(&format!("reply to {} failed: {}", tweet.id, e)),
                }
            }
        } else if let Some(concept) = &requested.meme {
            if self.meme_reply(tweet, concept).await {
                executed.insert(ActionTag::Meme);
            }
        }

        executed
    }

    /// Post text for a quote or reply; `None` when the model produced
    /// nothing usable
    async fn post_text(&self, state: &State) -> Result<Option<String>> {
        let runtime = self.base.runtime();
        let context = runtime.compose_prompt(
            names::TWITTER_QUOTE,
            TWITTER_QUOTE_TEMPLATE,
            None,
            state,
        )?;
        runtime
            .generator()
            .generate_post(&context, ModelClass::Medium, runtime.settings.response_provider)
            .await
    }

    async fn quote(&self, tweet: &Tweet, state: &State) -> Result<bool> {
        let Some(text) = self.post_text(state).await? else {
            self.logger
                .warn(&format!("no quote text for {}, skipping", tweet.id));
            return Ok(false);
        };
        let body = self.base.api().quote_tweet(&tweet.id, &text).await?;
        let created = parse_created_tweet(&body, &self.base.config().username)?;
        self.base
            .record_agent_tweet(&created, &text, Some(self.base.memory_id(&tweet.id)))
            .await?;
        Ok(true)
    }

    async fn text_reply(&self, tweet: &Tweet, state: &State) -> Result<bool> {
        let Some(text) = self.post_text(state).await? else {
            self.logger
                .warn(&format!("no reply text for {}, skipping", tweet.id));
            return Ok(false);
        };
        let body = self
            .base
            .api()
            .send_tweet(&NewTweet::text(text.clone()).in_reply_to(tweet.id.clone()))
            .await?;
        let created = parse_created_tweet(&body, &self.base.config().username)?;
        self.base
            .record_agent_tweet(&created, &text, Some(self.base.memory_id(&tweet.id)))
            .await?;
        Ok(true)
    }

    /// Media-only reply with a generated image; any failed stage abandons it
    async fn meme_reply(&self, tweet: &Tweet, concept: &str) -> bool {
        let Some(meme) = &self.meme else {
            self.logger.debug("meme requested but no generator configured");
            return false;
        };
        let concept = concept.trim();
        if concept.is_empty() {
            self.logger.debug("meme requested without a concept");
            return false;
        }

        let image: Bytes = match meme.generate(concept).await {
            Ok(image) => image,
            Err(e) => {
                self.logger.warn(&format!("meme generation failed: {}", e));
                return false;
            }
        };
        let api = self.base.api();
        let media_id = match api.upload_media(image, "image/jpeg").await {
            Ok(id) => id,
            Err(e) => {
                self.logger.warn(&format!("meme upload failed: {}", e));
                return false;
            }
        };
        let reply = NewTweet::text("")
            .in_reply_to(tweet.id.clone())
            .with_media(vec![media_id]);
        match api.send_tweet(&reply).await {
            Ok(body) => {
                if let Ok(created) = parse_created_tweet(&body, &self.base.config().username) {
                    self.logger
                        .debug(&format!("meme {} posted under {}", created.id, tweet.id));
                }
                true
            }
            Err(e) => {
                self.logger.warn(&format!("meme post failed: {}", e));
                false
            }
        }
    }
}

fn join(tags: &BTreeSet<ActionTag>) -> String {
    tags.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockTwitterApi;
    use crate::config::TwitterConfig;
    use crate::meme::MockMemeGenerator;
    use parley_core::testing::{create_test_runtime, ScriptedProvider};
    use parley_core::{InMemoryMemoryStore, MemoryCache, ParleyError};
    use serde_json::json;

    fn timeline_post() -> Tweet {
        Tweet {
            id: "500".into(),
            name: "Anon".into(),
            username: "anon".into(),
            text: "cats are just small lions with a mortgage".into(),
            conversation_id: "500".into(),
            user_id: "7".into(),
            timestamp: 1_700_000_000,
            ..Default::default()
        }
    }

    fn created(id: &str, text: &str) -> serde_json::Value {
        json!({ "data": { "create_tweet": { "tweet_results": { "result": {
            "rest_id": id,
            "legacy": { "full_text": text, "conversation_id_str": "500", "user_id_str": "99" }
        }}}}})
    }

    fn executor(
        provider: Arc<ScriptedProvider>,
        api: MockTwitterApi,
    ) -> (ActionExecutor, Arc<InMemoryMemoryStore>) {
        let (runtime, store) = create_test_runtime(provider);
        let config = TwitterConfig {
            username: "rop_bot".into(),
            user_id: Some("99".into()),
            ..Default::default()
        };
        let base = Arc::new(TwitterBase::with_cache(
            runtime,
            Arc::new(api),
            config,
            Arc::new(MemoryCache::new()),
        ));
        (ActionExecutor::new(base), store)
    }

    #[tokio::test]
    async fn test_failed_retweet_does_not_block_like_or_reply() {
        // actions, post text, format pass
        let provider = Arc::new(ScriptedProvider::new([
            "[LIKE]\n[RETWEET]\n[REPLY]",
            "small lions, large rent",
            "small lions, large rent",
        ]));
        let mut api = MockTwitterApi::new();
        api.expect_like_tweet().times(1).returning(|_| Ok(()));
        api.expect_retweet()
            .times(1)
            .returning(|_| Err(ParleyError::platform("403 Forbidden")));
        api.expect_send_tweet()
            .withf(|t| t.reply_to.as_deref() == Some("500") && t.text == "small lions, large rent")
            .times(1)
            .returning(|t| Ok(created("600", &t.text)));
        let (executor, store) = executor(provider, api);

        let outcome = executor.evaluate(&timeline_post()).await.unwrap().unwrap();
        assert_eq!(
            outcome.requested.requested(),
            BTreeSet::from([ActionTag::Like, ActionTag::Retweet, ActionTag::Reply])
        );
        assert_eq!(
            outcome.executed,
            BTreeSet::from([ActionTag::Like, ActionTag::Reply])
        );

        let memories = store.memories().await;
        assert_eq!(memories.len(), 2);
        assert_eq!(memories[1].content.text, "small lions, large rent");
        assert_eq!(
            memories[1].content.in_reply_to,
            Some(executor.base.memory_id("500"))
        );
        assert_eq!(store.logs().await[0].kind, "action");
    }

    #[tokio::test]
    async fn test_like_only_runs_no_other_action() {
        // unexpected retweet, quote or send calls panic in the mock
        let provider = Arc::new(ScriptedProvider::new(["[LIKE]"]));
        let mut api = MockTwitterApi::new();
        api.expect_like_tweet()
            .withf(|id| id == "500")
            .times(1)
            .returning(|_| Ok(()));
        let (executor, _store) = executor(provider.clone(), api);

        let outcome = executor.evaluate(&timeline_post()).await.unwrap().unwrap();
        assert_eq!(outcome.executed, BTreeSet::from([ActionTag::Like]));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_known_post_is_skipped() {
        let provider = Arc::new(ScriptedProvider::new(["[LIKE]"]));
        let mut api = MockTwitterApi::new();
        api.expect_like_tweet().times(1).returning(|_| Ok(()));
        let (executor, _store) = executor(provider.clone(), api);

        assert!(executor.evaluate(&timeline_post()).await.unwrap().is_some());
        assert!(executor.evaluate(&timeline_post()).await.unwrap().is_none());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_own_post_is_skipped() {
        let provider = Arc::new(ScriptedProvider::default());
        let (executor, store) = executor(provider.clone(), MockTwitterApi::new());
        let mut own = timeline_post();
        own.user_id = "99".into();

        assert!(executor.evaluate(&own).await.unwrap().is_none());
        assert_eq!(provider.call_count(), 0);
        assert!(store.memories().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_meme_falls_back_to_text_reply() {
        let provider = Arc::new(ScriptedProvider::new([
            "[REPLY]\n[MEME: lion paying rent]",
            "rent is due, king",
            "rent is due, king",
        ]));
        let mut api = MockTwitterApi::new();
        api.expect_upload_media().never();
        api.expect_send_tweet()
            .times(1)
            .returning(|t| Ok(created("601", &t.text)));
        let mut meme = MockMemeGenerator::new();
        meme.expect_generate()
            .times(1)
            .returning(|_| Err(ParleyError::generation("no URL")));

        let (executor, _store) = executor(provider, api);
        let executor = executor.with_meme_generator(Arc::new(meme));

        let outcome = executor.evaluate(&timeline_post()).await.unwrap().unwrap();
        assert_eq!(outcome.executed, BTreeSet::from([ActionTag::Reply]));
    }

    #[tokio::test]
    async fn test_meme_reply_records_only_meme() {
        let provider = Arc::new(ScriptedProvider::new(["[REPLY]\n[MEME: lion paying rent]"]));
        let mut api = MockTwitterApi::new();
        api.expect_upload_media()
            .times(1)
            .returning(|_, _| Ok("media-1".to_string()));
        api.expect_send_tweet()
            .withf(|t| t.text.is_empty() && t.media_ids == vec!["media-1".to_string()])
            .times(1)
            .returning(|_| Ok(created("602", "")));
        let mut meme = MockMemeGenerator::new();
        meme.expect_generate()
            .withf(|concept| concept == "lion paying rent")
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"jpeg")));

        let (executor, _store) = executor(provider, api);
        let executor = executor.with_meme_generator(Arc::new(meme));

        let outcome = executor.evaluate(&timeline_post()).await.unwrap().unwrap();
        assert_eq!(outcome.executed, BTreeSet::from([ActionTag::Meme]));
    }

    #[tokio::test]
    async fn test_quote_skipped_when_no_text() {
        // post text comes back empty, so no format call and no quote
        let provider = Arc::new(ScriptedProvider::new(["[QUOTE]", "   "]));
        let mut api = MockTwitterApi::new();
        api.expect_quote_tweet().never();
        let (executor, _store) = executor(provider, api);

        let outcome = executor.evaluate(&timeline_post()).await.unwrap().unwrap();
        assert!(outcome.executed.is_empty());
    }

    #[tokio::test]
    async fn test_no_tags_is_a_valid_empty_decision() {
        let provider = Arc::new(ScriptedProvider::new(["nothing worth doing here"]));
        let (executor, _store) = executor(provider, MockTwitterApi::new());

        let outcome = executor.evaluate(&timeline_post()).await.unwrap().unwrap();
        assert!(outcome.requested.is_empty());
        assert!(outcome.executed.is_empty());
    }
}
