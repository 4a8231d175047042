//! Mention handling: find new mentions, rebuild their threads and reply

use crate::api::{parse_created_tweet, NewTweet, Tweet};
use crate::base::{format_tweet, TwitterBase};
use crate::thread::{build_thread, format_thread};
use parley_core::memory_store::LogEntry;
use parley_core::templates::{
    names, MESSAGE_COMPLETION_FOOTER, SHOULD_RESPOND_FOOTER, TWITTER_MESSAGE_HANDLER_TEMPLATE,
    TWITTER_SHOULD_RESPOND_TEMPLATE,
};
use parley_core::{
    strip_wrapping_quotes, Content, Logger, Memory, ModelClass, ResponseClassifier, Result,
    ShouldRespond, State,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Attempts per mention before it is skipped
pub const MAX_MENTION_ATTEMPTS: u32 = 3;

/// Answers mentions of the agent's handle
pub struct InteractionHandler {
    base: Arc<TwitterBase>,
    classifier: ResponseClassifier,
    last_checked: Mutex<Option<u64>>,
    failures: Mutex<HashMap<u64, u32>>,
    logger: Logger,
}

impl InteractionHandler {
    /// Handler with no high-water mark loaded yet
    pub fn new(base: Arc<TwitterBase>) -> Self {
        Self {
            classifier: base.runtime().classifier(),
            logger: base.logger("interactions"),
            last_checked: Mutex::new(None),
            failures: Mutex::new(HashMap::new()),
            base,
        }
    }

    /// Highest mention id processed so far
    pub async fn last_checked(&self) -> Option<u64> {
        *self.last_checked.lock().await
    }

    /// Load the persisted high-water mark, if any
    pub async fn load_last_checked(&self) -> Result<Option<u64>> {
        let path = self.base.config().high_water_path();
        let stored = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text.trim().parse::<u64>().ok(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let mut last = self.last_checked.lock().await;
        if stored.is_some() {
            *last = stored;
        }
        Ok(*last)
    }

    async fn save_last_checked(&self, id: u64) -> Result<()> {
        let path = self.base.config().high_water_path();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, id.to_string()).await?;
        Ok(())
    }

    /// One mention check.
    ///
    /// New mentions are handled oldest first. The high-water mark advances
    /// past each mention once it is fully handled and is written once at the
    /// end of the batch. A failure ends the batch so the mention is retried on
    /// the next check; after [`MAX_MENTION_ATTEMPTS`] failures it is skipped.
    /// Returns the number of replies sent.
    pub async fn check_mentions(&self) -> Result<usize> {
        let config = self.base.config();
        let query = format!("@{}", config.username);
        let found = self
            .base
            .api()
            .search_tweets(&query, config.search_count)
            .await?;

        // dedupe and order by numeric id
        let candidates: BTreeMap<u64, Tweet> = found
            .into_iter()
            .filter(|t| !config.is_own(&t.user_id, &t.username))
            .filter_map(|t| t.numeric_id().map(|id| (id, t)))
            .collect();

        let start = self.last_checked().await;
        let mut newest = start;
        let mut replies = 0;
        for (id, tweet) in candidates {
            if start.is_some_and(|last| id <= last) {
                continue;
            }
            match self.handle_tweet(&tweet).await {
                Ok(handled) => {
                    if handled.is_some() {
                        replies += 1;
                    }
                    self.failures.lock().await.remove(&id);
                }
                Err(e) => {
                    let mut failures = self.failures.lock().await;
                    let attempts = failures.entry(id).or_insert(0);
                    *attempts += 1;
                    if *attempts < MAX_MENTION_ATTEMPTS {
                        self.logger.error(&format!(
                            "failed to handle mention {} (attempt {}), retrying next check: {}",
                            tweet.id, attempts, e
                        ));
                        break;
                    }
                    failures.remove(&id);
                    self.logger.error(&format!(
                        "giving up on mention {} after {} attempts: {}",
                        tweet.id, MAX_MENTION_ATTEMPTS, e
                    ));
                }
            }
            newest = Some(id);
        }

        if newest != start {
            *self.last_checked.lock().await = newest;
            if let Some(id) = newest {
                if let Err(e) = self.save_last_checked(id).await {
                    self.logger
                        .error(&format!("failed to save latest checked mention id: {}", e));
                }
            }
        }
        Ok(replies)
    }

    /// Decide on and send a reply to one mention; returns the reply memory
    pub async fn handle_tweet(&self, tweet: &Tweet) -> Result<Option<Memory>> {
        if tweet.text.trim().is_empty() {
            self.logger
                .debug(&format!("mention {} has no text, skipping", tweet.id));
            return Ok(None);
        }
        let runtime = self.base.runtime();
        let config = self.base.config();

        self.base.ensure_author(tweet).await?;
        let thread = build_thread(&self.base, tweet, config.max_thread_depth).await;
        self.base.ensure_tweet_memory(tweet).await?;
        let inbound = self.base.tweet_memory(tweet);

        let timeline = match self.base.cached_home_timeline().await {
            Ok(timeline) => self.base.format_timeline(&timeline),
            Err(e) => {
                self.logger
                    .warn(&format!("home timeline unavailable: {}", e));
                String::new()
            }
        };

        let state = runtime
            .compose_state(
                Some(&inbound),
                State::new()
                    .with_value("twitterUserName", config.username.clone())
                    .with_value("currentPost", format_tweet(tweet))
                    .with_value("formattedConversation", format_thread(&thread))
                    .with_value("timeline", timeline),
            )
            .await?;

        let should_respond_context = runtime.compose_prompt(
            names::TWITTER_SHOULD_RESPOND,
            TWITTER_SHOULD_RESPOND_TEMPLATE,
            Some(SHOULD_RESPOND_FOOTER),
            &state,
        )?;
        let decision = self
            .classifier
            .classify(&should_respond_context, ModelClass::Large)
            .await?;
        if decision != ShouldRespond::Respond {
            self.logger
                .debug(&format!("not responding to {}: {}", tweet.id, decision));
            return Ok(None);
        }

        let context = runtime.compose_prompt(
            names::TWITTER_MESSAGE_HANDLER,
            TWITTER_MESSAGE_HANDLER_TEMPLATE,
            Some(MESSAGE_COMPLETION_FOOTER),
            &state,
        )?;
        let generator = runtime.generator();
        let response = generator
            .generate_message_response(&context, ModelClass::Medium, runtime.settings.response_provider)
            .await?;
        let Some(response) = response.filter(Content::has_text) else {
            self.logger
                .warn(&format!("no reply generated for {}", tweet.id));
            return Ok(None);
        };

        let text = strip_wrapping_quotes(&generator.format_for_platform(&response.text).await?);
        if text.is_empty() {
            return Ok(None);
        }

        let body = self
            .base
            .api()
            .send_tweet(&NewTweet::text(text.clone()).in_reply_to(tweet.id.clone()))
            .await?;
        let created = parse_created_tweet(&body, &config.username)?;
        let memory = self
            .base
            .record_agent_tweet(&created, &text, Some(inbound.id))
            .await?;

        runtime
            .store()
            .log(&LogEntry {
                user_id: inbound.user_id,
                room_id: inbound.room_id,
                kind: "response".to_string(),
                body: serde_json::json!({
                    "tweet_id": tweet.id,
                    "context": context,
                    "response": text,
                    "reply_id": created.id,
                }),
            })
            .await?;
        self.logger
            .info(&format!("replied to {} with {}", tweet.id, created.id));
        Ok(Some(memory))
    }
}
