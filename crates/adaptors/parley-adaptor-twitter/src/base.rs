//! State and helpers shared by the Twitter loops

use crate::api::{Tweet, TwitterApi};
use crate::config::TwitterConfig;
use parley_core::memory_store::Connection;
use parley_core::{
    get_or_fetch, now_millis, platform_uuid, AgentRuntime, Content, FileCache, KeyedCache, Logger,
    Memory, Result, UUID,
};
use std::sync::Arc;

const SOURCE: &str = "twitter";
const TIMELINE_CACHE_KEY: &str = "home_timeline";

/// Runtime, platform client, settings and timeline cache for one account
pub struct TwitterBase {
    runtime: Arc<AgentRuntime>,
    api: Arc<dyn TwitterApi>,
    config: TwitterConfig,
    cache: Arc<dyn KeyedCache>,
    logger: Logger,
}

impl TwitterBase {
    /// Base caching the timeline under `config.cache_dir`
    pub fn new(runtime: Arc<AgentRuntime>, api: Arc<dyn TwitterApi>, config: TwitterConfig) -> Self {
        let cache = Arc::new(FileCache::new(config.cache_dir.clone()));
        Self::with_cache(runtime, api, config, cache)
    }

    /// Base with an explicit cache
    pub fn with_cache(
        runtime: Arc<AgentRuntime>,
        api: Arc<dyn TwitterApi>,
        config: TwitterConfig,
        cache: Arc<dyn KeyedCache>,
    ) -> Self {
        Self {
            logger: runtime.logger("twitter"),
            runtime,
            api,
            config,
            cache,
        }
    }

    /// Agent runtime
    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }

    /// Platform client
    pub fn api(&self) -> &Arc<dyn TwitterApi> {
        &self.api
    }

    /// Settings
    pub fn config(&self) -> &TwitterConfig {
        &self.config
    }

    /// Logger for a loop (`twitter:<name>`)
    pub fn logger(&self, name: &str) -> Logger {
        self.logger.child(name)
    }

    /// Memory id of a post
    pub fn memory_id(&self, tweet_id: &str) -> UUID {
        platform_uuid(tweet_id, self.runtime.agent_id)
    }

    /// Room of a conversation
    pub fn room_id(&self, conversation_id: &str) -> UUID {
        platform_uuid(conversation_id, self.runtime.agent_id)
    }

    /// Participant id of a post's author; the agent's own posts map to the
    /// agent id
    pub fn author_id(&self, tweet: &Tweet) -> UUID {
        if self.config.is_own(&tweet.user_id, &tweet.username) {
            self.runtime.agent_id
        } else {
            platform_uuid(&tweet.user_id, self.runtime.agent_id)
        }
    }

    /// Register a post's author as a participant of its conversation
    pub async fn ensure_author(&self, tweet: &Tweet) -> Result<()> {
        let display_name = if tweet.name.is_empty() {
            tweet.username.clone()
        } else {
            tweet.name.clone()
        };
        self.runtime
            .store()
            .ensure_connection(&Connection {
                user_id: self.author_id(tweet),
                room_id: self.room_id(tweet.conversation()),
                user_name: tweet.username.clone(),
                display_name,
                source: SOURCE.to_string(),
            })
            .await
    }

    /// Memory mirroring a post as written by its author
    pub fn tweet_memory(&self, tweet: &Tweet) -> Memory {
        let mut content = Content {
            text: tweet.text.clone(),
            source: Some(SOURCE.to_string()),
            url: tweet.permanent_url.clone(),
            in_reply_to: tweet.parent_id().map(|id| self.memory_id(id)),
            ..Default::default()
        };
        content
            .metadata
            .insert("userName".into(), tweet.username.clone().into());

        Memory::new(
            self.memory_id(&tweet.id),
            self.runtime.agent_id,
            self.author_id(tweet),
            self.room_id(tweet.conversation()),
            content,
            timestamp_millis(tweet.timestamp),
        )
    }

    /// Store a post (and its author) unless it is already known.
    ///
    /// Returns whether a new memory was written.
    pub async fn ensure_tweet_memory(&self, tweet: &Tweet) -> Result<bool> {
        let id = self.memory_id(&tweet.id);
        if self.runtime.store().get_memory_by_id(id).await?.is_some() {
            return Ok(false);
        }
        self.ensure_author(tweet).await?;
        self.runtime.store().create_memory(&self.tweet_memory(tweet)).await
    }

    /// Record a post the agent created with `text`; `in_reply_to` links it to
    /// the post it answers
    pub async fn record_agent_tweet(
        &self,
        created: &Tweet,
        text: &str,
        in_reply_to: Option<UUID>,
    ) -> Result<Memory> {
        let agent_id = self.runtime.agent_id;
        let room_id = self.room_id(created.conversation());
        let store = self.runtime.store();
        store.ensure_room_exists(room_id).await?;
        store.ensure_participant_in_room(agent_id, room_id).await?;

        let memory = Memory::new(
            self.memory_id(&created.id),
            agent_id,
            agent_id,
            room_id,
            Content {
                text: text.trim().to_string(),
                source: Some(SOURCE.to_string()),
                url: created.permanent_url.clone(),
                in_reply_to,
                ..Default::default()
            },
            timestamp_millis(created.timestamp),
        );
        store.create_memory(&memory).await?;
        Ok(memory)
    }

    /// Home timeline for prompts, served from the snapshot when fresh
    pub async fn cached_home_timeline(&self) -> Result<Vec<Tweet>> {
        let count = self.config.prompt_timeline_count;
        get_or_fetch(
            self.cache.as_ref(),
            TIMELINE_CACHE_KEY,
            self.config.timeline_cache_ttl,
            || self.api.fetch_home_timeline(count),
        )
        .await
    }

    /// Fetch `count` timeline posts and overwrite the snapshot
    pub async fn refresh_home_timeline(&self, count: usize) -> Result<Vec<Tweet>> {
        let timeline = self.api.fetch_home_timeline(count).await?;
        if let Err(e) = self
            .cache
            .write(TIMELINE_CACHE_KEY, &serde_json::to_value(&timeline)?)
            .await
        {
            self.logger
                .warn(&format!("failed to refresh timeline snapshot: {}", e));
        }
        Ok(timeline)
    }

    /// Timeline section for prompts
    pub fn format_timeline(&self, timeline: &[Tweet]) -> String {
        let body: Vec<String> = timeline.iter().map(format_tweet).collect();
        format!(
            "# {}'s Home Timeline\n\n{}",
            self.runtime.character.name,
            body.join("\n")
        )
    }
}

/// One post as shown in prompts
pub fn format_tweet(tweet: &Tweet) -> String {
    let reply = tweet
        .parent_id()
        .map(|id| format!(" In reply to: {}", id))
        .unwrap_or_default();
    format!(
        "ID: {}\nFrom: {} (@{}){}\nText: {}\n---\n",
        tweet.id, tweet.name, tweet.username, reply, tweet.text
    )
}

fn timestamp_millis(seconds: i64) -> i64 {
    if seconds > 0 {
        seconds * 1000
    } else {
        now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockTwitterApi;
    use parley_core::testing::{create_test_runtime, ScriptedProvider};
    use parley_core::MemoryCache;

    fn tweet(id: &str, parent: Option<&str>) -> Tweet {
        Tweet {
            id: id.into(),
            name: "Anon".into(),
            username: "anon".into(),
            text: format!("post {}", id),
            conversation_id: "1".into(),
            user_id: "7".into(),
            in_reply_to_status_id: parent.map(str::to_string),
            timestamp: 1_700_000_000,
            ..Default::default()
        }
    }

    fn base(api: MockTwitterApi) -> (TwitterBase, Arc<parley_core::InMemoryMemoryStore>) {
        let (runtime, store) = create_test_runtime(Arc::new(ScriptedProvider::default()));
        let config = TwitterConfig {
            username: "rop_bot".into(),
            user_id: Some("99".into()),
            ..Default::default()
        };
        let base = TwitterBase::with_cache(runtime, Arc::new(api), config, Arc::new(MemoryCache::new()));
        (base, store)
    }

    #[tokio::test]
    async fn test_tweet_memory_is_written_once() {
        let (base, store) = base(MockTwitterApi::new());
        let post = tweet("5", Some("4"));

        assert!(base.ensure_tweet_memory(&post).await.unwrap());
        assert!(!base.ensure_tweet_memory(&post).await.unwrap());

        let memories = store.memories().await;
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].content.in_reply_to, Some(base.memory_id("4")));
        assert_eq!(memories[0].created_at, 1_700_000_000_000);
        assert!(store.is_participant(base.author_id(&post), base.room_id("1")).await);
    }

    #[tokio::test]
    async fn test_own_posts_are_authored_by_agent() {
        let (base, _store) = base(MockTwitterApi::new());
        let mut own = tweet("6", None);
        own.user_id = "99".into();
        assert_eq!(base.author_id(&own), base.runtime().agent_id);
    }

    #[tokio::test]
    async fn test_timeline_snapshot_is_reused() {
        let mut api = MockTwitterApi::new();
        api.expect_fetch_home_timeline()
            .times(1)
            .returning(|_| Ok(vec![tweet("1", None)]));
        let (base, _store) = base(api);

        let first = base.cached_home_timeline().await.unwrap();
        let second = base.cached_home_timeline().await.unwrap();
        assert_eq!(first, second);
        assert!(base.format_timeline(&first).starts_with("# Rop's Home Timeline"));
    }

    #[test]
    fn test_format_tweet_mentions_parent() {
        let text = format_tweet(&tweet("5", Some("4")));
        assert_eq!(text, "ID: 5\nFrom: Anon (@anon) In reply to: 4\nText: post 5\n---\n");
    }
}
