//! Mention and timeline runs against an in-memory platform and a scripted
//! model

use async_trait::async_trait;
use bytes::Bytes;
use parley_adaptor_twitter::{
    ActionExecutor, InteractionHandler, NewTweet, Tweet, TwitterApi, TwitterBase, TwitterConfig,
};
use parley_core::testing::{create_test_runtime, ScriptedProvider};
use parley_core::{ActionTag, MemoryCache, ParleyError, Result};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeTwitter {
    posts: HashMap<String, Tweet>,
    mentions: Vec<Tweet>,
    timeline: Vec<Tweet>,
    sent: Mutex<Vec<NewTweet>>,
    liked: Mutex<Vec<String>>,
    fail_likes: bool,
}

impl FakeTwitter {
    fn with_posts(mut self, posts: Vec<Tweet>) -> Self {
        self.posts = posts.into_iter().map(|t| (t.id.clone(), t)).collect();
        self
    }
}

#[async_trait]
impl TwitterApi for FakeTwitter {
    async fn search_tweets(&self, _query: &str, max: usize) -> Result<Vec<Tweet>> {
        Ok(self.mentions.iter().take(max).cloned().collect())
    }

    async fn fetch_home_timeline(&self, count: usize) -> Result<Vec<Tweet>> {
        Ok(self.timeline.iter().take(count).cloned().collect())
    }

    async fn get_tweet(&self, id: &str) -> Result<Option<Tweet>> {
        Ok(self.posts.get(id).cloned())
    }

    async fn send_tweet(&self, tweet: &NewTweet) -> Result<Value> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(tweet.clone());
        Ok(json!({ "data": { "create_tweet": { "tweet_results": { "result": {
            "rest_id": format!("{}", 9000 + sent.len()),
            "legacy": {
                "full_text": tweet.text,
                "conversation_id_str": "100",
                "user_id_str": "99",
                "in_reply_to_status_id_str": tweet.reply_to,
            }
        }}}}}))
    }

    async fn quote_tweet(&self, _tweet_id: &str, _text: &str) -> Result<Value> {
        Err(ParleyError::platform("quotes disabled"))
    }

    async fn like_tweet(&self, tweet_id: &str) -> Result<()> {
        if self.fail_likes {
            return Err(ParleyError::platform("429 Too Many Requests"));
        }
        self.liked.lock().unwrap().push(tweet_id.to_string());
        Ok(())
    }

    async fn retweet(&self, _tweet_id: &str) -> Result<()> {
        Ok(())
    }

    async fn upload_media(&self, _data: Bytes, _mime_type: &str) -> Result<String> {
        Err(ParleyError::platform("media disabled"))
    }
}

fn tweet(id: &str, user: &str, text: &str, parent: Option<&str>) -> Tweet {
    Tweet {
        id: id.into(),
        name: user.to_uppercase(),
        username: user.into(),
        text: text.into(),
        conversation_id: "100".into(),
        user_id: format!("{}-id", user),
        in_reply_to_status_id: parent.map(str::to_string),
        timestamp: 1_700_000_000,
        ..Default::default()
    }
}

fn config(dir: &std::path::Path) -> TwitterConfig {
    TwitterConfig {
        username: "rop_bot".into(),
        user_id: Some("99".into()),
        cache_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_mention_reply_sees_whole_thread() {
    let dir = tempfile::tempdir().unwrap();
    let root = tweet("100", "alice", "lions are overrated", None);
    let middle = tweet("101", "bob", "hard disagree", Some("100"));
    let leaf = tweet("102", "carol", "@rop_bot settle this", Some("101"));
    let api = FakeTwitter {
        mentions: vec![leaf.clone()],
        ..Default::default()
    }
    .with_posts(vec![root, middle]);
    let api = Arc::new(api);

    let provider = Arc::new(ScriptedProvider::new([
        "[RESPOND]".to_string(),
        json!({ "user": "Rop", "text": "lions are correctly rated" }).to_string(),
        "lions are correctly rated".to_string(),
    ]));
    let (runtime, store) = create_test_runtime(provider.clone());
    let base = Arc::new(TwitterBase::with_cache(
        runtime,
        api.clone(),
        config(dir.path()),
        Arc::new(MemoryCache::new()),
    ));
    let handler = InteractionHandler::new(base.clone());

    assert_eq!(handler.check_mentions().await.unwrap(), 1);

    let classify_prompt = &provider.requests()[0].prompt;
    let root_at = classify_prompt.find("lions are overrated").unwrap();
    let leaf_at = classify_prompt.rfind("settle this").unwrap();
    assert!(root_at < leaf_at);

    let sent = api.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "lions are correctly rated");
    assert_eq!(sent[0].reply_to.as_deref(), Some("102"));

    // three thread posts plus the reply
    assert_eq!(store.memories().await.len(), 4);
    assert_eq!(handler.last_checked().await, Some(102));
    let saved = std::fs::read_to_string(dir.path().join("latest_checked_tweet_id.txt")).unwrap();
    assert_eq!(saved, "102");
}

#[tokio::test]
async fn test_timeline_run_isolates_failures_and_skips_seen_posts() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeTwitter {
        timeline: vec![
            tweet("200", "dave", "new chart just dropped", None),
            tweet("201", "erin", "gm", None),
        ],
        fail_likes: true,
        ..Default::default()
    });

    let provider = Arc::new(ScriptedProvider::new([
        "[LIKE]\n[REPLY]",
        "charts are horoscopes for men",
        "charts are horoscopes for men",
        "[RETWEET]",
    ]));
    let (runtime, _store) = create_test_runtime(provider.clone());
    let base = Arc::new(TwitterBase::with_cache(
        runtime,
        api.clone(),
        config(dir.path()),
        Arc::new(MemoryCache::new()),
    ));
    let executor = ActionExecutor::new(base);

    let outcomes = executor.process_timeline().await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].executed, BTreeSet::from([ActionTag::Reply]));
    assert_eq!(outcomes[1].executed, BTreeSet::from([ActionTag::Retweet]));
    assert!(api.liked.lock().unwrap().is_empty());

    // nothing new on the second run
    let calls = provider.call_count();
    assert!(executor.process_timeline().await.unwrap().is_empty());
    assert_eq!(provider.call_count(), calls);
}
