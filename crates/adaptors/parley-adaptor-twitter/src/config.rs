//! Twitter client configuration

use parley_core::{
    get_env_bool, get_env_int, get_env_optional, get_env_or, get_required_env, ParleyError, Result,
};
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

/// Inclusive range a loop draws its next delay from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalRange {
    /// Shortest delay
    pub min: Duration,
    /// Longest delay
    pub max: Duration,
}

impl IntervalRange {
    /// Range of whole minutes
    pub fn minutes(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min * 60),
            max: Duration::from_secs(max.max(min) * 60),
        }
    }

    /// Draw a delay, rounded to whole minutes when the bounds are
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let (min, max) = (self.min.as_secs(), self.max.as_secs());
        let mut rng = rand::thread_rng();
        if min % 60 == 0 && max % 60 == 0 {
            Duration::from_secs(rng.gen_range(min / 60..=max / 60) * 60)
        } else {
            Duration::from_secs(rng.gen_range(min..=max))
        }
    }
}

/// Twitter client settings
#[derive(Debug, Clone)]
pub struct TwitterConfig {
    /// Agent handle without `@`
    pub username: String,
    /// Agent's numeric user id; posts by it are never answered
    pub user_id: Option<String>,
    /// Base URL of the Twitter HTTP gateway
    pub api_url: String,
    /// Bearer token for the gateway
    pub api_token: Option<String>,
    /// Image generation key; memes are disabled without it
    pub glif_api_key: Option<String>,
    /// Parent hops followed when rebuilding a reply thread
    pub max_thread_depth: usize,
    /// Directory for the timeline snapshot and the mention high-water mark
    pub cache_dir: PathBuf,
    /// Age after which the timeline snapshot is refetched for prompts
    pub timeline_cache_ttl: Option<Duration>,
    /// Mentions fetched per check
    pub search_count: usize,
    /// Timeline posts evaluated per action run
    pub timeline_count: usize,
    /// Timeline posts shown in prompts
    pub prompt_timeline_count: usize,
    /// Delay between mention checks
    pub mention_interval: IntervalRange,
    /// Delay between standalone posts
    pub post_interval: IntervalRange,
    /// Delay between timeline action runs
    pub action_interval: IntervalRange,
    /// Run the standalone post loop
    pub enable_posts: bool,
    /// Run the timeline action loop
    pub enable_actions: bool,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            user_id: None,
            api_url: "http://localhost:3100".to_string(),
            api_token: None,
            glif_api_key: None,
            max_thread_depth: 10,
            cache_dir: PathBuf::from("tweetcache"),
            timeline_cache_ttl: None,
            search_count: 20,
            timeline_count: 15,
            prompt_timeline_count: 50,
            mention_interval: IntervalRange::minutes(2, 5),
            post_interval: IntervalRange::minutes(30, 60),
            action_interval: IntervalRange::minutes(30, 60),
            enable_posts: true,
            enable_actions: true,
        }
    }
}

impl TwitterConfig {
    /// Read settings from the environment; `TWITTER_USERNAME` is required
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let username = get_required_env("TWITTER_USERNAME")?
            .trim()
            .trim_start_matches('@')
            .to_string();
        if username.is_empty() {
            return Err(ParleyError::config("TWITTER_USERNAME must not be blank"));
        }

        let interval = |prefix: &str, default: IntervalRange| {
            IntervalRange::minutes(
                get_env_int(&format!("{}_MIN_MINUTES", prefix), default.min.as_secs() / 60),
                get_env_int(&format!("{}_MAX_MINUTES", prefix), default.max.as_secs() / 60),
            )
        };

        Ok(Self {
            username,
            user_id: get_env_optional("TWITTER_USER_ID"),
            api_url: get_env_or("TWITTER_API_URL", &defaults.api_url),
            api_token: get_env_optional("TWITTER_API_TOKEN"),
            glif_api_key: get_env_optional("GLIF_API_KEY"),
            max_thread_depth: get_env_int("TWITTER_MAX_THREAD_DEPTH", defaults.max_thread_depth),
            cache_dir: PathBuf::from(get_env_or("TWITTER_CACHE_DIR", "tweetcache")),
            timeline_cache_ttl: get_env_optional("TWITTER_TIMELINE_CACHE_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
            mention_interval: interval("TWITTER_MENTION_INTERVAL", defaults.mention_interval),
            post_interval: interval("TWITTER_POST_INTERVAL", defaults.post_interval),
            action_interval: interval("TWITTER_ACTION_INTERVAL", defaults.action_interval),
            enable_posts: get_env_bool("TWITTER_ENABLE_POSTS", true),
            enable_actions: get_env_bool("TWITTER_ENABLE_ACTIONS", true),
            ..defaults
        })
    }

    /// File holding the highest processed mention id
    pub fn high_water_path(&self) -> PathBuf {
        self.cache_dir.join("latest_checked_tweet_id.txt")
    }

    /// Whether a post by `user_id` / `username` is the agent's own
    pub fn is_own(&self, user_id: &str, username: &str) -> bool {
        self.user_id.as_deref().is_some_and(|id| id == user_id)
            || username.eq_ignore_ascii_case(&self.username)
    }
}
