//! Twitter platform boundary

use async_trait::async_trait;
use bytes::Bytes;
use parley_core::{ParleyError, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// A post as seen on the platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tweet {
    /// Numeric id as a string
    pub id: String,
    /// Author display name
    pub name: String,
    /// Author handle without `@`
    pub username: String,
    /// Body
    pub text: String,
    /// Id of the conversation root
    pub conversation_id: String,
    /// Author id
    pub user_id: String,
    /// Parent post, if this is a reply
    pub in_reply_to_status_id: Option<String>,
    /// Permalink
    pub permanent_url: Option<String>,
    /// Unix time in seconds
    pub timestamp: i64,
}

impl Tweet {
    /// Id as a number for ordering; `None` when not numeric
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }

    /// Conversation id, falling back to the post's own id
    pub fn conversation(&self) -> &str {
        if self.conversation_id.is_empty() {
            &self.id
        } else {
            &self.conversation_id
        }
    }

    /// Parent id when present and non-empty
    pub fn parent_id(&self) -> Option<&str> {
        self.in_reply_to_status_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

/// Body of a post to create
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewTweet {
    /// Text, empty for media-only posts
    pub text: String,
    /// Post to reply to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Uploaded media ids
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_ids: Vec<String>,
}

impl NewTweet {
    /// Plain text post
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Make this a reply to `tweet_id`
    pub fn in_reply_to(mut self, tweet_id: impl Into<String>) -> Self {
        self.reply_to = Some(tweet_id.into());
        self
    }

    /// Attach uploaded media
    pub fn with_media(mut self, media_ids: Vec<String>) -> Self {
        self.media_ids = media_ids;
        self
    }
}

/// Operations the loops need from the platform.
///
/// `send_tweet` and `quote_tweet` return the raw creation body; see
/// [`parse_created_tweet`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TwitterApi: Send + Sync {
    /// Latest posts matching `query`
    async fn search_tweets(&self, query: &str, max: usize) -> Result<Vec<Tweet>>;

    /// Most recent posts from the home timeline
    async fn fetch_home_timeline(&self, count: usize) -> Result<Vec<Tweet>>;

    /// A single post; `None` when it does not exist
    async fn get_tweet(&self, id: &str) -> Result<Option<Tweet>>;

    /// Create a post
    async fn send_tweet(&self, tweet: &NewTweet) -> Result<Value>;

    /// Quote `tweet_id` with `text`
    async fn quote_tweet(&self, tweet_id: &str, text: &str) -> Result<Value>;

    /// Like a post
    async fn like_tweet(&self, tweet_id: &str) -> Result<()>;

    /// Repost without comment
    async fn retweet(&self, tweet_id: &str) -> Result<()>;

    /// Upload media and return its id
    async fn upload_media(&self, data: Bytes, mime_type: &str) -> Result<String>;
}

/// Extract the created post from a
/// `data.create_tweet.tweet_results.result` body.
///
/// `username` builds the permalink since the body does not carry it.
pub fn parse_created_tweet(body: &Value, username: &str) -> Result<Tweet> {
    let result = body
        .pointer("/data/create_tweet/tweet_results/result")
        .ok_or_else(|| ParleyError::parse("created tweet body has no tweet_results.result"))?;

    let id = result
        .get("rest_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ParleyError::parse("created tweet has no rest_id"))?
        .to_string();

    let legacy = result.get("legacy").cloned().unwrap_or(Value::Null);
    let field = |name: &str| legacy.get(name).and_then(Value::as_str).map(str::to_string);

    let timestamp = field("created_at")
        .and_then(|s| chrono::DateTime::parse_from_str(&s, "%a %b %d %H:%M:%S %z %Y").ok())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    Ok(Tweet {
        permanent_url: Some(format!("https://twitter.com/{}/status/{}", username, id)),
        text: field("full_text").unwrap_or_default(),
        conversation_id: field("conversation_id_str").unwrap_or_else(|| id.clone()),
        user_id: field("user_id_str").unwrap_or_default(),
        in_reply_to_status_id: field("in_reply_to_status_id_str"),
        username: username.to_string(),
        timestamp,
        id,
        ..Default::default()
    })
}

#[derive(Deserialize)]
struct TweetList {
    #[serde(default)]
    tweets: Vec<Tweet>,
}

#[derive(Deserialize)]
struct MediaUpload {
    media_id_string: String,
}

/// [`TwitterApi`] over a JSON HTTP gateway
pub struct HttpTwitterApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTwitterApi {
    /// Client for the gateway at `base_url`, authenticated with an optional
    /// bearer token
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::platform(format!(
                "twitter {} failed with {}: {}",
                what, status, body
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TwitterApi for HttpTwitterApi {
    async fn search_tweets(&self, query: &str, max: usize) -> Result<Vec<Tweet>> {
        let builder = self.request(Method::GET, "/search").query(&[
            ("q", query),
            ("count", max.to_string().as_str()),
            ("mode", "latest"),
        ]);
        let list: TweetList = self.send(builder, "search").await?;
        Ok(list.tweets)
    }

    async fn fetch_home_timeline(&self, count: usize) -> Result<Vec<Tweet>> {
        let builder = self
            .request(Method::GET, "/timeline/home")
            .query(&[("count", count)]);
        let list: TweetList = self.send(builder, "home timeline").await?;
        Ok(list.tweets)
    }

    async fn get_tweet(&self, id: &str) -> Result<Option<Tweet>> {
        let response = self
            .request(Method::GET, &format!("/tweets/{}", id))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(ParleyError::platform(format!(
                "twitter get_tweet {} failed with {}",
                id, status
            ))),
        }
    }

    async fn send_tweet(&self, tweet: &NewTweet) -> Result<Value> {
        let builder = self.request(Method::POST, "/tweets").json(tweet);
        self.send(builder, "send_tweet").await
    }

    async fn quote_tweet(&self, tweet_id: &str, text: &str) -> Result<Value> {
        let builder = self
            .request(Method::POST, "/tweets/quote")
            .json(&serde_json::json!({ "tweet_id": tweet_id, "text": text }));
        self.send(builder, "quote_tweet").await
    }

    async fn like_tweet(&self, tweet_id: &str) -> Result<()> {
        let builder = self.request(Method::POST, &format!("/tweets/{}/like", tweet_id));
        let _: Value = self.send(builder, "like").await?;
        Ok(())
    }

    async fn retweet(&self, tweet_id: &str) -> Result<()> {
        let builder = self.request(Method::POST, &format!("/tweets/{}/retweet", tweet_id));
        let _: Value = self.send(builder, "retweet").await?;
        Ok(())
    }

    async fn upload_media(&self, data: Bytes, mime_type: &str) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name("media")
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("media", part);
        let builder = self.request(Method::POST, "/media").multipart(form);
        let upload: MediaUpload = self.send(builder, "upload_media").await?;
        Ok(upload.media_id_string)
    }
}
