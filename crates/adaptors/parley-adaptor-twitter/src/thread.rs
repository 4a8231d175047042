//! Reply-thread reconstruction

use crate::api::Tweet;
use crate::base::TwitterBase;
use std::collections::{HashSet, VecDeque};

/// Walk from `leaf` toward the root through parent links and return the
/// thread ordered root first.
///
/// Every post seen for the first time is mirrored into memory. The walk
/// stops at a repeated id, after `max_depth` posts, at a post without a
/// parent, or when a parent cannot be fetched; a partial thread is still a
/// valid result.
pub async fn build_thread(base: &TwitterBase, leaf: &Tweet, max_depth: usize) -> Vec<Tweet> {
    let logger = base.logger("thread");
    let mut thread = VecDeque::new();
    let mut visited = HashSet::new();
    let mut current = leaf.clone();

    for depth in 0..max_depth {
        if !visited.insert(current.id.clone()) {
            logger.debug(&format!("already visited {}, stopping", current.id));
            break;
        }
        if let Err(e) = base.ensure_tweet_memory(&current).await {
            logger.warn(&format!("failed to store post {}: {}", current.id, e));
        }

        let parent_id = current.parent_id().map(str::to_string);
        thread.push_front(current);

        let Some(parent_id) = parent_id else {
            break;
        };
        if depth + 1 == max_depth {
            logger.debug(&format!("reached max thread depth {}", max_depth));
            break;
        }

        match base.api().get_tweet(&parent_id).await {
            Ok(Some(parent)) => current = parent,
            Ok(None) => {
                logger.debug(&format!("parent {} not found, thread truncated", parent_id));
                break;
            }
            Err(e) => {
                logger.warn(&format!("failed to fetch parent {}: {}", parent_id, e));
                break;
            }
        }
    }

    thread.into()
}

/// Thread as `@user (time):\n text` blocks for prompts
pub fn format_thread(thread: &[Tweet]) -> String {
    thread
        .iter()
        .map(|tweet| {
            let when = chrono::DateTime::from_timestamp(tweet.timestamp, 0)
                .map(|dt| dt.format("%b %-d, %I:%M %p").to_string())
                .unwrap_or_default();
            format!("@{} ({}):\n{}", tweet.username, when, tweet.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockTwitterApi;
    use crate::config::TwitterConfig;
    use parley_core::testing::{create_test_runtime, ScriptedProvider};
    use parley_core::{InMemoryMemoryStore, MemoryCache, ParleyError};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn post(id: &str, parent: Option<&str>) -> Tweet {
        Tweet {
            id: id.into(),
            username: format!("user{}", id),
            text: format!("text {}", id),
            conversation_id: "1".into(),
            user_id: format!("u{}", id),
            in_reply_to_status_id: parent.map(str::to_string),
            timestamp: 1_700_000_000,
            ..Default::default()
        }
    }

    /// Api serving `posts` by id; unknown ids are not found
    fn api_with(posts: Vec<Tweet>) -> MockTwitterApi {
        let by_id: HashMap<String, Tweet> =
            posts.into_iter().map(|t| (t.id.clone(), t)).collect();
        let mut api = MockTwitterApi::new();
        api.expect_get_tweet()
            .returning(move |id| Ok(by_id.get(id).cloned()));
        api
    }

    fn base(api: MockTwitterApi) -> (TwitterBase, Arc<InMemoryMemoryStore>) {
        let (runtime, store) = create_test_runtime(Arc::new(ScriptedProvider::default()));
        let config = TwitterConfig {
            username: "rop_bot".into(),
            ..Default::default()
        };
        (
            TwitterBase::with_cache(runtime, Arc::new(api), config, Arc::new(MemoryCache::new())),
            store,
        )
    }

    fn ids(thread: &[Tweet]) -> Vec<&str> {
        thread.iter().map(|t| t.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_thread_is_ordered_root_first() {
        let api = api_with(vec![post("1", None), post("2", Some("1"))]);
        let (base, store) = base(api);

        let thread = build_thread(&base, &post("3", Some("2")), 10).await;
        assert_eq!(ids(&thread), vec!["1", "2", "3"]);
        assert_eq!(store.memories().await.len(), 3);
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        // 10 -> 11 -> 10 -> ...
        let api = api_with(vec![post("10", Some("11")), post("11", Some("10"))]);
        let (base, store) = base(api);

        let thread = build_thread(&base, &post("10", Some("11")), 10).await;
        assert_eq!(ids(&thread), vec!["11", "10"]);
        assert_eq!(store.memories().await.len(), 2);
    }

    #[tokio::test]
    async fn test_depth_cap() {
        let posts: Vec<Tweet> = (1..=20)
            .map(|i| post(&i.to_string(), (i > 1).then(|| (i - 1).to_string()).as_deref()))
            .collect();
        let leaf = posts[19].clone();
        let (base, _store) = base(api_with(posts));

        let thread = build_thread(&base, &leaf, 10).await;
        assert_eq!(thread.len(), 10);
        assert_eq!(thread.first().unwrap().id, "11");
        assert_eq!(thread.last().unwrap().id, "20");
    }

    #[tokio::test]
    async fn test_fetch_failure_truncates() {
        let mut api = MockTwitterApi::new();
        api.expect_get_tweet()
            .returning(|_| Err(ParleyError::platform("rate limited")));
        let (base, _store) = base(api);

        let thread = build_thread(&base, &post("3", Some("2")), 10).await;
        assert_eq!(ids(&thread), vec!["3"]);
    }

    #[tokio::test]
    async fn test_missing_parent_truncates() {
        let (base, _store) = base(api_with(vec![]));
        let thread = build_thread(&base, &post("3", Some("2")), 10).await;
        assert_eq!(ids(&thread), vec!["3"]);
    }

    #[test]
    fn test_format_thread() {
        let text = format_thread(&[post("1", None), post("2", Some("1"))]);
        assert_eq!(
            text,
            "@user1 (Nov 14, 10:13 PM):\ntext 1\n\n@user2 (Nov 14, 10:13 PM):\ntext 2"
        );
    }
}
