//! Keyed JSON cache with age limits
//!
//! Writers overwrite whole entries; with several writers the last write wins.
//! Entries are not versioned.

use crate::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Storage behind [`get_or_fetch`]
#[async_trait]
pub trait KeyedCache: Send + Sync {
    /// Read an entry younger than `max_age` (any age when `None`)
    async fn read(&self, key: &str, max_age: Option<Duration>)
        -> Result<Option<serde_json::Value>>;

    /// Replace an entry
    async fn write(&self, key: &str, value: &serde_json::Value) -> Result<()>;
}

/// Return the cached value for `key`, or fetch, store and return a fresh one.
///
/// Unreadable or malformed entries count as misses. A failed write is logged
/// and the fetched value is still returned.
pub async fn get_or_fetch<T, F, Fut>(
    cache: &dyn KeyedCache,
    key: &str,
    max_age: Option<Duration>,
    fetch: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match cache.read(key, max_age).await {
        Ok(Some(value)) => match serde_json::from_value::<T>(value) {
            Ok(hit) => {
                debug!(key, "Cache hit");
                return Ok(hit);
            }
            Err(e) => warn!(key, error = %e, "Ignoring malformed cache entry"),
        },
        Ok(None) => debug!(key, "Cache miss"),
        Err(e) => warn!(key, error = %e, "Cache read failed"),
    }

    let fresh = fetch().await?;
    if let Err(e) = cache.write(key, &serde_json::to_value(&fresh)?).await {
        warn!(key, error = %e, "Cache write failed");
    }
    Ok(fresh)
}

/// One JSON file per key under a directory (`<dir>/<key>.json`).
///
/// Entry age comes from the file's modification time, so the files hold the
/// bare value and stay readable by other tools.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Cache rooted at `dir` (created lazily)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl KeyedCache for FileCache {
    async fn read(
        &self,
        key: &str,
        max_age: Option<Duration>,
    ) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if let Some(max_age) = max_age {
            let age = metadata
                .modified()
                .ok()
                .and_then(|t| SystemTime::now().duration_since(t).ok())
                .unwrap_or(Duration::MAX);
            if age > max_age {
                return Ok(None);
            }
        }

        let raw = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn write(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Instant, serde_json::Value)>>,
}

impl MemoryCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyedCache for MemoryCache {
    async fn read(
        &self,
        key: &str,
        max_age: Option<Duration>,
    ) -> Result<Option<serde_json::Value>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).and_then(|(stored_at, value)| {
            match max_age {
                Some(max_age) if stored_at.elapsed() > max_age => None,
                _ => Some(value.clone()),
            }
        }))
    }

    async fn write(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (Instant::now(), value.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParleyError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_get_or_fetch_uses_cache_on_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let fetches = AtomicUsize::new(0);

        for _ in 0..2 {
            let timeline: Vec<String> = get_or_fetch(&cache, "home_timeline", None, || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["a".to_string(), "b".to_string()])
            })
            .await
            .unwrap();
            assert_eq!(timeline, vec!["a", "b"]);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        let on_disk = std::fs::read_to_string(dir.path().join("home_timeline.json")).unwrap();
        assert!(on_disk.contains("\"a\""));
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let cache = MemoryCache::new();
        cache
            .write("k", &serde_json::json!(["stale"]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let value: Vec<String> =
            get_or_fetch(&cache, "k", Some(Duration::from_millis(1)), || async {
                Ok(vec!["fresh".to_string()])
            })
            .await
            .unwrap();
        assert_eq!(value, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("k.json"), "{not json").unwrap();
        let cache = FileCache::new(dir.path());

        let value: u32 = get_or_fetch(&cache, "k", None, || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let cache = MemoryCache::new();
        let result: Result<u32> = get_or_fetch(&cache, "k", None, || async {
            Err(ParleyError::platform("timeline unavailable"))
        })
        .await;
        assert!(matches!(result, Err(ParleyError::Platform(_))));
    }

    #[test]
    fn test_path_sanitizes_key() {
        let cache = FileCache::new("/tmp/cache");
        assert_eq!(
            cache.path_for("../etc/passwd"),
            PathBuf::from("/tmp/cache/___etc_passwd.json")
        );
    }
}
