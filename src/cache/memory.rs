//! In-process store backed by moka
//!
//! Every entry carries its own TTL through a moka [`Expiry`], capped by the
//! store-wide maximum. Counters live in a second moka cache with neither
//! expiry nor a size bound, so a count is never evicted, and are bumped in
//! place.

use anyhow::Result;
use async_trait::async_trait;
use moka::{future::Cache as MokaCache, Expiry};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::CacheStore;

#[derive(Clone)]
struct Entry {
    json: Arc<str>,
    ttl: Duration,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

pub struct MemoryCache {
    entries: MokaCache<String, Entry>,
    counters: MokaCache<String, Arc<AtomicI64>>,
    max_ttl: Duration,
}

impl MemoryCache {
    pub fn new(capacity: u64, max_ttl: Duration) -> Self {
        Self {
            entries: MokaCache::builder()
                .max_capacity(capacity)
                .expire_after(EntryExpiry)
                .build(),
            counters: MokaCache::builder().build(),
            max_ttl,
        }
    }
}

/// Glob match supporting `*` (any run) and `?` (one char)
fn glob_match(pattern: &[char], key: &[char]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some(('*', rest)) => {
            glob_match(rest, key) || (!key.is_empty() && glob_match(pattern, &key[1..]))
        }
        Some(('?', rest)) => !key.is_empty() && glob_match(rest, &key[1..]),
        Some((c, rest)) => key.first() == Some(c) && glob_match(rest, &key[1..]),
    }
}

fn matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    glob_match(&pattern, &key)
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|e| e.json.to_string()))
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let entry = Entry {
            json: value.into(),
            ttl: ttl.min(self.max_ttl),
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let doomed: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(key, _)| matches(pattern, key))
            .map(|(key, _)| key)
            .collect();

        for key in doomed {
            self.entries.invalidate(key.as_str()).await;
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let counter = self
            .counters
            .get_with(key.to_string(), async { Arc::new(AtomicI64::new(0)) })
            .await;
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        Ok(self
            .counters
            .get(key)
            .await
            .map_or(0, |c| c.load(Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store() -> MemoryCache {
        MemoryCache::new(100, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache = store();
        cache.set_raw("k", "1".into(), Duration::from_secs(60)).await.unwrap();
        cache.set_raw("k", "2".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get_raw("k").await.unwrap().as_deref(), Some("2"));
        assert_eq!(cache.get_raw("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_ttl_is_per_key() {
        let cache = store();
        cache.set_raw("short", "s".into(), Duration::from_millis(10)).await.unwrap();
        cache.set_raw("long", "l".into(), Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.entries.run_pending_tasks().await;

        assert_eq!(cache.get_raw("short").await.unwrap(), None);
        assert_eq!(cache.get_raw("long").await.unwrap().as_deref(), Some("l"));
    }

    #[tokio::test]
    async fn test_max_ttl_caps_entries() {
        let cache = MemoryCache::new(100, Duration::from_millis(10));
        cache.set_raw("k", "v".into(), Duration::from_secs(600)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.entries.run_pending_tasks().await;
        assert_eq!(cache.get_raw("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = store();
        let ttl = Duration::from_secs(60);
        cache.set_raw("posts:home:1:5", "a".into(), ttl).await.unwrap();
        cache.set_raw("posts:home:2:5", "b".into(), ttl).await.unwrap();
        cache.set_raw("users:1", "c".into(), ttl).await.unwrap();

        cache.delete_pattern("posts:*").await.unwrap();

        assert_eq!(cache.get_raw("posts:home:1:5").await.unwrap(), None);
        assert_eq!(cache.get_raw("posts:home:2:5").await.unwrap(), None);
        assert!(cache.get_raw("users:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_counters_are_independent() {
        let cache = store();
        assert_eq!(cache.counter("post:1:views").await.unwrap(), 0);

        assert_eq!(cache.incr("post:1:views").await.unwrap(), 1);
        assert_eq!(cache.incr("post:1:views").await.unwrap(), 2);
        assert_eq!(cache.incr("post:2:views").await.unwrap(), 1);
        assert_eq!(cache.counter("post:1:views").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let cache = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    cache.incr("post:7:views").await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.counter("post:7:views").await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_counters_outlive_entry_capacity() {
        let cache = MemoryCache::new(2, Duration::from_secs(3600));
        for id in 0..50 {
            cache.incr(&format!("post:{}:views", id)).await.unwrap();
        }
        cache.counters.run_pending_tasks().await;

        for id in 0..50 {
            assert_eq!(cache.counter(&format!("post:{}:views", id)).await.unwrap(), 1);
        }
        assert_eq!(cache.counters.entry_count(), 50);
    }

    #[test]
    fn test_glob() {
        assert!(matches("posts:*", "posts:home:1"));
        assert!(matches("post:?:views", "post:1:views"));
        assert!(!matches("post:?:views", "post:12:views"));
        assert!(!matches("posts:*", "users:1"));
    }

    proptest! {
        #[test]
        fn star_matches_any_suffix(prefix in "[a-z:]{0,10}", suffix in "[a-z0-9:]{0,10}") {
            let key = format!("{}{}", prefix, suffix);
            let pattern = format!("{}*", prefix);
            prop_assert!(matches(&pattern, &key));
        }
    }
}
