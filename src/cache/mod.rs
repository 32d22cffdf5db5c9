//! Cache layer
//!
//! Two concerns share one backend: short-lived JSON entries (the home page
//! listing) and counters that only grow (post views).
//!
//! Backends implement [`CacheStore`] over plain strings; [`Cache`] adds the
//! typed JSON layer on top so the encoding lives in one place.
//!
//! ```rust,ignore
//! use neuron::cache::{create_cache, view_key};
//! use neuron::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default()).await?;
//! let views = cache.incr(&view_key(post.id)).await?;
//! ```

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

/// Entries kept by the in-memory backend before eviction
const MEMORY_CAPACITY: u64 = 10_000;

/// Longest lifetime of an entry unless configured otherwise
const DEFAULT_MAX_TTL: Duration = Duration::from_secs(3600);

/// Counter key for the views of one post
pub fn view_key(post_id: i64) -> String {
    format!("post:{}:views", post_id)
}

/// A string key-value store with expiring entries and persistent counters
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Delete all entries matching a glob pattern (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Increment a counter and return the new value. Counters never expire.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Current value of a counter, zero when it was never incremented
    async fn counter(&self, key: &str) -> Result<i64>;
}

/// Typed front of a [`CacheStore`]
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// In-memory cache with default limits
    pub fn memory() -> Self {
        Self::new(MemoryCache::new(MEMORY_CAPACITY, DEFAULT_MAX_TTL))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get_raw(key).await? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .with_context(|| format!("Failed to decode cache entry {}", key)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value)
            .with_context(|| format!("Failed to encode cache entry {}", key))?;
        self.store.set_raw(key, json, ttl).await
    }

    pub async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        self.store.delete_pattern(pattern).await
    }

    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.store.incr(key).await
    }

    pub async fn counter(&self, key: &str) -> Result<i64> {
        self.store.counter(key).await
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

/// Create the configured cache.
///
/// `ttl_seconds` caps the lifetime of every entry; counters are not affected.
///
/// # Errors
/// - Redis is configured but the `redis-cache` feature is not enabled
/// - Redis is configured without a URL, or the connection fails
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    let max_ttl = Duration::from_secs(config.ttl_seconds.max(1));
    match config.driver {
        CacheDriver::Memory => Ok(Arc::new(Cache::new(MemoryCache::new(
            MEMORY_CAPACITY,
            max_ttl,
        )))),
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_deref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "The redis cache driver needs a URL: set cache.redis_url \
                         or NEURON_CACHE_REDIS_URL"
                    )
                })?;
                let store = RedisCache::connect(redis_url, max_ttl).await?;
                tracing::info!("Using Redis cache at {}", redis_url);
                Ok(Arc::new(Cache::new(store)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "The redis cache driver needs the 'redis-cache' feature; \
                     rebuild with `--features redis-cache` or use the memory driver"
                )
            }
        }
    }
}
