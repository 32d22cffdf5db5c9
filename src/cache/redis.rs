//! Redis store, for deployments running several instances
//!
//! Entries are plain strings written with SET EX. Pattern deletion walks the
//! keyspace with SCAN. Counters are fields of the `post_views` hash, bumped
//! with HINCRBY so every instance shares one count.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;

use super::CacheStore;

const SCAN_BATCH: usize = 100;

/// Hash holding every counter
const COUNTER_HASH: &str = "post_views";

pub struct RedisCache {
    connection: MultiplexedConnection,
    max_ttl: Duration,
}

impl RedisCache {
    pub async fn connect(redis_url: &str, max_ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url)
            .with_context(|| format!("Invalid Redis URL: {}", redis_url))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self {
            connection,
            max_ttl,
        })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .with_context(|| format!("Redis GET {} failed", key))
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let seconds = ttl.min(self.max_ttl).as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .with_context(|| format!("Redis SET {} failed", key))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .with_context(|| format!("Redis SCAN {} failed", pattern))?;

            if !keys.is_empty() {
                conn.del::<_, ()>(&keys)
                    .await
                    .context("Redis DEL failed")?;
            }

            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        conn.hincr(COUNTER_HASH, key, 1)
            .await
            .with_context(|| format!("Redis HINCRBY {} failed", key))
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let value: Option<i64> = conn
            .hget(COUNTER_HASH, key)
            .await
            .with_context(|| format!("Redis HGET {} failed", key))?;
        Ok(value.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Run with: cargo test --features redis-cache -- --ignored

    async fn connect() -> RedisCache {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        RedisCache::connect(&url, Duration::from_secs(60)).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_entries_and_pattern_delete() {
        let cache = connect().await;
        let prefix = format!("test:{}", uuid::Uuid::new_v4());
        let ttl = Duration::from_secs(60);

        cache.set_raw(&format!("{}:posts:1", prefix), "a".into(), ttl).await.unwrap();
        cache.set_raw(&format!("{}:users:1", prefix), "b".into(), ttl).await.unwrap();
        cache.delete_pattern(&format!("{}:posts:*", prefix)).await.unwrap();

        assert_eq!(cache.get_raw(&format!("{}:posts:1", prefix)).await.unwrap(), None);
        assert_eq!(
            cache.get_raw(&format!("{}:users:1", prefix)).await.unwrap().as_deref(),
            Some("b")
        );
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_counter_increments() {
        let cache = connect().await;
        let key = format!("test:post:{}:views", uuid::Uuid::new_v4());

        assert_eq!(cache.counter(&key).await.unwrap(), 0);
        assert_eq!(cache.incr(&key).await.unwrap(), 1);
        assert_eq!(cache.incr(&key).await.unwrap(), 2);
        assert_eq!(cache.counter(&key).await.unwrap(), 2);
    }
}
