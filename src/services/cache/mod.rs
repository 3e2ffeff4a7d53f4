use crate::config::{CacheConfig, CachePolicy, RedisConfig};
use crate::error::Result;
use crate::models::PostId;
use dashmap::DashMap;
use parking_lot::Mutex;
use redis::AsyncCommands;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;

pub type Scores = Vec<(PostId, f64)>;

/// Ranked scores keyed by a working-set fingerprint.
#[async_trait::async_trait]
pub trait ScoreCache: Send + Sync {
    async fn get(&self, key: u64) -> Result<Option<Scores>>;
    async fn put(&self, key: u64, scores: &[(PostId, f64)]) -> Result<()>;
}

/// Bounded in-process cache; the oldest entry is evicted first.
pub struct MemoryScoreCache {
    entries: DashMap<u64, Scores>,
    order: Mutex<VecDeque<u64>>,
    capacity: usize,
}

impl MemoryScoreCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl ScoreCache for MemoryScoreCache {
    async fn get(&self, key: u64) -> Result<Option<Scores>> {
        Ok(self.entries.get(&key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: u64, scores: &[(PostId, f64)]) -> Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }

        let mut order = self.order.lock();
        if self.entries.insert(key, scores.to_vec()).is_none() {
            order.push_back(key);
        }
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        Ok(())
    }
}

pub struct RedisScoreCache {
    client: redis::Client,
    ttl_seconds: u64,
}

impl RedisScoreCache {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(config.url.as_str())?,
            ttl_seconds: config.ttl_seconds,
        })
    }

    fn cache_key(key: u64) -> String {
        format!("feedrank:scores:{:016x}", key)
    }
}

#[async_trait::async_trait]
impl ScoreCache for RedisScoreCache {
    async fn get(&self, key: u64) -> Result<Option<Scores>> {
        let mut conn = self.client.get_async_connection().await?;
        let cached: Option<String> = conn.get(Self::cache_key(key)).await?;
        match cached {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: u64, scores: &[(PostId, f64)]) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let payload = serde_json::to_string(scores)?;
        let _: () = conn.set_ex(Self::cache_key(key), payload, self.ttl_seconds).await?;
        Ok(())
    }
}

/// Builds the cache selected by `cache.policy`; `Recompute` means no cache.
pub fn from_config(cache: &CacheConfig, redis: &RedisConfig) -> Result<Option<Arc<dyn ScoreCache>>> {
    let built: Option<Arc<dyn ScoreCache>> = match cache.policy {
        CachePolicy::Recompute => None,
        CachePolicy::Memory => Some(Arc::new(MemoryScoreCache::new(cache.capacity))),
        CachePolicy::Redis => Some(Arc::new(RedisScoreCache::new(redis)?)),
    };
    info!("Score cache policy: {:?}", cache.policy);
    Ok(built)
}
