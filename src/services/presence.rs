use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Sentinel stored under each composite key.
pub const PRESENCE_SENTINEL: &str = "1";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connect failed: {0}")]
    Connect(String),

    #[error("cache set failed: {0}")]
    Set(String),

    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),
}

/// Records short-lived "recently uploaded" markers. Nothing in this
/// service reads them back.
#[async_trait]
pub trait PresenceCache: Send + Sync {
    async fn mark_present(&self, composite_key: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn ping(&self) -> bool;

    /// False for deployments that never write markers.
    fn enabled(&self) -> bool {
        true
    }
}

/// Stands in for the cache when the hosting platform tracks presence, so
/// no connection is ever opened.
pub struct DisabledPresenceCache;

#[async_trait]
impl PresenceCache for DisabledPresenceCache {
    async fn mark_present(&self, _composite_key: &str, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn ping(&self) -> bool {
        false
    }

    fn enabled(&self) -> bool {
        false
    }
}

pub struct RedisPresenceCache {
    connection: redis::aio::ConnectionManager,
    timeout: Duration,
}

impl RedisPresenceCache {
    /// The connection manager reconnects on its own after the initial connect.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Connect(e.to_string()))?;
        let connection = tokio::time::timeout(timeout, redis::aio::ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(timeout))?
            .map_err(|e| CacheError::Connect(e.to_string()))?;
        Ok(Self {
            connection,
            timeout,
        })
    }
}

#[async_trait]
impl PresenceCache for RedisPresenceCache {
    async fn mark_present(&self, composite_key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        tokio::time::timeout(
            self.timeout,
            conn.set_ex::<_, _, ()>(composite_key, PRESENCE_SENTINEL, seconds),
        )
        .await
        .map_err(|_| CacheError::Timeout(self.timeout))?
        .map_err(|e| CacheError::Set(e.to_string()))
    }

    async fn ping(&self) -> bool {
        let mut conn = self.connection.clone();
        let ping = async move {
            let reply: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            reply
        };
        matches!(tokio::time::timeout(self.timeout, ping).await, Ok(Ok(_)))
    }
}

#[derive(Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process stand-in for the shared cache, for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryPresenceCache {
    values: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryPresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.values.get(key) {
            if Instant::now() <= entry.expires_at {
                return Some(entry.value.clone());
            }
        }
        self.values.remove(key);
        None
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.values
            .get(key)
            .and_then(|e| e.expires_at.checked_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl PresenceCache for MemoryPresenceCache {
    async fn mark_present(&self, composite_key: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        self.values.retain(|_, entry| entry.expires_at >= now);
        self.values.insert(
            composite_key.to_string(),
            MemoryEntry {
                value: PRESENCE_SENTINEL.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// `memory` selects the in-process cache; anything else is a redis URL.
pub async fn connect(url: &str, timeout: Duration) -> Result<Arc<dyn PresenceCache>, CacheError> {
    if url == "memory" {
        tracing::warn!("Using in-process presence cache; markers are not shared");
        return Ok(Arc::new(MemoryPresenceCache::new()));
    }
    Ok(Arc::new(RedisPresenceCache::connect(url, timeout).await?))
}
