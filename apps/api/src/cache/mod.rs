//! Result cache and rate limiter.
//!
//! Both sit on a small key-value interface (`KvStore`) so the process-local
//! map can be swapped for Redis without touching selection logic. The memory
//! backend is NOT shared between engine instances; multi-instance deployments
//! must configure `REDIS_URL`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod fingerprint;
pub mod memory;
pub mod rate_limit;
pub mod redis_kv;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Counter at '{key}' holds a non-numeric value")]
    NotACounter { key: String },
}

/// Minimal expiring key-value contract shared by every cache backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Increments the counter at `key`. A missing or expired counter starts at 1
    /// and expires `window` after that first hit; later hits keep the expiry.
    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Typed JSON view over a `KvStore`. Backend failures degrade to cache misses.
#[derive(Clone)]
pub struct ResultCache {
    kv: Arc<dyn KvStore>,
}

impl ResultCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Cache read failed for {key}: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Dropping undecodable cache entry {key}: {e}");
                if let Err(e) = self.kv.delete(key).await {
                    debug!("Could not drop cache entry {key}: {e}");
                }
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Refusing to cache {key}: {e}");
                return;
            }
        };
        if let Err(e) = self.kv.set(key, raw, ttl).await {
            warn!("Cache write failed for {key}: {e}");
        }
    }
}
