//! Per-identity request throttle: one expiring counter per identity.
//!
//! This is a fixed window that starts at the identity's first request, not a
//! sliding log.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::KvStore;

#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>, max_requests: u64, window: Duration) -> Self {
        Self {
            kv,
            max_requests,
            window,
        }
    }

    /// Counts this request against `identity` and reports whether it may proceed.
    /// A backend failure lets the request through.
    pub async fn try_acquire(&self, identity: &str) -> bool {
        let key = format!("ratelimit:{identity}");
        match self.kv.incr(&key, self.window).await {
            Ok(count) if count <= self.max_requests => {
                debug!("Rate limit {identity}: {count}/{}", self.max_requests);
                true
            }
            Ok(count) => {
                warn!(
                    "Rate limit exceeded for {identity}: {count} requests in {}s window",
                    self.window.as_secs()
                );
                false
            }
            Err(e) => {
                warn!("Rate limiter backend failed for {identity}, allowing request: {e}");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryKv;

    fn limiter(max: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryKv::new(100, Duration::from_secs(60))),
            max,
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_denies_after_max_then_resets_after_window() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.try_acquire("u1").await);
        }
        assert!(!limiter.try_acquire("u1").await);
        assert!(!limiter.try_acquire("u1").await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.try_acquire("u1").await);
    }

    #[tokio::test]
    async fn test_identities_are_counted_separately() {
        let limiter = limiter(1);
        assert!(limiter.try_acquire("u1").await);
        assert!(!limiter.try_acquire("u1").await);
        assert!(limiter.try_acquire("u2").await);
    }
}
