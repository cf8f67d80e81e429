//! Process-local `KvStore` with lazy expiry, a periodic sweep piggybacked on
//! writes, and an entry cap enforced oldest-first.
//!
//! Counters (`incr`) are exempt from the cap: evicting one would reset an
//! identity's rate limit. They still expire with their window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{CacheError, KvStore};

struct Slot {
    value: String,
    expires_at: Instant,
    seq: u64,
    counter: bool,
}

struct Inner {
    entries: HashMap<String, Slot>,
    next_seq: u64,
    last_sweep: Instant,
}

pub struct MemoryKv {
    inner: Mutex<Inner>,
    max_entries: usize,
    sweep_interval: Duration,
}

impl MemoryKv {
    pub fn new(max_entries: usize, sweep_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
                last_sweep: Instant::now(),
            }),
            max_entries: max_entries.max(1),
            sweep_interval,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Slot> {
        if self.entries.get(key).is_some_and(|s| s.expires_at <= now) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn insert(&mut self, key: &str, value: String, expires_at: Instant, counter: bool) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key.to_string(),
            Slot {
                value,
                expires_at,
                seq,
                counter,
            },
        );
    }

    fn maybe_sweep(&mut self, now: Instant, interval: Duration) {
        if now.duration_since(self.last_sweep) < interval {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.expires_at > now);
        self.last_sweep = now;
        debug!("Cache sweep evicted {} expired entries", before - self.entries.len());
    }

    fn enforce_cap(&mut self, max_entries: usize) {
        let mut cached = self.entries.values().filter(|slot| !slot.counter).count();
        while cached > max_entries {
            let Some(oldest) = self
                .entries
                .iter()
                .filter(|(_, slot)| !slot.counter)
                .min_by_key(|(_, slot)| slot.seq)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
            cached -= 1;
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        Ok(self.lock().live(key, now).map(|slot| slot.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.insert(key, value, now + ttl, false);
        inner.maybe_sweep(now, self.sweep_interval);
        inner.enforce_cap(self.max_entries);
        Ok(())
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut inner = self.lock();
        if let Some(slot) = inner.live(key, now) {
            let count = slot
                .value
                .parse::<u64>()
                .map_err(|_| CacheError::NotACounter {
                    key: key.to_string(),
                })?
                + 1;
            slot.value = count.to_string();
            return Ok(count);
        }
        inner.insert(key, "1".to_string(), now + window, true);
        Ok(1)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock().entries.remove(key);
        Ok(())
    }
}
