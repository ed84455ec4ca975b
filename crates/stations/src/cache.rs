//! Time-windowed response cache.
//!
//! Every upstream query goes through a `TtlCache` slot keyed by the query's
//! cache key. Each slot has its own async mutex, so concurrent misses for
//! the same key wait for one producer instead of all hitting upstream.
//! Failed producers leave the slot as it was; the next caller retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aqicn_client::{AirQualitySource, Query};
use async_trait::async_trait;
use common::{Error, Reading};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A cached value and the instant it stops being served.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

type Slot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

/// Thread-safe TTL cache keyed by string.
#[derive(Debug)]
pub struct TtlCache<V> {
    slots: DashMap<String, Slot<V>>,
}

impl<V: Clone + Send> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Return the cached value for `key` if it is younger than its TTL,
    /// otherwise run `producer` once and cache its `Ok` value for `ttl`.
    pub async fn with_cache<F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<V, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, Error>>,
    {
        let slot: Slot<V> = self.slots.entry(key.to_string()).or_default().clone();
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if entry.is_fresh(Instant::now()) {
                debug!("Cache hit: {}", key);
                return Ok(entry.value.clone());
            }
        }

        debug!("Cache miss: {}", key);
        let value = producer().await?;
        *guard = Some(CacheEntry {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(value)
    }

    /// Number of keys currently tracked, fresh or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop expired and never-filled slots. Slots busy with a producer, or
    /// already handed out to a caller that has not locked them yet, are
    /// left alone.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => guard.as_ref().is_some_and(|entry| entry.is_fresh(now)),
                Err(_) => true,
            }
        });
        before.saturating_sub(self.slots.len())
    }
}

impl<V: Clone + Send> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a source so repeated queries within `ttl` are answered from memory.
#[derive(Debug)]
pub struct CachedSource<S> {
    inner: S,
    cache: TtlCache<Vec<Reading>>,
    ttl: Duration,
}

impl<S> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cached_keys(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl<S: AirQualitySource> AirQualitySource for CachedSource<S> {
    async fn fetch(&self, query: &Query) -> Result<Vec<Reading>, Error> {
        let key = query.cache_key();
        self.cache
            .with_cache(&key, self.ttl, || self.inner.fetch(query))
            .await
    }

    fn evict_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}
