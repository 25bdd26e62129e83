//! Bounded in-memory cache with per-key TTL (spec §4.1 "Cache").

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::ClassifiedFailure;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion order, oldest first, for least-recently-inserted eviction.
    order: IndexSet<String>,
}

/// A bounded map keyed by `(tool-name, canonicalized-args-hash)` (passed in
/// pre-joined as `key`) to `(value, insertion-time)`. On `get_or_compute`,
/// returns the cached value if present and unexpired; otherwise computes,
/// stores (unless the compute fails), and returns. Evicts the
/// least-recently-inserted entry once `capacity` is exceeded.
pub struct BoundedCache<V: Clone> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: IndexSet::new(),
            }),
            capacity,
        }
    }

    pub fn get_fresh(&self, key: &str, ttl: Duration) -> Option<V> {
        let inner = self.inner.lock();
        inner.entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    fn insert(&self, key: String, value: V) {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.shift_remove_index(0) {
                inner.entries.remove(&oldest);
                debug!(evicted = %oldest, "cache evicted least-recently-inserted entry");
            }
        }
        inner.order.shift_remove(&key);
        inner.order.insert(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Returns the cached value if present and unexpired; otherwise invokes
    /// `compute`, stores the result on success, and returns it. A failing
    /// `compute` is never cached.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<(V, bool), ClassifiedFailure>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ClassifiedFailure>>,
    {
        if let Some(value) = self.get_fresh(key, ttl) {
            return Ok((value, true));
        }
        let value = compute().await?;
        self.insert(key.to_string(), value.clone());
        Ok((value, false))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[tokio::test]
    async fn returns_fresh_cached_value_without_recompute() {
        let cache: BoundedCache<i32> = BoundedCache::new(8);
        let calls = std::sync::atomic::AtomicU32::new(0);
        for _ in 0..3 {
            let (value, cached) = cache
                .get_or_compute("k", Duration::from_secs(60), || {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    async { Ok(7) }
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
            let _ = cached;
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_recompute() {
        let cache: BoundedCache<i32> = BoundedCache::new(8);
        cache
            .get_or_compute("k", Duration::from_millis(5), || async { Ok(1) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
        let (value, cached) = cache
            .get_or_compute("k", Duration::from_millis(5), || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert!(!cached);
    }

    #[tokio::test]
    async fn failing_compute_is_not_cached() {
        let cache: BoundedCache<i32> = BoundedCache::new(8);
        let result = cache
            .get_or_compute("k", Duration::from_secs(60), || async {
                Err(ClassifiedFailure::new(FailureKind::ApiError, "nope"))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn evicts_least_recently_inserted_past_capacity() {
        let cache: BoundedCache<i32> = BoundedCache::new(2);
        for key in ["a", "b", "c"] {
            cache
                .get_or_compute(key, Duration::from_secs(60), || async { Ok(1) })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get_fresh("a", Duration::from_secs(60)).is_none());
        assert!(cache.get_fresh("c", Duration::from_secs(60)).is_some());
    }
}
