// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Self-expiring key/value cache.
//!
//! Every entry owns one timer task that removes it when its lifetime ends.
//! Replacing an entry aborts the old timer before the new one is installed,
//! so there is exactly one live entry (and one timer) per key. Lookups also
//! compare the expiry instant, so an entry is never served late even if its
//! timer has not run yet.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    generation: u64,
    expires_at: Instant,
    expires_at_utc: DateTime<Utc>,
    timer: AbortHandle,
}

struct Inner<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    generation: AtomicU64,
}

/// Cache whose entries expire after a per-insert lifetime.
pub struct TtlCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` for `ttl`, replacing (and un-scheduling) any previous entry.
    ///
    /// Returns the wall-clock expiry of the new entry. Must be called from
    /// within a tokio runtime.
    pub fn insert(&self, key: K, value: V, ttl: Duration) -> DateTime<Utc> {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + ttl;
        let expires_at_utc = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        // The timer cannot observe the map before the new entry is in place.
        let mut entries = write(&self.inner.entries);

        let weak = Arc::downgrade(&self.inner);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            if let Some(inner) = weak.upgrade() {
                let mut entries = write(&inner.entries);
                if entries
                    .get(&timer_key)
                    .is_some_and(|e| e.generation == generation)
                {
                    entries.remove(&timer_key);
                }
            }
        })
        .abort_handle();

        let previous = entries.insert(
            key,
            Entry {
                value,
                generation,
                expires_at,
                expires_at_utc,
                timer,
            },
        );
        drop(entries);

        if let Some(previous) = previous {
            previous.timer.abort();
        }
        expires_at_utc
    }

    /// Value for `key` if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = read(&self.inner.entries);
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    /// Wall-clock expiry of the entry for `key`.
    pub fn expires_at(&self, key: &K) -> Option<DateTime<Utc>> {
        let entries = read(&self.inner.entries);
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.expires_at_utc)
    }

    /// Remove an entry and stop its timer.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = write(&self.inner.entries).remove(key)?;
        removed.timer.abort();
        Some(removed.value)
    }

    /// Snapshot of all live values.
    pub fn values(&self) -> Vec<V> {
        let now = Instant::now();
        read(&self.inner.entries)
            .values()
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        read(&self.inner.entries)
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether the cache holds no live entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and stop every timer.
    pub fn clear(&self) {
        for (_, entry) in write(&self.inner.entries).drain() {
            entry.timer.abort();
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        cache.insert("a".into(), 1, Duration::from_secs(10));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_cancels_previous_timer() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new();
        cache.insert("a", 1, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(3)).await;
        cache.insert("a", 2, Duration::from_secs(5));

        // The first timer would have fired here.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.get(&"a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_removes_entry() {
        let cache: TtlCache<u8, u8> = TtlCache::new();
        cache.insert(1, 1, Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert!(read(&cache.inner.entries).is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache: TtlCache<u8, &'static str> = TtlCache::new();
        cache.insert(1, "one", Duration::from_secs(60));
        cache.insert(2, "two", Duration::from_secs(60));

        assert_eq!(cache.remove(&1), Some("one"));
        assert_eq!(cache.remove(&1), None);
        assert_eq!(cache.values(), vec!["two"]);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expires_at_is_in_future() {
        let cache: TtlCache<u8, u8> = TtlCache::new();
        let returned = cache.insert(1, 1, Duration::from_secs(30));
        assert_eq!(cache.expires_at(&1), Some(returned));
        assert!(returned > Utc::now());
    }
}
