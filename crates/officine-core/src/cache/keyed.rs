use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Default number of entries evicted at once when the cache overflows
pub const DEFAULT_EVICTION_BATCH: usize = 10;

struct CacheEntry<T> {
    payload: Arc<T>,
    stored_at: Instant,
}

/// Hit/miss counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Bounded in-memory cache with age-based expiry.
///
/// Eviction is by insertion order, not recency: reading an entry does not
/// protect it. When `max_entries` is exceeded, the oldest entries are
/// removed in batches. Expired entries are dropped by the `get` that finds
/// them, or by `sweep`.
///
/// Payloads are immutable once stored; `set` on an existing key replaces the
/// payload and counts as a fresh insertion.
pub struct KeyedCache<K, T> {
    entries: HashMap<K, CacheEntry<T>>,
    order: VecDeque<K>,
    max_entries: usize,
    ttl: Duration,
    eviction_batch: usize,
    hits: u64,
    misses: u64,
}

impl<K, T> KeyedCache<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self::with_eviction_batch(max_entries, ttl, DEFAULT_EVICTION_BATCH)
    }

    pub fn with_eviction_batch(max_entries: usize, ttl: Duration, eviction_batch: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries: max_entries.max(1),
            ttl,
            eviction_batch: eviction_batch.max(1),
            hits: 0,
            misses: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, entry: &CacheEntry<T>, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) > self.ttl
    }

    /// Look up a fresh entry, deleting it if it has expired
    pub fn get(&mut self, key: &K) -> Option<Arc<T>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !self.is_expired(entry, now) => {
                self.hits += 1;
                return Some(Arc::clone(&entry.payload));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!(?key, "Cache entry expired");
            self.remove(key);
        }
        self.misses += 1;
        None
    }

    /// True if a fresh entry exists; does not count as a hit or miss
    pub fn has(&self, key: &K) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|entry| !self.is_expired(entry, now))
            .unwrap_or(false)
    }

    pub fn set(&mut self, key: K, payload: T) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.entries.insert(
            key.clone(),
            CacheEntry {
                payload: Arc::new(payload),
                stored_at: Instant::now(),
            },
        );
        self.order.push_back(key);

        if self.entries.len() > self.max_entries {
            self.evict();
        }
    }

    /// Drop the oldest insertions: at least one batch, and at least enough
    /// to get back under the limit
    fn evict(&mut self) {
        let overflow = self.entries.len().saturating_sub(self.max_entries);
        let count = overflow.max(self.eviction_batch).min(self.entries.len());
        for _ in 0..count {
            if let Some(key) = self.order.pop_front() {
                self.entries.remove(&key);
            }
        }
        debug!(evicted = count, remaining = self.entries.len(), "Cache eviction");
    }

    pub fn remove(&mut self, key: &K) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.stored_at) <= ttl);
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
