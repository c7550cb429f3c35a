//! Time-to-live cache keyed by string.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use crate::core::clock::{Clock, to_time_delta};

/// Cached value with its insertion time.
#[derive(Clone, Debug)]
struct CacheRecord<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// Process-local cache where every entry expires `ttl` after insertion.
///
/// An entry is a miss once `now - inserted_at >= ttl`. Expired entries are
/// removed lazily on lookup, or in bulk through [`TtlCache::purge_expired`].
pub struct TtlCache<V> {
    ttl: Duration,
    ttl_delta: TimeDelta,
    max_entries: Option<usize>,
    clock: Arc<dyn Clock>,
    entries: DashMap<String, CacheRecord<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            ttl_delta: to_time_delta(ttl),
            max_entries: None,
            clock,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cap the number of entries. At the cap, expired entries are purged
    /// first, then the oldest insertion is evicted.
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Configured time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            None => false,
            Some(record) => {
                if self.is_expired(&record, now) {
                    true
                } else {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(record.value.clone());
                }
            }
        };

        if expired {
            self.entries
                .remove_if(key, |_, record| self.is_expired(record, now));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace a value, restarting its TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Some(max) = self.max_entries {
            if !self.entries.contains_key(&key) {
                self.enforce_max_entries(max);
            }
        }

        self.entries.insert(
            key,
            CacheRecord {
                value,
                inserted_at: self.clock.now(),
            },
        );
    }

    /// Remove one key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`. Returns the number removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, record| !self.is_expired(record, now));
        before.saturating_sub(self.entries.len())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters and current size.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, record: &CacheRecord<V>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(record.inserted_at) >= self.ttl_delta
    }

    fn enforce_max_entries(&self, max: usize) {
        if self.entries.len() < max {
            return;
        }

        self.purge_expired();

        while self.entries.len() >= max.max(1) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// Cache statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Stored entries.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed or found an expired entry.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0 when nothing was looked up.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
