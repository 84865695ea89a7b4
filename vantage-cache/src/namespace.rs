//! A single logical cache partition.
//!
//! A [`NamespaceStore`] maps [`CacheKey`]s to [`TimedEntry`]s under one mutex
//! and keeps its own counters and limits. Expired entries are treated as
//! misses on read and removed on the spot (lazy expiry); the manager's sweep
//! removes the rest (active expiry).
//!
//! After every put the store evicts least-recently-accessed entries until both
//! `max_entries` and `max_bytes` hold again. Recency follows operation order
//! (a per-store access tick), so eviction is exact even when two accesses
//! share a timestamp.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use vantage_core::{CacheKey, NamespaceConfig, Timestamp};

use crate::entry::{estimate_size, TimedEntry, DEFAULT_ENTRY_SIZE_BYTES};

/// Point-in-time metrics for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceMetrics {
    pub namespace: String,
    /// Resident entries (may include expired entries not yet swept).
    pub entries: usize,
    /// Estimated resident bytes.
    pub bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to satisfy capacity limits.
    pub evictions: u64,
    /// Entries removed because their TTL passed.
    pub expirations: u64,
    pub puts: u64,
    pub max_entries: usize,
    pub max_bytes: u64,
}

impl NamespaceMetrics {
    /// Total lookups served.
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    puts: u64,
}

#[derive(Debug)]
struct StoreState<T> {
    entries: HashMap<CacheKey, TimedEntry<T>>,
    bytes: u64,
    tick: u64,
    counters: Counters,
}

impl<T> StoreState<T> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<TimedEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.bytes = self.bytes.saturating_sub(entry.size_bytes());
        Some(entry)
    }

    fn purge_expired(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        let mut reclaimed = 0u64;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired_at(now);
            if !keep {
                reclaimed += entry.size_bytes();
            }
            keep
        });
        self.bytes = self.bytes.saturating_sub(reclaimed);
        let removed = before - self.entries.len();
        self.counters.expirations += removed as u64;
        removed
    }

    /// Evict least-recently-accessed entries until both limits hold.
    fn enforce_capacity(&mut self, config: &NamespaceConfig) -> usize {
        let mut evicted = 0;
        while self.bytes > config.max_bytes || self.entries.len() > config.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.access_tick())
                .map(|(key, _)| key.clone());

            let Some(victim) = victim else {
                break;
            };
            self.remove(&victim);
            self.counters.evictions += 1;
            evicted += 1;
            tracing::debug!(key = %victim, "Evicted cache entry over capacity");
        }
        evicted
    }
}

/// A single logical cache with its own TTL, limits, and counters.
#[derive(Debug)]
pub struct NamespaceStore<T> {
    name: String,
    config: NamespaceConfig,
    state: Mutex<StoreState<T>>,
}

impl<T> NamespaceStore<T> {
    /// Create an empty namespace.
    pub fn new(name: impl Into<String>, config: NamespaceConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(StoreState {
                entries: HashMap::new(),
                bytes: 0,
                tick: 0,
                counters: Counters::default(),
            }),
        }
    }

    /// Namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace limits and default TTL.
    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, StoreState<T>> {
        self.state.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::warn!(namespace = %self.name, "Recovering poisoned cache namespace lock");
            poisoned.into_inner()
        })
    }

    /// Look up a key.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.get_at(key, Utc::now())
    }

    /// Look up a key as of `now`.
    pub fn get_at(&self, key: &CacheKey, now: Timestamp) -> Option<Arc<T>> {
        let mut state = self.state();

        let Some(expired) = state.entries.get(key).map(|entry| entry.is_expired_at(now)) else {
            state.counters.misses += 1;
            tracing::debug!(namespace = %self.name, key = %key, "Cache miss");
            return None;
        };

        if expired {
            state.remove(key);
            state.counters.expirations += 1;
            state.counters.misses += 1;
            tracing::debug!(namespace = %self.name, key = %key, "Cache miss (expired)");
            return None;
        }

        let tick = state.next_tick();
        state.counters.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.touch(now, tick);
        Some(Arc::clone(entry.value()))
    }

    /// True if a live entry exists. Does not touch counters or recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.contains_at(key, Utc::now())
    }

    /// True if a live entry exists as of `now`.
    pub fn contains_at(&self, key: &CacheKey, now: Timestamp) -> bool {
        self.state()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Remove one entry. Returns true if it was resident.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.state().remove(key).is_some()
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) -> usize {
        let mut state = self.state();
        let removed = state.entries.len();
        state.entries.clear();
        state.bytes = 0;
        removed
    }

    /// Remove expired entries.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// Remove entries expired as of `now`.
    pub fn purge_expired_at(&self, now: Timestamp) -> usize {
        self.state().purge_expired(now)
    }

    /// Evict until the limits hold. A no-op unless limits were violated.
    pub fn enforce_capacity(&self) -> usize {
        self.state().enforce_capacity(&self.config)
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// True if no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time metrics.
    pub fn metrics(&self) -> NamespaceMetrics {
        let state = self.state();
        NamespaceMetrics {
            namespace: self.name.clone(),
            entries: state.entries.len(),
            bytes: state.bytes,
            hits: state.counters.hits,
            misses: state.counters.misses,
            evictions: state.counters.evictions,
            expirations: state.counters.expirations,
            puts: state.counters.puts,
            max_entries: self.config.max_entries,
            max_bytes: self.config.max_bytes,
        }
    }
}

impl<T: Serialize> NamespaceStore<T> {
    /// Store a value with an explicit TTL.
    pub fn put(&self, key: CacheKey, value: T, ttl: Duration) {
        self.put_at(key, Arc::new(value), ttl, Utc::now());
    }

    /// Store a value with the namespace's default TTL.
    pub fn put_default(&self, key: CacheKey, value: T) {
        self.put(key, value, self.config.ttl);
    }

    /// Store an already-shared value with an explicit TTL.
    pub fn put_shared(&self, key: CacheKey, value: Arc<T>, ttl: Duration) {
        self.put_at(key, value, ttl, Utc::now());
    }

    /// Store a value as of `now`, then evict to satisfy the limits.
    ///
    /// Never fails: a value whose size cannot be measured is charged
    /// [`DEFAULT_ENTRY_SIZE_BYTES`].
    pub fn put_at(&self, key: CacheKey, value: Arc<T>, ttl: Duration, now: Timestamp) -> usize {
        let value_size = estimate_size(value.as_ref()).unwrap_or_else(|e| {
            tracing::warn!(
                namespace = %self.name,
                key = %key,
                error = %e,
                default_size = DEFAULT_ENTRY_SIZE_BYTES,
                "Size estimation failed, using default entry size"
            );
            DEFAULT_ENTRY_SIZE_BYTES
        });
        let size = value_size + key.as_str().len() as u64;

        let mut state = self.state();
        let tick = state.next_tick();
        if let Some(previous) = state.remove(&key) {
            tracing::trace!(key = %key, replaced_bytes = previous.size_bytes(), "Replacing entry");
        }
        state
            .entries
            .insert(key, TimedEntry::new(value, ttl, size, now, tick));
        state.bytes += size;
        state.counters.puts += 1;

        state.enforce_capacity(&self.config)
    }
}

/// Type-erased view of a namespace, used by the manager for sweeps and reports.
pub trait CacheNamespace: Send + Sync {
    fn namespace_name(&self) -> &str;

    fn snapshot(&self) -> NamespaceMetrics;

    fn contains_key_at(&self, key: &CacheKey, now: Timestamp) -> bool;

    fn invalidate_key(&self, key: &CacheKey) -> bool;

    /// Purge expired entries and re-assert limits. Returns (expired, evicted).
    fn sweep_at(&self, now: Timestamp) -> (usize, usize);

    fn clear_entries(&self) -> usize;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> CacheNamespace for NamespaceStore<T> {
    fn namespace_name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> NamespaceMetrics {
        self.metrics()
    }

    fn contains_key_at(&self, key: &CacheKey, now: Timestamp) -> bool {
        self.contains_at(key, now)
    }

    fn invalidate_key(&self, key: &CacheKey) -> bool {
        self.invalidate(key)
    }

    fn sweep_at(&self, now: Timestamp) -> (usize, usize) {
        let mut state = self.state();
        let expired = state.purge_expired(now);
        let evicted = state.enforce_capacity(&self.config);
        (expired, evicted)
    }

    fn clear_entries(&self) -> usize {
        self.clear()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
