use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;

/// Fixed per-entry bookkeeping overhead used by the footprint estimate
const ENTRY_OVERHEAD_BYTES: usize = 64;

/// Bounded TTL-aware query cache with LRU capacity eviction and
/// memory-pressure eviction of the coldest quarter of entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<RwLock<CacheTable>>,
    stats: Arc<RwLock<Counters>>,
    config: CacheConfig,
}

struct CacheTable {
    data: HashMap<String, CacheEntry>,

    /// Recency order (most recently accessed at the back)
    lru_order: VecDeque<String>,

    /// Running footprint estimate, maintained incrementally
    memory_bytes: usize,
}

struct CacheEntry {
    value: serde_json::Value,
    stored_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_accessed: Instant,

    /// Estimated size: key length + serialized value length + overhead
    size: usize,
}

impl CacheEntry {
    /// Boundary: an entry exactly at its TTL is already expired
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

#[derive(Debug, Default, Clone)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub item_count: usize,
    pub memory_usage_bytes: usize,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        info!(
            "Initializing query cache (capacity={}, memory_ceiling={}B, sweep_interval={}s)",
            config.capacity, config.memory_ceiling_bytes, config.sweep_interval_secs
        );

        Self {
            inner: Arc::new(RwLock::new(CacheTable {
                data: HashMap::new(),
                lru_order: VecDeque::new(),
                memory_bytes: 0,
            })),
            stats: Arc::new(RwLock::new(Counters::default())),
            config,
        }
    }

    /// Get a cached value, deserialized to `T`.
    ///
    /// Expired entries are evicted lazily here and count as misses.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut table = self.inner.write();
        let mut stats = self.stats.write();

        let expired = match table.data.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                stats.misses += 1;
                debug!("Cache MISS: {}", key);
                return None;
            }
        };

        if expired {
            table.remove_entry(key);
            stats.misses += 1;
            debug!("Cache MISS (expired): {}", key);
            return None;
        }

        let value = {
            let entry = table.data.get_mut(key)?;
            entry.access_count += 1;
            entry.last_accessed = Instant::now();
            entry.value.clone()
        };

        // Move to back of the recency order
        table.lru_order.retain(|k| k != key);
        table.lru_order.push_back(key.to_string());

        stats.hits += 1;
        debug!("Cache HIT: {}", key);

        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Cache entry for {} failed to deserialize: {}", key, e);
                None
            }
        }
    }

    /// Insert a value with the given TTL.
    ///
    /// Evicts the least-recently-accessed entry when at capacity, then the
    /// coldest quarter of all entries if the footprint estimate exceeds the
    /// configured ceiling.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Refusing to cache {}: {}", key, e);
                return;
            }
        };
        let serialized_len = value.to_string().len();
        let size = key.len() + serialized_len + ENTRY_OVERHEAD_BYTES;

        let mut table = self.inner.write();
        let mut stats = self.stats.write();

        // Re-inserting an existing key replaces it without counting an eviction
        if table.data.contains_key(key) {
            table.remove_entry(key);
        }

        // LRU eviction at capacity
        while table.data.len() >= self.config.capacity {
            let Some(victim) = table.lru_order.pop_front() else {
                break;
            };
            if let Some(evicted) = table.data.remove(&victim) {
                table.memory_bytes = table.memory_bytes.saturating_sub(evicted.size);
                stats.evictions += 1;
                debug!("Cache EVICT (lru): {}", victim);
            }
        }

        let now = Instant::now();
        table.data.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: now,
                ttl,
                access_count: 0,
                last_accessed: now,
                size,
            },
        );
        table.lru_order.push_back(key.to_string());
        table.memory_bytes += size;

        debug!("Cache SET: {} ({} bytes, ttl={:?})", key, size, ttl);

        // Memory-pressure eviction: drop the coldest quarter in one pass
        if table.memory_bytes > self.config.memory_ceiling_bytes {
            let quota = (table.data.len() / 4).max(1);
            let mut removed = 0;
            while removed < quota {
                let Some(victim) = table.lru_order.pop_front() else {
                    break;
                };
                if let Some(evicted) = table.data.remove(&victim) {
                    table.memory_bytes = table.memory_bytes.saturating_sub(evicted.size);
                    removed += 1;
                }
            }
            stats.evictions += removed as u64;
            warn!(
                "Cache memory pressure: evicted {} cold entries ({} bytes retained)",
                removed, table.memory_bytes
            );
        }
    }

    /// Remove all entries whose key matches the predicate, returning the count
    pub fn invalidate<F: Fn(&str) -> bool>(&self, predicate: F) -> usize {
        let mut table = self.inner.write();
        let mut stats = self.stats.write();

        let victims: Vec<String> = table
            .data
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();

        for key in &victims {
            table.remove_entry(key);
        }
        stats.evictions += victims.len() as u64;

        if !victims.is_empty() {
            debug!("Cache INVALIDATE: {} entries", victims.len());
        }
        victims.len()
    }

    /// Empty the table, counting every removed entry as an eviction
    pub fn clear(&self) {
        let mut table = self.inner.write();
        let mut stats = self.stats.write();

        let count = table.data.len();
        table.data.clear();
        table.lru_order.clear();
        table.memory_bytes = 0;
        stats.evictions += count as u64;

        debug!("Cache CLEAR ({} entries)", count);
    }

    /// Proactively remove expired entries; returns how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let mut table = self.inner.write();
        let mut stats = self.stats.write();

        let expired: Vec<String> = table
            .data
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            table.remove_entry(key);
        }
        stats.evictions += expired.len() as u64;

        if !expired.is_empty() {
            debug!("Cache sweep removed {} expired entries", expired.len());
        }
        expired.len()
    }

    /// Start the background expiry sweep task
    pub fn start_sweep(&self) -> tokio::task::JoinHandle<()> {
        let interval_secs = self.config.sweep_interval_secs;
        info!("Starting cache sweep task (interval={}s)", interval_secs);

        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            // First tick fires immediately; skip it
            interval.tick().await;

            loop {
                interval.tick().await;
                cache.sweep_expired();
            }
        })
    }

    /// Access metadata for an entry: (access count, last accessed).
    /// Does not refresh recency.
    pub fn entry_meta(&self, key: &str) -> Option<(u64, Instant)> {
        let table = self.inner.read();
        table
            .data
            .get(key)
            .map(|entry| (entry.access_count, entry.last_accessed))
    }

    pub fn stats(&self) -> CacheStats {
        let table = self.inner.read();
        let counters = self.stats.read();

        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            item_count: table.data.len(),
            memory_usage_bytes: table.memory_bytes,
        }
    }

    /// hits / (hits + misses), 0.0 before any access
    pub fn hit_ratio(&self) -> f64 {
        let counters = self.stats.read();
        let total = counters.hits + counters.misses;
        if total == 0 {
            0.0
        } else {
            counters.hits as f64 / total as f64
        }
    }
}

impl CacheTable {
    fn remove_entry(&mut self, key: &str) {
        if let Some(entry) = self.data.remove(key) {
            self.lru_order.retain(|k| k != key);
            self.memory_bytes = self.memory_bytes.saturating_sub(entry.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(capacity: usize, ceiling: usize) -> CacheConfig {
        CacheConfig {
            capacity,
            memory_ceiling_bytes: ceiling,
            sweep_interval_secs: 60,
        }
    }

    fn big_config() -> CacheConfig {
        test_config(10_000, 50 * 1024 * 1024)
    }

    #[test]
    fn test_set_get() {
        let cache = QueryCache::new(big_config());

        cache.set("key1", &vec![1, 2, 3], Duration::from_secs(60));

        let value: Vec<i32> = cache.get("key1").unwrap();
        assert_eq!(value, vec![1, 2, 3]);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.item_count, 1);
    }

    #[test]
    fn test_miss() {
        let cache = QueryCache::new(big_config());

        let value: Option<String> = cache.get("nonexistent");
        assert!(value.is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let cache = QueryCache::new(test_config(3, 50 * 1024 * 1024));

        for i in 0..10 {
            cache.set(&format!("key{}", i), &i, Duration::from_secs(60));
            assert!(cache.stats().item_count <= 3);
        }
        assert_eq!(cache.stats().item_count, 3);
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = QueryCache::new(test_config(3, 50 * 1024 * 1024));

        cache.set("key1", &1, Duration::from_secs(60));
        cache.set("key2", &2, Duration::from_secs(60));
        cache.set("key3", &3, Duration::from_secs(60));

        // Access key1 so key2 becomes the coldest
        let _: Option<i32> = cache.get("key1");

        cache.set("key4", &4, Duration::from_secs(60));

        assert!(cache.get::<i32>("key1").is_some(), "key1 was accessed");
        assert!(cache.get::<i32>("key2").is_none(), "key2 was the LRU victim");
        assert!(cache.get::<i32>("key3").is_some());
        assert!(cache.get::<i32>("key4").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_reinsert_does_not_count_eviction() {
        let cache = QueryCache::new(big_config());

        cache.set("key1", &1, Duration::from_secs(60));
        cache.set("key1", &2, Duration::from_secs(60));

        let stats = cache.stats();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.evictions, 0);

        let value: i32 = cache.get("key1").unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_ttl_boundary_is_expired() {
        let cache = QueryCache::new(big_config());

        // Zero TTL: elapsed >= ttl holds immediately
        cache.set("gone", &1, Duration::ZERO);
        assert!(cache.get::<i32>("gone").is_none());
        assert_eq!(cache.stats().misses, 1);

        // Generous TTL: still live
        cache.set("live", &1, Duration::from_secs(60));
        assert!(cache.get::<i32>("live").is_some());
    }

    #[test]
    fn test_ttl_expiry_after_sleep() {
        let cache = QueryCache::new(big_config());

        cache.set("short", &1, Duration::from_millis(20));
        assert!(cache.get::<i32>("short").is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get::<i32>("short").is_none());
    }

    #[test]
    fn test_memory_pressure_evicts_coldest_quarter() {
        // Entry size is deterministic: 5 (key) + 102 (serialized string) + 64
        let entry_size = 5 + 102 + ENTRY_OVERHEAD_BYTES;
        let ceiling = entry_size * 20 - 1;
        let cache = QueryCache::new(test_config(10_000, ceiling));

        let payload = "x".repeat(100);
        for i in 0..20 {
            cache.set(&format!("key{:02}", i), &payload, Duration::from_secs(60));
        }

        // The 20th insert crossed the ceiling: 25% of 20 entries evicted
        let stats = cache.stats();
        assert_eq!(stats.item_count, 15);
        assert_eq!(stats.evictions, 5);
        assert!(stats.memory_usage_bytes <= ceiling);
        assert_eq!(stats.memory_usage_bytes, entry_size * 15);

        // The evicted entries are the coldest ones
        for i in 0..5 {
            assert!(cache.get::<String>(&format!("key{:02}", i)).is_none());
        }
        assert!(cache.get::<String>("key19").is_some());
    }

    #[test]
    fn test_invalidate_by_predicate() {
        let cache = QueryCache::new(big_config());

        cache.set("list:u1:20:false", &1, Duration::from_secs(60));
        cache.set("count:u1", &2, Duration::from_secs(60));
        cache.set("list:u2:20:false", &3, Duration::from_secs(60));
        cache.set("user:u1", &4, Duration::from_secs(60));

        let removed = cache.invalidate(|key| {
            (key.starts_with("list:") || key.starts_with("count:")) && key.contains("u1")
        });

        assert_eq!(removed, 2);
        assert!(cache.get::<i32>("list:u1:20:false").is_none());
        assert!(cache.get::<i32>("count:u1").is_none());
        assert!(cache.get::<i32>("list:u2:20:false").is_some());
        assert!(cache.get::<i32>("user:u1").is_some(), "user namespace untouched");
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_clear_counts_evictions() {
        let cache = QueryCache::new(big_config());

        cache.set("key1", &1, Duration::from_secs(60));
        cache.set("key2", &2, Duration::from_secs(60));

        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.item_count, 0);
        assert_eq!(stats.memory_usage_bytes, 0);
        assert_eq!(stats.evictions, 2);
    }

    #[test]
    fn test_sweep_removes_expired_only() {
        let cache = QueryCache::new(big_config());

        cache.set("stale1", &1, Duration::ZERO);
        cache.set("stale2", &2, Duration::ZERO);
        cache.set("fresh", &3, Duration::from_secs(60));

        let removed = cache.sweep_expired();
        assert_eq!(removed, 2);

        let stats = cache.stats();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.evictions, 2);
        assert!(cache.get::<i32>("fresh").is_some());
    }

    #[test]
    fn test_access_metadata_refreshed_on_get() {
        let cache = QueryCache::new(big_config());

        cache.set("key1", &1, Duration::from_secs(60));
        let (count, stored) = cache.entry_meta("key1").unwrap();
        assert_eq!(count, 0);

        let _: Option<i32> = cache.get("key1");
        let _: Option<i32> = cache.get("key1");

        let (count, accessed) = cache.entry_meta("key1").unwrap();
        assert_eq!(count, 2);
        assert!(accessed >= stored);
    }

    #[test]
    fn test_hit_ratio() {
        let cache = QueryCache::new(big_config());
        assert_eq!(cache.hit_ratio(), 0.0);

        cache.set("key1", &1, Duration::from_secs(60));
        let _: Option<i32> = cache.get("key1");
        let _: Option<i32> = cache.get("missing");

        assert!((cache.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
