// Itinerary quote cache
// Sits between the simulator and the pricing provider so repeated (route, dates,
// constraints) lookups across options and what-if runs are priced once.

use crate::models::{Itinerary, TravelConstraints};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Cache configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_seconds: u64,
    // Directory for the optional on-disk store; None keeps the cache in memory only
    pub persist_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl_seconds: 3600,
            persist_dir: None,
        }
    }
}

// Live counters
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub store_hit_count: AtomicUsize,
    pub insert_count: AtomicUsize,
    pub eviction_count: AtomicUsize,
    pub expired_count: AtomicUsize,
}

// Point-in-time copy of the counters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub store_hit_count: usize,
    pub insert_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
}

/// Content address of one pricing request.
///
/// Hex SHA-256 of `origin|destination|depart|return|constraints-json`, where
/// the constraints are canonicalised first so airline order does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(
        origin: &str,
        destination: &str,
        depart_date: NaiveDate,
        return_date: NaiveDate,
        constraints: &TravelConstraints,
    ) -> Self {
        let canonical = constraints.clone().canonical();
        let constraint_json = serde_json::to_string(&canonical).unwrap_or_default();
        let material = format!(
            "{}|{}|{}|{}|{}",
            origin.to_uppercase(),
            destination.to_uppercase(),
            depart_date,
            return_date,
            constraint_json
        );
        Self(hex::encode(Sha256::digest(material.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Persistent tier behind the in-memory LRU
pub trait CacheStore: Send + Sync + 'static {
    fn load(&self, key: &CacheKey) -> Result<Option<StoredQuote>, CacheError>;
    fn save(&self, key: &CacheKey, quote: &StoredQuote) -> Result<(), CacheError>;
    fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuote {
    pub cached_at: DateTime<Utc>,
    pub itinerary: Itinerary,
}

// One JSON document per key inside a directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self, key: &CacheKey) -> Result<Option<StoredQuote>, CacheError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &CacheKey, quote: &StoredQuote) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(quote)?)?;
        std::fs::rename(tmp, path)?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

struct CacheEntry {
    itinerary: Itinerary,
    created_at: Instant,
    ttl: Duration,
    tick: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

// Entries plus a tick-ordered index; the smallest tick is the least recently used
struct LruState {
    entries: HashMap<CacheKey, CacheEntry>,
    recency: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    capacity: usize,
}

impl LruState {
    fn touch(&mut self, key: &CacheKey) {
        let tick = self.next_tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, key.clone());
            self.next_tick += 1;
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Bounded LRU cache of priced itineraries with per-entry TTL.
///
/// Concurrent writers to the same key are last-write-wins; a miss raced by
/// two callers simply prices the request twice.
pub struct ItineraryCache {
    state: Mutex<LruState>,
    ttl: Duration,
    store: Option<Box<dyn CacheStore>>,
    stats: CacheStats,
}

impl ItineraryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: Mutex::new(LruState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                capacity: config.capacity.max(1),
            }),
            ttl: Duration::from_secs(config.ttl_seconds),
            store: None,
            stats: CacheStats::default(),
        }
    }

    // Builds the cache and, when configured, its on-disk tier
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let cache = Self::new(config);
        match &config.persist_dir {
            Some(dir) => Ok(cache.with_store(Box::new(JsonFileStore::new(dir)?))),
            None => Ok(cache),
        }
    }

    pub fn with_store(mut self, store: Box<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    // True when lookups and inserts may touch the filesystem
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Memory lookup, then the persistent tier on a miss. With a store
    /// attached this does blocking file I/O; async callers go through
    /// `spawn_blocking`.
    pub fn get(&self, key: &CacheKey) -> Option<Itinerary> {
        {
            let mut state = self.state.lock();
            let expired = match state.entries.get(key) {
                Some(entry) => entry.is_expired(),
                None => false,
            };
            if expired {
                state.remove(key);
                self.stats.expired_count.fetch_add(1, Ordering::Relaxed);
            } else if state.entries.contains_key(key) {
                state.touch(key);
                self.stats.hit_count.fetch_add(1, Ordering::Relaxed);
                return state.entries.get(key).map(|e| e.itinerary.clone());
            }
        }

        if let Some(itinerary) = self.load_from_store(key) {
            self.stats.store_hit_count.fetch_add(1, Ordering::Relaxed);
            self.insert_memory(key.clone(), itinerary.clone());
            return Some(itinerary);
        }

        self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: CacheKey, itinerary: Itinerary) {
        if let Some(store) = &self.store {
            let quote = StoredQuote {
                cached_at: Utc::now(),
                itinerary: itinerary.clone(),
            };
            if let Err(e) = store.save(&key, &quote) {
                warn!(key = %key, error = %e, "failed to persist cached quote");
            }
        }
        self.insert_memory(key, itinerary);
    }

    fn insert_memory(&self, key: CacheKey, itinerary: Itinerary) {
        let mut state = self.state.lock();
        state.remove(&key);
        while state.entries.len() >= state.capacity {
            match state.evict_lru() {
                Some(evicted) => {
                    debug!(key = %evicted, "evicted least recently used quote");
                    self.stats.eviction_count.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        let tick = state.next_tick;
        state.next_tick += 1;
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                itinerary,
                created_at: Instant::now(),
                ttl: self.ttl,
                tick,
            },
        );
        self.stats.insert_count.fetch_add(1, Ordering::Relaxed);
    }

    fn load_from_store(&self, key: &CacheKey) -> Option<Itinerary> {
        let store = self.store.as_ref()?;
        match store.load(key) {
            Ok(Some(quote)) => {
                let age = Utc::now().signed_duration_since(quote.cached_at);
                let fresh = age
                    .to_std()
                    .map(|age| age <= self.ttl)
                    .unwrap_or(true);
                if fresh {
                    Some(quote.itinerary)
                } else {
                    if let Err(e) = store.remove(key) {
                        warn!(key = %key, error = %e, "failed to drop stale persisted quote");
                    }
                    self.stats.expired_count.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read persisted quote");
                None
            }
        }
    }

    // Drop every entry matching the given route filters; None matches anything
    pub fn invalidate(&self, origin: Option<&str>, destination: Option<&str>) -> usize {
        let removed: Vec<CacheKey> = {
            let mut state = self.state.lock();
            let keys: Vec<CacheKey> = state
                .entries
                .iter()
                .filter(|(_, entry)| {
                    let it = &entry.itinerary;
                    origin.map_or(true, |o| it.origin.eq_ignore_ascii_case(o))
                        && destination.map_or(true, |d| it.destination.eq_ignore_ascii_case(d))
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                state.remove(key);
            }
            keys
        };

        if let Some(store) = &self.store {
            for key in &removed {
                if let Err(e) = store.remove(key) {
                    warn!(key = %key, error = %e, "failed to remove persisted quote");
                }
            }
        }
        removed.len()
    }

    // Change capacity, evicting LRU entries when shrinking
    pub fn resize(&self, capacity: usize) {
        let mut state = self.state.lock();
        state.capacity = capacity.max(1);
        while state.entries.len() > state.capacity {
            if state.evict_lru().is_none() {
                break;
            }
            self.stats.eviction_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.len(),
            hit_count: self.stats.hit_count.load(Ordering::Relaxed),
            miss_count: self.stats.miss_count.load(Ordering::Relaxed),
            store_hit_count: self.stats.store_hit_count.load(Ordering::Relaxed),
            insert_count: self.stats.insert_count.load(Ordering::Relaxed),
            eviction_count: self.stats.eviction_count.load(Ordering::Relaxed),
            expired_count: self.stats.expired_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TravelClass;
    use crate::test_support::{date, itinerary_to};
    use std::sync::Arc;
    use std::thread;

    fn key(origin: &str, destination: &str) -> CacheKey {
        CacheKey::for_request(
            origin,
            destination,
            date("2025-06-01"),
            date("2025-06-04"),
            &TravelConstraints::default(),
        )
    }

    fn small_cache(capacity: usize) -> ItineraryCache {
        ItineraryCache::new(&CacheConfig {
            capacity,
            ttl_seconds: 3600,
            persist_dir: None,
        })
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "itinerary-cache-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_key_ignores_airline_order_and_case() {
        let a = TravelConstraints {
            travel_class: TravelClass::Economy,
            preferred_airlines: vec!["LH".into(), "ba".into()],
            ..Default::default()
        };
        let b = TravelConstraints {
            travel_class: TravelClass::Economy,
            preferred_airlines: vec!["BA".into(), "LH".into()],
            ..Default::default()
        };
        let d1 = date("2025-06-01");
        let d2 = date("2025-06-04");

        assert_eq!(
            CacheKey::for_request("jfk", "LIS", d1, d2, &a),
            CacheKey::for_request("JFK", "LIS", d1, d2, &b)
        );

        let business = TravelConstraints {
            travel_class: TravelClass::Business,
            ..b.clone()
        };
        assert_ne!(
            CacheKey::for_request("JFK", "LIS", d1, d2, &b),
            CacheKey::for_request("JFK", "LIS", d1, d2, &business)
        );
        assert_eq!(CacheKey::for_request("JFK", "LIS", d1, d2, &b).as_str().len(), 64);
    }

    #[test]
    fn test_eviction_policy_lru() {
        let cache = small_cache(3);
        for origin in ["AAA", "BBB", "CCC"] {
            cache.insert(key(origin, "LIS"), itinerary_to(origin, "LIS", "10:00"));
        }

        // Touch AAA so BBB becomes least recently used
        assert!(cache.get(&key("AAA", "LIS")).is_some());
        cache.insert(key("DDD", "LIS"), itinerary_to("DDD", "LIS", "10:00"));

        assert!(cache.get(&key("BBB", "LIS")).is_none());
        assert!(cache.get(&key("AAA", "LIS")).is_some());
        assert!(cache.get(&key("CCC", "LIS")).is_some());
        assert!(cache.get(&key("DDD", "LIS")).is_some());

        let stats = cache.stats();
        assert_eq!(stats.items_count, 3);
        assert_eq!(stats.eviction_count, 1);
    }

    #[test]
    fn test_reinsert_is_last_write_wins() {
        let cache = small_cache(2);
        cache.insert(key("JFK", "LIS"), itinerary_to("JFK", "LIS", "10:00"));
        let mut replacement = itinerary_to("JFK", "LIS", "10:00");
        replacement.price = 1.0;
        cache.insert(key("JFK", "LIS"), replacement);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("JFK", "LIS")).unwrap().price, 1.0);
    }

    #[test]
    fn test_expiration_and_ttl() {
        let mut cache = small_cache(10);
        cache.ttl = Duration::from_millis(50);
        cache.insert(key("JFK", "LIS"), itinerary_to("JFK", "LIS", "10:00"));
        assert!(cache.get(&key("JFK", "LIS")).is_some());

        thread::sleep(Duration::from_millis(120));

        assert!(cache.get(&key("JFK", "LIS")).is_none());
        assert_eq!(cache.stats().expired_count, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_by_route() {
        let cache = small_cache(10);
        cache.insert(key("JFK", "LIS"), itinerary_to("JFK", "LIS", "10:00"));
        cache.insert(key("SFO", "LIS"), itinerary_to("SFO", "LIS", "10:00"));
        cache.insert(key("JFK", "MUC"), itinerary_to("JFK", "MUC", "10:00"));

        assert_eq!(cache.invalidate(None, Some("lis")), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("JFK", "MUC")).is_some());
        assert_eq!(cache.invalidate(Some("JFK"), None), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_resize() {
        let cache = small_cache(50);
        for i in 0..20 {
            let origin = format!("A{:02}", i);
            cache.insert(key(&origin, "LIS"), itinerary_to(&origin, "LIS", "10:00"));
        }

        cache.resize(5);
        assert_eq!(cache.len(), 5);
        // The five most recent inserts survive
        assert!(cache.get(&key("A19", "LIS")).is_some());
        assert!(cache.get(&key("A00", "LIS")).is_none());
    }

    #[test]
    fn test_persistent_store_survives_new_cache() {
        let dir = scratch_dir("persist");
        let config = CacheConfig {
            capacity: 10,
            ttl_seconds: 3600,
            persist_dir: Some(dir.clone()),
        };

        let first = ItineraryCache::from_config(&config).unwrap();
        first.insert(key("JFK", "LIS"), itinerary_to("JFK", "LIS", "10:00"));
        drop(first);

        let second = ItineraryCache::from_config(&config).unwrap();
        let restored = second.get(&key("JFK", "LIS")).unwrap();
        assert_eq!(restored, itinerary_to("JFK", "LIS", "10:00"));
        assert_eq!(second.stats().store_hit_count, 1);

        assert_eq!(second.invalidate(Some("JFK"), None), 1);
        let third = ItineraryCache::from_config(&config).unwrap();
        assert!(third.get(&key("JFK", "LIS")).is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_concurrent_access_with_contention() {
        let cache = Arc::new(small_cache(16));
        let origins: Vec<String> = (0..8).map(|i| format!("O{:02}", i)).collect();

        let mut handles = vec![];
        for t in 0..8 {
            let cache = Arc::clone(&cache);
            let origins = origins.clone();
            handles.push(thread::spawn(move || {
                for j in 0..500 {
                    let origin = &origins[(t + j) % origins.len()];
                    let k = key(origin, "LIS");
                    if j % 4 == 0 {
                        cache.insert(k, itinerary_to(origin, "LIS", "10:00"));
                    } else {
                        let _ = cache.get(&k);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.items_count <= 16);
        assert_eq!(stats.hit_count + stats.miss_count, 8 * 375);
    }
}
