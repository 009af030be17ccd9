//! Near-cache implementation for client-side caching.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime};

use gridlink_core::Data;
use rand::Rng;
use uuid::Uuid;

use super::metadata::{MetaDataContainer, PartitionMetadata, SequenceCheck};
use super::{EvictionPolicy, NearCacheConfig};

/// Statistics for near-cache operations.
#[derive(Debug, Clone)]
pub struct NearCacheStats {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
    invalidation_requests: u64,
    owned_entry_count: u64,
    creation_time: SystemTime,
}

impl NearCacheStats {
    fn new() -> Self {
        Self {
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
            invalidations: 0,
            invalidation_requests: 0,
            owned_entry_count: 0,
            creation_time: SystemTime::now(),
        }
    }

    /// Returns the number of cache hits.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Returns the number of cache misses.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Returns the number of entries evicted due to capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Returns the number of entries expired due to TTL or max-idle.
    pub fn expirations(&self) -> u64 {
        self.expirations
    }

    /// Returns the number of entries removed by invalidation.
    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// Returns the number of invalidation events received.
    pub fn invalidation_requests(&self) -> u64 {
        self.invalidation_requests
    }

    /// Returns the number of entries currently cached.
    pub fn owned_entry_count(&self) -> u64 {
        self.owned_entry_count
    }

    /// Returns when the near cache was created.
    pub fn creation_time(&self) -> SystemTime {
        self.creation_time
    }

    /// Returns the hit ratio (hits / total lookups).
    ///
    /// Returns `0.0` if no lookups have been performed.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A value held by the near cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    /// The key maps to this value.
    Present(Data),
    /// The key was read and had no value.
    Absent,
}

impl CachedValue {
    /// Returns the cached value, or `None` for a cached absence.
    pub fn into_data(self) -> Option<Data> {
        match self {
            Self::Present(data) => Some(data),
            Self::Absent => None,
        }
    }

    /// Returns true if the key maps to a value.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

impl From<Option<Data>> for CachedValue {
    fn from(value: Option<Data>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }
}

/// Identifies a reservation placed before a remote read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(i64);

struct Reservation {
    id: ReservationId,
    partition_id: i32,
    generation: u64,
}

/// Internal cache entry with metadata for expiry and eviction tracking.
struct CacheEntry {
    value: CachedValue,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn new(value: CachedValue, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count += 1;
    }
}

struct Store {
    entries: HashMap<Data, CacheEntry>,
    reservations: HashMap<Data, Reservation>,
    metadata: MetaDataContainer,
    // Bumped by every invalidation received for a partition.
    generations: HashMap<i32, u64>,
    stats: NearCacheStats,
}

impl Store {
    fn remove_key(&mut self, key: &Data) -> bool {
        self.reservations.remove(key);
        self.entries.remove(key).is_some()
    }

    fn generation(&self, partition_id: i32) -> u64 {
        self.generations.get(&partition_id).copied().unwrap_or(0)
    }

    fn clear_all(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.reservations.clear();
        removed
    }
}

/// A client-side near cache of one map.
///
/// Keys and values are held in serialized form. Entries are filled through a
/// reserve-then-publish protocol so that a value fetched while an
/// invalidation for its partition was applied never becomes visible.
pub struct NearCache {
    name: String,
    config: NearCacheConfig,
    store: Mutex<Store>,
    next_reservation: AtomicI64,
}

impl std::fmt::Debug for NearCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NearCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("size", &self.size())
            .finish()
    }
}

impl NearCache {
    /// Creates an empty near cache for the named map.
    pub fn new(name: impl Into<String>, config: NearCacheConfig) -> Self {
        Self {
            name: name.into(),
            config,
            store: Mutex::new(Store {
                entries: HashMap::new(),
                reservations: HashMap::new(),
                metadata: MetaDataContainer::new(),
                generations: HashMap::new(),
                stats: NearCacheStats::new(),
            }),
            next_reservation: AtomicI64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the map name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the cache configuration.
    pub fn config(&self) -> &NearCacheConfig {
        &self.config
    }

    /// Looks up a key, counting a hit or a miss.
    ///
    /// Expired entries are removed and count as misses.
    pub fn get(&self, key: &Data) -> Option<CachedValue> {
        let now = Instant::now();
        let mut store = self.lock();

        let expired = match store.entries.get(key) {
            None => {
                store.stats.misses += 1;
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };

        if expired {
            store.entries.remove(key);
            store.stats.expirations += 1;
            store.stats.misses += 1;
            return None;
        }

        store.stats.hits += 1;
        let entry = store.entries.get_mut(key)?;
        entry.touch(now);
        Some(entry.value.clone())
    }

    /// Places a reservation on `key` before it is read remotely.
    ///
    /// The reservation records the partition's current invalidation state;
    /// a later reservation on the same key replaces an earlier one.
    pub fn reserve(&self, key: &Data, partition_id: i32) -> ReservationId {
        let id = ReservationId(self.next_reservation.fetch_add(1, Ordering::Relaxed));
        let mut store = self.lock();
        let generation = store.generation(partition_id);
        store.reservations.insert(
            key.clone(),
            Reservation {
                id,
                partition_id,
                generation,
            },
        );
        id
    }

    /// Publishes a remotely read value under a reservation.
    ///
    /// The value is cached only if the reservation is still in place and the
    /// partition's invalidation state has not moved since it was taken.
    /// Returns true if the value was cached.
    pub fn publish(&self, key: &Data, reservation: ReservationId, value: CachedValue) -> bool {
        let now = Instant::now();
        let mut store = self.lock();

        let valid = match store.reservations.get(key) {
            Some(r) if r.id == reservation => store.generation(r.partition_id) == r.generation,
            _ => false,
        };
        if !valid {
            tracing::trace!(map = %self.name, "discarding value fetched during invalidation");
            return false;
        }
        store.reservations.remove(key);

        self.remove_expired_entries(&mut store, now);
        if !store.entries.contains_key(key)
            && store.entries.len() >= self.config.max_size() as usize
            && !self.evict_one(&mut store)
        {
            return false;
        }

        store.entries.insert(key.clone(), CacheEntry::new(value, now));
        true
    }

    /// Drops a reservation whose remote read failed.
    pub fn release(&self, key: &Data, reservation: ReservationId) {
        let mut store = self.lock();
        if store.reservations.get(key).map(|r| r.id) == Some(reservation) {
            store.reservations.remove(key);
        }
    }

    /// Removes a key after a local mutation.
    pub fn invalidate(&self, key: &Data) {
        let mut store = self.lock();
        if store.remove_key(key) {
            store.stats.invalidations += 1;
        }
    }

    /// Removes every entry and pending reservation.
    pub fn clear(&self) {
        let mut store = self.lock();
        let removed = store.clear_all();
        store.stats.invalidations += removed as u64;
    }

    /// Applies an invalidation event received from the cluster.
    ///
    /// A `None` key invalidates the whole cache. Otherwise the key is
    /// removed, and if the event reveals missed invalidations or a new
    /// partition epoch the whole cache is cleared.
    pub fn apply_invalidation(
        &self,
        key: Option<&Data>,
        partition_id: i32,
        partition_uuid: Uuid,
        sequence: i64,
    ) {
        let mut store = self.lock();
        store.stats.invalidation_requests += 1;

        let check = store.metadata.observe_event(partition_id, partition_uuid, sequence);
        *store.generations.entry(partition_id).or_insert(0) += 1;
        let Some(key) = key else {
            let removed = store.clear_all();
            store.stats.invalidations += removed as u64;
            return;
        };

        if store.remove_key(key) {
            store.stats.invalidations += 1;
        }
        if check == SequenceCheck::Inconsistent {
            let removed = store.clear_all();
            if removed > 0 {
                tracing::debug!(
                    map = %self.name,
                    partition_id,
                    sequence,
                    removed,
                    "invalidation sequence inconsistent, clearing near cache"
                );
            }
            store.stats.invalidations += removed as u64;
        }
    }

    /// Records the sequence of an invalidation caused by this client's own
    /// mutation, whose key was already invalidated locally.
    ///
    /// Only the partition's sequence moves; entries and reservations stay
    /// unless the event reveals missed invalidations.
    pub fn apply_local_invalidation(&self, partition_id: i32, partition_uuid: Uuid, sequence: i64) {
        let mut store = self.lock();
        store.stats.invalidation_requests += 1;
        if store.metadata.observe_event(partition_id, partition_uuid, sequence)
            == SequenceCheck::Inconsistent
        {
            let removed = store.clear_all();
            store.stats.invalidations += removed as u64;
        }
    }

    /// Applies invalidation state fetched from a partition owner.
    pub fn apply_metadata(&self, partition_id: i32, partition_uuid: Uuid, sequence: i64) {
        let mut store = self.lock();
        if store.metadata.observe_metadata(partition_id, partition_uuid, sequence)
            == SequenceCheck::Inconsistent
        {
            let removed = store.clear_all();
            tracing::debug!(
                map = %self.name,
                partition_id,
                sequence,
                removed,
                "missed invalidations detected, clearing near cache"
            );
            store.stats.invalidations += removed as u64;
        }
    }

    /// Returns the recorded invalidation state of a partition.
    pub fn partition_metadata(&self, partition_id: i32) -> Option<PartitionMetadata> {
        self.lock().metadata.get(partition_id)
    }

    /// Returns the number of entries in the cache.
    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns a copy of the current statistics.
    pub fn stats(&self) -> NearCacheStats {
        let store = self.lock();
        let mut stats = store.stats.clone();
        stats.owned_entry_count = store.entries.len() as u64;
        stats
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        let ttl = self.config.time_to_live();
        let max_idle = self.config.max_idle();

        if !ttl.is_zero() && now.duration_since(entry.created_at) > ttl {
            return true;
        }

        !max_idle.is_zero() && now.duration_since(entry.last_accessed) > max_idle
    }

    fn remove_expired_entries(&self, store: &mut Store, now: Instant) {
        let expired_keys: Vec<Data> = store
            .entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in expired_keys {
            store.entries.remove(&key);
            store.stats.expirations += 1;
        }
    }

    fn evict_one(&self, store: &mut Store) -> bool {
        let victim = match self.config.eviction_policy() {
            EvictionPolicy::Lru => store
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => store
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.access_count, entry.last_accessed))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Random => {
                if store.entries.is_empty() {
                    None
                } else {
                    let index = rand::thread_rng().gen_range(0..store.entries.len());
                    store.entries.keys().nth(index).cloned()
                }
            }
            EvictionPolicy::None => None,
        };

        match victim {
            Some(key) => {
                store.entries.remove(&key);
                store.stats.evictions += 1;
                true
            }
            None => false,
        }
    }
}
