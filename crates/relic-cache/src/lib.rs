//! Size-weighted LRU cache for the relic object database.
//!
//! Both heavy caches in the system sit on this type: the pack store's
//! decompressed-payload cache and the repository's tree-entry interning
//! cache. Entries carry an explicit weight (roughly their heap footprint in
//! bytes) and the cache evicts least-recently-used entries until the total
//! weight fits the configured capacity.
//!
//! Values are expected to be cheap to clone (`Arc`s in practice): `get`
//! hands out clones, and an evicted value simply drops the cache's clone
//! while outstanding clones keep the underlying data alive.

use std::hash::Hash;
use std::sync::Mutex;

use lru::LruCache;

/// Eviction callback: receives each (key, value) pair leaving the cache.
type EvictFn<K, V> = Box<dyn Fn(K, V) + Send + Sync>;

struct Slot<V> {
    value: V,
    weight: u64,
}

struct Inner<K: Hash + Eq, V> {
    map: LruCache<K, Slot<V>>,
    total_weight: u64,
}

/// A keyed cache bounded by total entry weight.
///
/// Internally synchronized; `get` and `put` are safe from multiple threads.
/// The eviction callback runs after the internal lock has been released, so
/// it may touch the cache again without deadlocking.
pub struct WeightedLru<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: u64,
    on_evict: Option<EvictFn<K, V>>,
}

impl<K: Hash + Eq, V: Clone> WeightedLru<K, V> {
    /// Create a cache holding at most `capacity` units of weight.
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: LruCache::unbounded(),
                total_weight: 0,
            }),
            capacity,
            on_evict: None,
        }
    }

    /// Create a cache that invokes `on_evict` for every entry leaving it,
    /// whether evicted by weight pressure or replaced by a `put`.
    pub fn with_evict<F>(capacity: u64, on_evict: F) -> Self
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        Self {
            on_evict: Some(Box::new(on_evict)),
            ..Self::new(capacity)
        }
    }

    /// The configured weight capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Look up a key, promoting it to most-recently-used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.map.get(key).map(|slot| slot.value.clone())
    }

    /// Whether a key is present, without promoting it.
    pub fn contains(&self, key: &K) -> bool {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.map.contains(key)
    }

    /// Insert an entry, then evict least-recently-used entries until the
    /// total weight fits the capacity again. An entry heavier than the whole
    /// capacity is evicted immediately after insertion.
    pub fn put(&self, key: K, value: V, weight: u64) {
        let mut dropped: Vec<(K, V)> = Vec::new();
        {
            let mut inner = self.inner.lock().expect("lock poisoned");
            if let Some((old_key, old)) = inner.map.push(key, Slot { value, weight }) {
                // push returns the replaced slot when the key was present.
                inner.total_weight -= old.weight;
                dropped.push((old_key, old.value));
            }
            inner.total_weight += weight;
            while inner.total_weight > self.capacity {
                match inner.map.pop_lru() {
                    Some((k, slot)) => {
                        inner.total_weight -= slot.weight;
                        dropped.push((k, slot.value));
                    }
                    None => break,
                }
            }
        }
        if let Some(on_evict) = &self.on_evict {
            for (k, v) in dropped {
                on_evict(k, v);
            }
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").map.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the weights of all cached entries.
    pub fn total_weight(&self) -> u64 {
        self.inner.lock().expect("lock poisoned").total_weight
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for WeightedLru<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("lock poisoned");
        f.debug_struct("WeightedLru")
            .field("len", &inner.map.len())
            .field("total_weight", &inner.total_weight)
            .field("capacity", &self.capacity)
            .finish()
    }
}
