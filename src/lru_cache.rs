//! # LRU Cache
//!
//! A small Least Recently Used (LRU) cache used to memoize derived grid
//! ladders. Keyed on the raw inputs of the derivation, so identical bounding
//! boxes reuse their ladders across overlap checks.

use std::collections::HashMap;
use std::hash::Hash;

/// A bounded LRU map with O(n) eviction.
///
/// Eviction scans for the stalest entry. At the capacities used here (a few
/// hundred ladders) the scan is cheaper to maintain than an ordered list.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Slot<V>>,
    clock: u64,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    touched: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            clock: 0,
        }
    }

    /// Look up a key, refreshing its recency. Returns a clone of the value.
    pub fn get_cloned(&mut self, key: &K) -> Option<V> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|slot| {
            slot.touched = clock;
            slot.value.clone()
        })
    }

    /// Insert a value, evicting the stalest entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        self.clock += 1;
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.value = value;
            slot.touched = self.clock;
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_stalest();
        }

        self.entries.insert(
            key,
            Slot {
                value,
                touched: self.clock,
            },
        );
    }

    /// Check whether a key is present without refreshing its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries before eviction kicks in.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.clock = 0;
    }

    fn evict_stalest(&mut self) {
        let stalest = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.touched)
            .map(|(key, _)| key.clone());
        if let Some(key) = stalest {
            self.entries.remove(&key);
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(128)
    }
}
