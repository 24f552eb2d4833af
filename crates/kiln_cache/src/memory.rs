//! Bounded in-memory cache of compiled artifacts.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use tracing::debug;

/// A bounded, access-ordered cache that holds its values weakly.
///
/// The cache never keeps a value alive: once every [`Arc`] handed out for a
/// value is dropped, its entry is dead. Dead entries are purged lazily at the
/// start of every [`get`](Self::get) and [`put`](Self::put), and are never
/// reported as hits. When an insert would exceed the capacity, the least
/// recently used entry is evicted.
///
/// Entries are never updated in place; re-inserting a key removes the old
/// entry first.
pub struct MemoryCache<K, V> {
    capacity: usize,
    // Least recently used first.
    entries: IndexMap<K, Weak<V>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "memory cache capacity must be positive");
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Looks up a live value and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        self.purge_reclaimed();

        let idx = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(idx, last);

        match self.entries.get_index(last).and_then(|(_, weak)| weak.upgrade()) {
            Some(value) => {
                debug!(key = %key, "memory cache hit");
                Some(value)
            }
            None => {
                // reclaimed between the purge and the upgrade
                self.entries.shift_remove_index(last);
                debug!(key = %key, "memory cache entry reclaimed");
                None
            }
        }
    }

    /// Inserts a value, evicting the least recently used entry if full.
    pub fn put(&mut self, key: K, value: &Arc<V>) {
        self.purge_reclaimed();

        self.entries.shift_remove(&key);
        while self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                debug!(key = %evicted, "evicting from memory cache");
            }
        }
        debug!(key = %key, "caching in memory cache");
        self.entries.insert(key, Arc::downgrade(value));
    }

    /// Returns `true` if `key` has an entry, live or not yet purged.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries, including dead ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes entries whose value has been dropped; returns how many.
    pub fn purge_reclaimed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, weak| {
            let live = weak.strong_count() > 0;
            if !live {
                debug!(key = %key, "purging reclaimed entry from memory cache");
            }
            live
        });
        before - self.entries.len()
    }
}
