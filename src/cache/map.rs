//! Bounded concurrent map with approximate-LRU eviction.
//!
//! Backs the statement cache. Lookups, inserts and removals are
//! linearizable per key through the sharded map; recency is a map-wide
//! atomic tick stamped onto entries on every get and insert. When an
//! insert pushes the map over capacity, the inserting thread removes the
//! entry with the oldest stamp and runs the eviction listener on it,
//! outside any shard lock.
//!
//! Strict LRU order is not promised. Stamps race, and concurrent inserters
//! may each pick a different victim. Entries that have not been touched for
//! a while lose, which is all the statement cache needs.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use fnv::FnvBuildHasher;

/// Called once per evicted entry, on the evicting thread, after the entry
/// is gone from the map. Must not call back into the map.
pub(crate) type EvictionListener<K, V> = Box<dyn Fn(&K, &Arc<V>) + Send + Sync>;

struct Slot<V> {
    value: Arc<V>,
    last_used: AtomicU64,
}

pub(crate) struct BoundedMap<K: 'static, V: 'static> {
    inner: DashMap<K, Slot<V>, FnvBuildHasher>,
    capacity: usize,
    tick: AtomicU64,
    listener: EvictionListener<K, V>,
}

#[cfg(debug_assertions)]
thread_local! {
    static IN_LISTENER: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

impl<K, V> BoundedMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: 'static,
{
    /// New map holding at most `capacity` entries.
    pub(crate) fn new(capacity: usize, listener: EvictionListener<K, V>) -> Self {
        Self {
            inner: DashMap::with_capacity_and_hasher(capacity, FnvBuildHasher::default()),
            capacity,
            tick: AtomicU64::new(0),
            listener,
        }
    }

    /// Look up an entry, refreshing its recency stamp.
    pub(crate) fn get(&self, key: &K) -> Option<Arc<V>> {
        Self::forbid_reentry();
        let slot = self.inner.get(key)?;
        slot.last_used.store(self.next_stamp(), Ordering::Relaxed);
        Some(Arc::clone(&slot.value))
    }

    /// Insert the value if the key is vacant and return the shared entry.
    /// An occupied key hands the value back untouched. A successful insert
    /// may evict another key before returning.
    pub(crate) fn put_if_absent(&self, key: K, value: V) -> Result<Arc<V>, V> {
        Self::forbid_reentry();
        let inserted = match self.inner.entry(key) {
            Entry::Occupied(_) => return Err(value),
            Entry::Vacant(vacant) => {
                let value = Arc::new(value);
                vacant.insert(Slot {
                    value: Arc::clone(&value),
                    last_used: AtomicU64::new(self.next_stamp()),
                });
                value
            }
        };
        self.trim();
        Ok(inserted)
    }

    /// Remove the key only if it still maps to the given entry. Explicit
    /// removals never run the eviction listener.
    pub(crate) fn remove_if_same(&self, key: &K, expected: &Arc<V>) -> bool {
        Self::forbid_reentry();
        self.inner
            .remove_if(key, |_, slot| Arc::ptr_eq(&slot.value, expected))
            .is_some()
    }

    /// Weakly consistent snapshot of the current entries. Safe to call
    /// while other threads mutate the map; may miss or include entries
    /// changed mid-scan.
    pub(crate) fn entries(&self) -> Vec<(K, Arc<V>)> {
        Self::forbid_reentry();
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.value().value)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    fn next_stamp(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Evict oldest entries until the map is back under capacity. Racing
    /// inserters can overshoot capacity briefly; each one trims before its
    /// insert returns.
    fn trim(&self) {
        while self.inner.len() > self.capacity {
            let mut victim: Option<(K, u64)> = None;
            for entry in self.inner.iter() {
                let stamp = entry.value().last_used.load(Ordering::Relaxed);
                let older = match &victim {
                    Some((_, best)) => stamp < *best,
                    None => true,
                };
                if older {
                    victim = Some((entry.key().clone(), stamp));
                }
            }
            let Some((key, _)) = victim else {
                break;
            };
            // Scan guards are dropped by now; removing while iterating the
            // same shard would deadlock.
            let Some((key, slot)) = self.inner.remove(&key) else {
                // Someone else removed the victim; re-check the size.
                continue;
            };
            self.notify(&key, &slot.value);
        }
    }

    fn notify(&self, key: &K, value: &Arc<V>) {
        #[cfg(debug_assertions)]
        IN_LISTENER.with(|flag| flag.set(true));
        (self.listener)(key, value);
        #[cfg(debug_assertions)]
        IN_LISTENER.with(|flag| flag.set(false));
    }

    fn forbid_reentry() {
        #[cfg(debug_assertions)]
        IN_LISTENER.with(|flag| {
            assert!(
                !flag.get(),
                "eviction listener must not call back into the map"
            )
        });
    }
}
