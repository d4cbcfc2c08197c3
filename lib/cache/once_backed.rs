//! Concurrent deduplication cache for synchronous computations.
//!
//! Given a key and a factory, ensures at most one factory result is ever published per key.
//! Callers racing on the same absent key serialize on a per-key slot: the first one runs the
//! factory while the rest block on the slot and then observe the value it published. Callers
//! working on different keys never contend beyond the brief bucket lock of the outer map.
//!
//! Failures are not cached: a factory returning `Err` (or panicking) leaves the slot empty and
//! the next caller retries with a fresh factory invocation.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::sync::{Mutex, lock};

/// A slot is empty until a factory succeeds, then holds the published value forever (or until
/// the key is removed).
type Slot<V> = Arc<Mutex<Option<V>>>;

/// Deduplicating synchronous cache.
///
/// If [`get_or_init`](Self::get_or_init) is called concurrently for the same key, only one
/// invocation of the factory runs to completion successfully. All callers receive a clone of
/// the same result.
pub struct OnceBackedCache<K, V> {
    map: scc::HashMap<K, Slot<V>>,
}

impl<K, V> Default for OnceBackedCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            map: scc::HashMap::default(),
        }
    }
}

impl<K: Eq + Hash, V> Debug for OnceBackedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnceBackedCache")
            .field("len", &self.map.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> OnceBackedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Returns the slot for `key`, creating an empty one if absent.
    fn slot(&self, key: &K) -> Slot<V> {
        if let Some(slot) = self.map.read_sync(key, |_, v| Arc::clone(v)) {
            return slot;
        }
        match self.map.entry_sync(key.clone()) {
            scc::hash_map::Entry::Occupied(occ) => Arc::clone(occ.get()),
            scc::hash_map::Entry::Vacant(vac) => {
                let slot: Slot<V> = Arc::new(Mutex::new(None));
                vac.insert_entry(Arc::clone(&slot));
                slot
            }
        }
    }

    /// Get the cached value for `key`, or initialize it by running `factory`.
    ///
    /// If another caller is already computing the value for this key, this blocks until that
    /// computation finishes and returns its result instead of running a duplicate.
    pub fn get_or_init<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce() -> V,
    {
        match self.get_or_try_init(key, || Ok::<V, std::convert::Infallible>(factory())) {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_init`](Self::get_or_init), but for fallible factories.
    ///
    /// If the factory returns `Ok(v)`, the value is cached and returned. If it returns `Err(e)`,
    /// **nothing is cached** and the error is propagated to the caller. Concurrent callers are
    /// still deduplicated: a caller that was waiting on a failed attempt runs its own factory
    /// afterwards.
    pub fn get_or_try_init<F, E>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = self.slot(&key);
        let mut guard = lock(&slot);
        if let Some(v) = guard.as_ref() {
            return Ok(v.clone());
        }

        match factory() {
            Ok(v) => {
                *guard = Some(v.clone());
                Ok(v)
            }
            Err(e) => {
                drop(guard);
                self.discard_if_empty(&key, &slot);
                Err(e)
            }
        }
    }

    /// Drops an empty slot so failed lookups of arbitrary keys do not accumulate.
    ///
    /// Only a slot nobody else holds is removed: the map and `slot` itself must be the sole
    /// owners. A waiter still queued on the slot would otherwise publish into a detached slot
    /// while a later caller created a second value in a fresh one.
    fn discard_if_empty(&self, key: &K, slot: &Slot<V>) {
        drop(self.map.remove_if_sync(key, |current| {
            Arc::ptr_eq(current, slot)
                && Arc::strong_count(current) == 2
                && current.try_lock().is_ok_and(|inner| inner.is_none())
        }));
    }

    /// Get the cached value for `key` if it exists.
    ///
    /// Blocks while another caller is filling the slot for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.map.read_sync(key, |_, v| Arc::clone(v))?;
        lock(&slot).clone()
    }

    /// Returns the number of slots in the cache, including ones currently being filled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the cache contains no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Synchronously remove the entry for `key`, returning `true` if it was present.
    ///
    /// A caller already holding the removed slot may still publish into it; only callers that
    /// arrive afterwards see a fresh slot.
    pub fn remove_sync(&self, key: &K) -> bool {
        self.map.remove_sync(key).is_some()
    }
}
