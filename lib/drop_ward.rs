//! Keyed reference counting with a type-selected release hook.
//!
//! [`DropWard`] counts live references per key and runs a cleanup hook when a key's count hits
//! zero. The hook is chosen by a zero-sized tag type implementing [`StatelessDrop`], so no
//! callback is stored per key.
//!
//! The descriptor table keeps one ward entry per open-file description: `open` and `dup`
//! increment, `close` decrements, and the final `close` removes the description from the table.
//! Cleanup needs the table, so the hook receives the ward's context instead of running from a
//! `Drop` impl on the key.
//!
//! # Example
//!
//! ```ignore
//! struct CloseFd;
//!
//! impl StatelessDrop<FileMap, Fd> for CloseFd {
//!     fn delete(files: &FileMap, fd: &Fd) {
//!         files.remove_sync(fd);
//!     }
//! }
//!
//! let ward: DropWard<FileMap, Fd, CloseFd> = DropWard::new(files);
//!
//! ward.inc(fd);  // → 1
//! ward.inc(fd);  // → 2
//! ward.dec(&fd); // → Some(1)
//! ward.dec(&fd); // → Some(0), calls CloseFd::delete(&files, &fd)
//! ```

use std::hash::Hash;
use std::marker::PhantomData;

use rustc_hash::FxHashMap;

use crate::sync::{Mutex, lock};

/// Type-level hook for cleanup that requires an external context.
///
/// Implement this on a zero-sized tag type. The tag is never instantiated. It only selects which
/// `delete` implementation a [`DropWard`] will call.
pub trait StatelessDrop<Ctx, K> {
    /// Called exactly once when a key's reference count reaches zero.
    ///
    /// Runs synchronously inside [`DropWard::dec`] on the thread that performed the final
    /// decrement, after the ward's internal lock has been released. The hook may therefore call
    /// back into the ward.
    fn delete(ctx: &Ctx, key: &K);
}

/// A thread-safe, reference-counted key set that triggers [`StatelessDrop::delete`] on the
/// associated context when any key's count drops to zero.
///
/// # Type parameters
///
/// - `Ctx`: shared context passed to `T::delete` (e.g. the descriptor table).
/// - `K`: the key type being reference-counted.
/// - `T`: a **zero-sized** tag type carrying the cleanup logic.
///   Will fail to compile if `size_of::<T>() != 0`.
///
/// Counts never go negative: decrementing an absent key is a no-op that returns `None`, and a
/// decrement larger than the current count saturates at zero.
#[derive(Debug)]
pub struct DropWard<Ctx, K, T> {
    map: Mutex<FxHashMap<K, usize>>,
    ctx: Ctx,
    _marker: PhantomData<fn() -> T>,
}

impl<Ctx, K, T> DropWard<Ctx, K, T>
where
    K: Eq + Hash,
    T: StatelessDrop<Ctx, K>,
{
    /// Compile-time guard: `T` must be zero-sized.
    const _ASSERT_ZST: () = assert!(size_of::<T>() == 0, "T must be zero-sized");

    /// Create a new ward that will pass `ctx` to `T::delete` on cleanup.
    pub fn new(ctx: Ctx) -> Self {
        let () = Self::_ASSERT_ZST;
        Self {
            map: Mutex::new(FxHashMap::default()),
            ctx,
            _marker: PhantomData,
        }
    }

    /// The context handed to `T::delete`.
    pub fn ctx(&self) -> &Ctx {
        &self.ctx
    }

    /// Increment the reference count for `key`, inserting it with a count of 1 if it does not
    /// exist.
    ///
    /// Returns the count **after** incrementing.
    pub fn inc(&self, key: K) -> usize {
        *lock(&self.map)
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1)
    }

    /// Increment the count for `key` only if it is currently tracked.
    ///
    /// Returns `None` for keys that were never inserted or have already been released, so a
    /// released key can never be revived by a racing acquirer.
    pub fn inc_existing(&self, key: &K) -> Option<usize> {
        let mut map = lock(&self.map);
        let slot = map.get_mut(key)?;
        *slot += 1;
        Some(*slot)
    }

    fn dec_by(&self, key: &K, by: usize) -> Option<usize> {
        let new_count = {
            let mut map = lock(&self.map);
            let slot = map.get_mut(key)?;
            *slot = slot.saturating_sub(by);
            let new_count = *slot;
            if new_count == 0 {
                map.remove(key);
            }
            new_count
        };
        if new_count == 0 {
            T::delete(&self.ctx, key);
        }
        Some(new_count)
    }

    /// Decrement the reference count for `key`.
    ///
    /// If the count reaches zero, the key is removed and `T::delete` is called synchronously
    /// with the ward's context. Returns `Some(0)` in this case; the key is no longer tracked.
    ///
    /// Returns `None` if `key` was not present (no-op).
    pub fn dec(&self, key: &K) -> Option<usize> {
        self.dec_by(key, 1)
    }

    /// Decrement the reference count for `key` by `count`.
    pub fn dec_count(&self, key: &K, count: usize) -> Option<usize> {
        self.dec_by(key, count)
    }

    /// Current count for `key`, or 0 if it is not tracked.
    #[must_use]
    pub fn count(&self, key: &K) -> usize {
        lock(&self.map).get(key).copied().unwrap_or(0)
    }

    /// Number of keys with a live count.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.map).len()
    }

    /// Returns `true` if no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.map).is_empty()
    }
}
