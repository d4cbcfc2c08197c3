//! Synchronization primitives.
//!
//! Shims between loom and std synchronization primitives, so the reference counts and per-slot
//! locks of the node tree can be model-checked with `RUSTFLAGS="--cfg loom"`.
pub mod atomic;

#[cfg(loom)]
pub use loom::sync::{Mutex, MutexGuard};

#[cfg(not(loom))]
pub use std::sync::{Mutex, MutexGuard};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// Every value guarded in this crate is left consistent between statements, so a poisoned lock
/// only means that some unrelated caller (usually a panicking content generator) unwound while
/// holding it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
