//! Atomic reference count with a terminal released state.
//!
//! ```text
//! Uninitialized --activate--> Active (count > 0) --last release--> Released (terminal)
//! ```
//!
//! Acquiring a released count fails instead of resurrecting it, and releasing below zero is
//! refused, so the transition to `Released` happens exactly once.

use crate::sync::atomic::{AtomicUsize, Ordering};

/// Sentinel stored once the count has reached zero after being active.
const RELEASED: usize = usize::MAX;

/// Sentinel stored before the first acquisition.
const UNINITIALIZED: usize = usize::MAX - 1;

/// The largest count a live object may reach.
const MAX_REFS: usize = usize::MAX - 2;

/// Observable lifecycle state of a [`RefCount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefState {
    /// Never acquired.
    Uninitialized,
    /// At least one reference is outstanding.
    Active(usize),
    /// The last reference was released. Terminal.
    Released,
}

/// Outcome of [`RefCount::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Release {
    /// Other references remain; carries the count after the decrement.
    Remaining(usize),
    /// This call released the final reference. The caller must run teardown now.
    Last,
}

/// Error returned when acquiring or releasing a count that is not active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotActive(pub RefState);

/// Thread-safe reference count.
#[derive(Debug)]
pub struct RefCount {
    count: AtomicUsize,
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl RefCount {
    /// A count in the `Uninitialized` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(UNINITIALIZED),
        }
    }

    fn decode(raw: usize) -> RefState {
        match raw {
            RELEASED => RefState::Released,
            UNINITIALIZED => RefState::Uninitialized,
            n => RefState::Active(n),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RefState {
        Self::decode(self.count.load(Ordering::Acquire))
    }

    /// Number of outstanding references; 0 unless active.
    #[must_use]
    pub fn count(&self) -> usize {
        match self.state() {
            RefState::Active(n) => n,
            RefState::Uninitialized | RefState::Released => 0,
        }
    }

    /// Move from `Uninitialized` to `Active(1)`.
    ///
    /// # Errors
    ///
    /// Fails if the count was already activated.
    pub fn activate(&self) -> Result<(), NotActive> {
        self.count
            .compare_exchange(UNINITIALIZED, 1, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|raw| NotActive(Self::decode(raw)))
    }

    /// Take one more reference. Returns the count after incrementing.
    ///
    /// # Errors
    ///
    /// Fails if the count is `Uninitialized` or `Released`; a released object stays released.
    pub fn acquire(&self) -> Result<usize, NotActive> {
        let mut cur = self.count.load(Ordering::Relaxed);
        loop {
            if cur == 0 || cur > MAX_REFS {
                return Err(NotActive(Self::decode(cur)));
            }
            match self.count.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(cur + 1),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Drop one reference.
    ///
    /// Exactly one caller ever observes [`Release::Last`], and it observes it synchronously with
    /// the final decrement.
    ///
    /// # Errors
    ///
    /// Fails if the count is not active. Counts never go negative.
    pub fn release(&self) -> Result<Release, NotActive> {
        let mut cur = self.count.load(Ordering::Relaxed);
        loop {
            if cur == 0 || cur > MAX_REFS {
                return Err(NotActive(Self::decode(cur)));
            }
            let next = if cur == 1 { RELEASED } else { cur - 1 };
            match self
                .count
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) if next == RELEASED => return Ok(Release::Last),
                Ok(_) => return Ok(Release::Remaining(next)),
                Err(actual) => cur = actual,
            }
        }
    }
}
