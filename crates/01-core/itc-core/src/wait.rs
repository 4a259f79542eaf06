//! Futex-backed wait/notify shims and the one-shot [`Signal`] built on them.
//!
//! Native targets park on the `atomic-wait` crate, which maps onto futexes on
//! Linux and the equivalent address-wait primitives elsewhere. Waits may return
//! spuriously, so callers always re-check the atomic after waking. Loom builds
//! stub the park/wake calls with a yield so the model checker can explore
//! every interleaving of the surrounding atomics.

use std::ptr;

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicU32, Ordering};

const CLEARED: u32 = 0;
const RAISED: u32 = 1;

#[cfg(feature = "loom")]
mod imp {
    use super::AtomicU32;

    #[inline]
    pub(crate) fn wait_u32(atomic: &AtomicU32, expected: u32) {
        let _ = (atomic, expected);
        loom::thread::yield_now();
    }

    #[inline]
    pub(crate) fn wake_one(atomic: *const AtomicU32) {
        let _ = atomic;
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    use super::AtomicU32;

    #[inline]
    pub(crate) fn wait_u32(atomic: &AtomicU32, expected: u32) {
        atomic_wait::wait(atomic, expected);
    }

    #[inline]
    pub(crate) fn wake_one(atomic: *const AtomicU32) {
        atomic_wait::wake_one(atomic);
    }
}

/// Blocks the caller while `atomic` still holds `expected`, until a wakeup occurs.
#[inline]
pub fn wait_u32(atomic: &AtomicU32, expected: u32) {
    imp::wait_u32(atomic, expected);
}

/// Wakes at most one waiter parked on `atomic`.
#[inline]
pub fn wake_one(atomic: &AtomicU32) {
    imp::wake_one(atomic as *const AtomicU32);
}

/// Single-flag wake-up channel with one waiter.
///
/// The waiter clears the flag, hands the signal to another thread and parks in
/// [`Signal::wait`]; the other thread calls [`Signal::raise`] exactly once. A
/// raise that happens before the wait is not lost.
#[derive(Debug)]
pub struct Signal {
    state: AtomicU32,
}

impl Signal {
    /// Creates a cleared signal.
    #[cfg(not(feature = "loom"))]
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(CLEARED),
        }
    }

    /// Creates a cleared signal.
    #[cfg(feature = "loom")]
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(CLEARED),
        }
    }

    /// Resets the flag so the next [`Signal::wait`] blocks until a fresh raise.
    pub fn clear(&self) {
        self.state.store(CLEARED, Ordering::Relaxed);
    }

    /// Returns `true` once the signal has been raised.
    pub fn is_raised(&self) -> bool {
        self.state.load(Ordering::Acquire) == RAISED
    }

    /// Blocks until the signal is raised. Writes made before the raise are
    /// visible once this returns.
    pub fn wait(&self) {
        while self.state.load(Ordering::Acquire) != RAISED {
            wait_u32(&self.state, CLEARED);
        }
    }

    /// Raises the signal and wakes the waiter.
    ///
    /// Only valid while the signal outlives this call. When the waiter may free
    /// the signal as soon as it observes the raise, use [`Signal::raise_raw`].
    pub fn raise(&self) {
        self.state.store(RAISED, Ordering::Release);
        wake_one(&self.state);
    }

    /// Raises the signal behind `this` without keeping a reference alive past
    /// the store.
    ///
    /// # Safety
    /// `this` must point to a live `Signal` when the call starts. The waiter
    /// may release the signal's storage as soon as it observes the store; this
    /// function only uses the address afterwards, never the memory.
    pub unsafe fn raise_raw(this: *const Signal) {
        // SAFETY: the caller guarantees `this` is live on entry.
        let state = unsafe { ptr::addr_of!((*this).state) };
        // SAFETY: still live: nobody can observe RAISED before this store lands.
        unsafe { (*state).store(RAISED, Ordering::Release) };
        // The wake only passes the address to the kernel; a stale address at
        // worst wakes an unrelated waiter, which re-checks its own atomic.
        imp::wake_one(state);
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
