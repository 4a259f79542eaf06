//! Fixed-capacity typed slot pools with free and ready index rings.
//!
//! A pool owns `N` slots of inline storage and two index rings. The free ring
//! lists slots nobody holds; the ready ring advertises filled slots in the
//! order they were published. Producers acquire a free index, move a value
//! into its slot and publish it; the consumer pops ready indices, takes the
//! value out and hands the index back to the free ring when it is done.
//!
//! Every slot is always in exactly one of three places: the free ring, a live
//! [`SlotGrant`]/[`ReadySlot`], or the ready ring. Only slots on the ready ring
//! or behind a `ReadySlot` hold an initialised value.

use std::cell::UnsafeCell;
use std::mem::{ManuallyDrop, MaybeUninit};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::timeout::Timeout;

struct IndexRing<const N: usize> {
    entries: [usize; N],
    head: usize,
    len: usize,
}

impl<const N: usize> IndexRing<N> {
    const fn empty() -> Self {
        Self {
            entries: [0; N],
            head: 0,
            len: 0,
        }
    }

    fn sequential() -> Self {
        let mut ring = Self::empty();
        for (i, entry) in ring.entries.iter_mut().enumerate() {
            *entry = i;
        }
        ring.len = N;
        ring
    }

    fn len(&self) -> usize {
        self.len
    }

    fn push(&mut self, value: usize) -> Result<(), usize> {
        if self.len == N {
            return Err(value);
        }
        self.entries[(self.head + self.len) % N] = value;
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let value = self.entries[self.head];
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Some(value)
    }
}

struct Rings<const N: usize> {
    free: IndexRing<N>,
    ready: IndexRing<N>,
    closed: bool,
}

/// Outcome of [`SlotPool::acquire_free`].
pub enum SlotAcquire<'a, T, const N: usize> {
    /// A free slot, held exclusively until committed or dropped.
    Ok(SlotGrant<'a, T, N>),
    /// Every slot stayed busy for the whole timeout.
    TimedOut,
    /// The pool was closed.
    Closed,
}

/// Outcome of [`SlotPool::pop_ready`].
pub enum SlotPop<'a, T, const N: usize> {
    /// The oldest published slot.
    Ok(ReadySlot<'a, T, N>),
    /// Nothing was published within the timeout.
    TimedOut,
    /// The pool was closed and every published slot has been consumed.
    Closed,
}

/// Fixed-size slot pool with free and ready index rings.
pub struct SlotPool<T, const N: usize> {
    slots: [UnsafeCell<MaybeUninit<T>>; N],
    rings: Mutex<Rings<N>>,
    slot_freed: Condvar,
    slot_ready: Condvar,
}

// SAFETY: values only ever move between threads through the pool (never shared
// by reference), and each slot is accessed by the single holder of its index.
unsafe impl<T: Send, const N: usize> Send for SlotPool<T, N> {}
// SAFETY: as above; the index rings are guarded by `rings`.
unsafe impl<T: Send, const N: usize> Sync for SlotPool<T, N> {}

impl<T, const N: usize> SlotPool<T, N> {
    const VALID_CAPACITY: () = assert!(N > 0, "slot pool needs at least one slot");

    /// Creates a pool with every slot free.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;
        Self {
            slots: std::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
            rings: Mutex::new(Rings {
                free: IndexRing::sequential(),
                ready: IndexRing::empty(),
                closed: false,
            }),
            slot_freed: Condvar::new(),
            slot_ready: Condvar::new(),
        }
    }

    /// Number of slots managed by the pool.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of published values waiting for the consumer.
    pub fn ready_len(&self) -> usize {
        self.rings.lock().ready.len()
    }

    /// Number of slots nobody currently holds.
    pub fn free_len(&self) -> usize {
        self.rings.lock().free.len()
    }

    /// Returns `true` once [`SlotPool::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.rings.lock().closed
    }

    /// Attempts to take a free slot without blocking.
    pub fn try_acquire_free(&self) -> SlotAcquire<'_, T, N> {
        self.acquire_free(Timeout::Immediate)
    }

    /// Takes a free slot, waiting up to `timeout` for one to be released.
    ///
    /// The free ring is checked once more after the deadline passes, so a
    /// slot released right at the deadline is still handed out.
    pub fn acquire_free(&self, timeout: Timeout) -> SlotAcquire<'_, T, N> {
        let deadline = timeout.deadline();
        let mut rings = self.rings.lock();
        let mut expired = false;
        loop {
            if rings.closed {
                return SlotAcquire::Closed;
            }
            if let Some(idx) = rings.free.pop() {
                return SlotAcquire::Ok(SlotGrant { pool: self, idx });
            }
            if expired {
                return SlotAcquire::TimedOut;
            }
            expired = !deadline.wait(&self.slot_freed, &mut rings);
        }
    }

    /// Pops the oldest published slot, waiting up to `timeout` for one.
    ///
    /// After [`SlotPool::close`] the remaining published slots are still
    /// returned; [`SlotPop::Closed`] is reported once they are drained.
    pub fn pop_ready(&self, timeout: Timeout) -> SlotPop<'_, T, N> {
        let deadline = timeout.deadline();
        let mut rings = self.rings.lock();
        let mut expired = false;
        loop {
            if let Some(idx) = rings.ready.pop() {
                return SlotPop::Ok(ReadySlot { pool: self, idx });
            }
            if rings.closed {
                return SlotPop::Closed;
            }
            if expired {
                return SlotPop::TimedOut;
            }
            expired = !deadline.wait(&self.slot_ready, &mut rings);
        }
    }

    /// Stops handing out free slots and wakes every waiter.
    ///
    /// Already published values stay poppable.
    pub fn close(&self) {
        let mut rings = self.rings.lock();
        if rings.closed {
            return;
        }
        rings.closed = true;
        drop(rings);
        log::debug!("slot pool closed (capacity={N})");
        self.slot_freed.notify_all();
        self.slot_ready.notify_all();
    }

    /// Drops every published value that has not been popped yet, returning
    /// how many were discarded.
    pub fn discard_ready(&self) -> usize {
        let mut discarded = 0;
        loop {
            let value = {
                let mut rings = self.rings.lock();
                let Some(idx) = rings.ready.pop() else {
                    break;
                };
                // SAFETY: indices on the ready ring hold an initialised value and
                // popping it transfers ownership of the slot to us.
                let value = unsafe { self.read_slot(idx) };
                self.release_locked(&mut rings, idx);
                value
            };
            // Dropped outside the lock: the value's destructor may be arbitrary.
            drop(value);
            discarded += 1;
        }
        discarded
    }

    /// # Safety
    /// The caller must own `idx` and the slot must hold an initialised value,
    /// which is moved out and must not be read again.
    unsafe fn read_slot(&self, idx: usize) -> T {
        // SAFETY: guaranteed by the caller.
        unsafe { (*self.slots[idx].get()).assume_init_read() }
    }

    fn release_locked(&self, rings: &mut MutexGuard<'_, Rings<N>>, idx: usize) {
        if rings.free.push(idx).is_err() {
            debug_assert!(false, "free ring overflowed: slot {idx} released twice?");
            return;
        }
        self.slot_freed.notify_one();
    }

    fn release_free(&self, idx: usize) {
        let mut rings = self.rings.lock();
        self.release_locked(&mut rings, idx);
    }
}

impl<T, const N: usize> Default for SlotPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for SlotPool<T, N> {
    fn drop(&mut self) {
        let rings = self.rings.get_mut();
        while let Some(idx) = rings.ready.pop() {
            // SAFETY: `&mut self` proves no grant or ready slot is alive, and
            // ready indices hold initialised values.
            unsafe { self.slots[idx].get_mut().assume_init_drop() };
        }
    }
}

/// Exclusive hold on a free slot. Dropping it without committing returns the
/// slot to the free ring.
pub struct SlotGrant<'a, T, const N: usize> {
    pool: &'a SlotPool<T, N>,
    idx: usize,
}

impl<T, const N: usize> SlotGrant<'_, T, N> {
    /// Index of the held slot.
    pub fn index(&self) -> usize {
        self.idx
    }

    /// Moves `value` into the slot and publishes it on the ready ring.
    ///
    /// Fails when the pool was closed after the slot was acquired; the slot is
    /// released and `value` handed back.
    pub fn commit(self, value: T) -> Result<(), T> {
        let grant = ManuallyDrop::new(self);
        let (pool, idx) = (grant.pool, grant.idx);
        let mut rings = pool.rings.lock();
        if rings.closed {
            pool.release_locked(&mut rings, idx);
            return Err(value);
        }
        // SAFETY: the grant owns `idx`, so nobody else touches this slot.
        unsafe { (*pool.slots[idx].get()).write(value) };
        if let Err(idx) = rings.ready.push(idx) {
            // SAFETY: written just above and never published.
            let value = unsafe { pool.read_slot(idx) };
            pool.release_locked(&mut rings, idx);
            return Err(value);
        }
        drop(rings);
        pool.slot_ready.notify_one();
        Ok(())
    }
}

impl<T, const N: usize> Drop for SlotGrant<'_, T, N> {
    fn drop(&mut self) {
        self.pool.release_free(self.idx);
    }
}

/// A published slot popped by the consumer. The slot goes back to the free
/// ring when this is dropped, after its value has been consumed.
pub struct ReadySlot<'a, T, const N: usize> {
    pool: &'a SlotPool<T, N>,
    idx: usize,
}

impl<T, const N: usize> ReadySlot<'_, T, N> {
    /// Index of the popped slot.
    pub fn index(&self) -> usize {
        self.idx
    }

    /// Moves the value out and passes it to `f`. The slot is released once
    /// `f` returns or unwinds.
    pub fn consume<R>(self, f: impl FnOnce(T) -> R) -> R {
        let ready = ManuallyDrop::new(self);
        let release = Release {
            pool: ready.pool,
            idx: ready.idx,
        };
        // SAFETY: ready slots hold an initialised value; `ready` is never
        // dropped, so the value is read exactly once.
        let value = unsafe { release.pool.read_slot(release.idx) };
        f(value)
    }
}

impl<T, const N: usize> Drop for ReadySlot<'_, T, N> {
    fn drop(&mut self) {
        // SAFETY: the value was never consumed; read it out so it drops.
        drop(unsafe { self.pool.read_slot(self.idx) });
        self.pool.release_free(self.idx);
    }
}

struct Release<'a, T, const N: usize> {
    pool: &'a SlotPool<T, N>,
    idx: usize,
}

impl<T, const N: usize> Drop for Release<'_, T, N> {
    fn drop(&mut self) {
        self.pool.release_free(self.idx);
    }
}
