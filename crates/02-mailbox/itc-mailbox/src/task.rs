//! Fixed-footprint, type-erased units of deferred work.
//!
//! A [`Task`] stores its closure inline, next to a pointer to a static table
//! that knows how to run or drop that closure type. Building one never
//! allocates; closures that do not fit the inline buffer are rejected at
//! compile time.

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop, MaybeUninit};
use std::ptr;

/// Bytes available for a task's captured state.
pub const TASK_INLINE_BYTES: usize = 48;

#[repr(C, align(16))]
struct InlineStorage([MaybeUninit<u8>; TASK_INLINE_BYTES]);

struct TaskVTable {
    run: unsafe fn(*mut InlineStorage),
    drop: unsafe fn(*mut InlineStorage),
}

struct VTableFor<F>(PhantomData<F>);

impl<F: FnOnce()> VTableFor<F> {
    const FITS: () = assert!(
        mem::size_of::<F>() <= TASK_INLINE_BYTES
            && mem::align_of::<F>() <= mem::align_of::<InlineStorage>(),
        "closure does not fit the inline task storage"
    );

    const VTABLE: &'static TaskVTable = &TaskVTable {
        run: Self::run,
        drop: Self::drop,
    };

    /// # Safety
    /// `storage` must hold an initialised `F` that is not used afterwards.
    unsafe fn run(storage: *mut InlineStorage) {
        // SAFETY: guaranteed by the caller; the closure is moved out exactly once.
        let f = unsafe { ptr::read(storage.cast::<F>()) };
        f();
    }

    /// # Safety
    /// `storage` must hold an initialised `F` that is not used afterwards.
    unsafe fn drop(storage: *mut InlineStorage) {
        // SAFETY: guaranteed by the caller.
        unsafe { ptr::drop_in_place(storage.cast::<F>()) };
    }
}

/// A zero-argument callable with its arguments already bound.
///
/// Runs at most once. A task dropped without running drops its captured state.
pub struct Task {
    storage: InlineStorage,
    vtable: &'static TaskVTable,
}

// SAFETY: every constructor requires the stored closure to be `Send`.
unsafe impl Send for Task {}

impl Task {
    /// Packs `f` into a task.
    ///
    /// Fails to compile when `f` is larger than [`TASK_INLINE_BYTES`] or more
    /// strictly aligned than 16 bytes; capture references or a `Box` instead.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        #[allow(clippy::let_unit_value)]
        let () = VTableFor::<F>::FITS;
        let mut storage = InlineStorage([MaybeUninit::uninit(); TASK_INLINE_BYTES]);
        // SAFETY: `FITS` proves the buffer is large and aligned enough for `F`.
        unsafe { ptr::write(ptr::addr_of_mut!(storage).cast::<F>(), f) };
        Self {
            storage,
            vtable: VTableFor::<F>::VTABLE,
        }
    }

    /// Wraps a plain function pointer.
    pub fn from_fn(f: fn()) -> Self {
        Self::new(f)
    }

    /// Binds `method` to a process-lifetime `instance`.
    pub fn from_method<T>(instance: &'static T, method: fn(&T)) -> Self
    where
        T: Sync + 'static,
    {
        Self::new(move || method(instance))
    }

    /// Runs the task, consuming it.
    pub fn run(self) {
        let mut this = ManuallyDrop::new(self);
        let run = this.vtable.run;
        // SAFETY: the storage holds the closure the vtable was built for, and
        // `this` is never dropped, so the closure is consumed exactly once.
        unsafe { run(ptr::addr_of_mut!(this.storage)) };
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // SAFETY: a task that is dropped was never run, so its closure is live.
        unsafe { (self.vtable.drop)(ptr::addr_of_mut!(self.storage)) };
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
