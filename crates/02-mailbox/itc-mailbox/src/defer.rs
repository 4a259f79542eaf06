//! Blocking calls executed on a mailbox's consumer thread.
//!
//! [`defer_call`] posts a small trampoline task pointing at a rendezvous on the
//! caller's stack, then parks the caller until the consumer has run the
//! callable and stored its result. The rendezvous is never copied into the
//! task, so callables and results of any size work; only the trampoline has to
//! fit the inline task buffer.

use std::cell::UnsafeCell;
use std::mem::ManuallyDrop;
use std::ptr;
use std::thread;

use itc_core::{Expected, Signal, Timeout};
use log::trace;

use crate::error::DeferError;
use crate::mailbox::TaskMailbox;
use crate::task::Task;

/// State shared between the blocked caller and the consumer for one call.
struct Rendezvous<F, R> {
    call: UnsafeCell<Option<F>>,
    result: UnsafeCell<Option<R>>,
    done: Signal,
}

/// Type-erased handle to a [`Rendezvous`]. Exactly one of `fire` or `abandon`
/// runs, and either one raises `done` as its last access to the rendezvous.
struct Trampoline {
    rendezvous: *const (),
    fire: unsafe fn(*const ()),
    abandon: unsafe fn(*const ()),
}

// SAFETY: the rendezvous stays alive until `done` is raised, and only the
// consumer touches it before then. `F` and `R` are both `Send`.
unsafe impl Send for Trampoline {}

impl Trampoline {
    fn fire(self) {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is not dropped, so `abandon` never runs for this call.
        unsafe { (this.fire)(this.rendezvous) }
    }
}

impl Drop for Trampoline {
    fn drop(&mut self) {
        // SAFETY: the task was dropped unrun; the rendezvous is still waiting.
        unsafe { (self.abandon)(self.rendezvous) }
    }
}

struct RaiseOnDrop(*const Signal);

impl Drop for RaiseOnDrop {
    fn drop(&mut self) {
        // SAFETY: constructed from a live rendezvous and dropped last.
        unsafe { Signal::raise_raw(self.0) }
    }
}

/// # Safety
/// `rendezvous` must point at a live `Rendezvous<F, R>` whose caller is parked
/// on `done`.
unsafe fn fire_erased<F, R>(rendezvous: *const ())
where
    F: FnOnce() -> R,
{
    let rendezvous = rendezvous.cast::<Rendezvous<F, R>>();
    // SAFETY: live per the caller contract. The guard raises even if the call
    // unwinds, leaving `result` empty.
    let _raise = RaiseOnDrop(unsafe { ptr::addr_of!((*rendezvous).done) });
    // SAFETY: the caller does not read `call` or `result` until `done` rises.
    let call = unsafe { (*(*rendezvous).call.get()).take() };
    if let Some(call) = call {
        let value = call();
        // SAFETY: as above.
        unsafe { *(*rendezvous).result.get() = Some(value) };
    }
}

/// # Safety
/// Same contract as [`fire_erased`].
unsafe fn abandon_erased<F, R>(rendezvous: *const ()) {
    let rendezvous = rendezvous.cast::<Rendezvous<F, R>>();
    // SAFETY: live per the caller contract; nothing is read after the raise.
    unsafe { Signal::raise_raw(ptr::addr_of!((*rendezvous).done)) }
}

/// Runs `call` on the mailbox's consumer thread and returns its result,
/// blocking for as long as it takes to enqueue and execute.
///
/// See [`defer_call_timeout`] for the failure cases.
pub fn defer_call<const N: usize, F, R>(mailbox: &TaskMailbox<N>, call: F) -> Expected<R, DeferError>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    defer_call_timeout(mailbox, call, Timeout::Forever)
}

/// Runs `call` on the mailbox's consumer thread and returns its result.
///
/// `timeout` only bounds the wait for a free slot. Once the call is queued the
/// caller waits until the consumer has dealt with it.
///
/// Fails with:
/// * [`DeferError::Post`] when the call could not be queued; `call` never ran.
/// * [`DeferError::Abandoned`] when `call` panicked on the consumer, or the
///   consumer discarded it after an earlier task panicked.
/// * [`DeferError::SameThread`] when invoked from the consumer thread itself,
///   which would otherwise wait on itself forever.
pub fn defer_call_timeout<const N: usize, F, R>(
    mailbox: &TaskMailbox<N>,
    call: F,
    timeout: impl Into<Timeout>,
) -> Expected<R, DeferError>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    if mailbox.consumer_thread() == Some(thread::current().id()) {
        return Expected::Error(DeferError::SameThread);
    }

    let rendezvous = Rendezvous {
        call: UnsafeCell::new(Some(call)),
        result: UnsafeCell::new(None::<R>),
        done: Signal::new(),
    };
    let trampoline = Trampoline {
        rendezvous: ptr::addr_of!(rendezvous).cast(),
        fire: fire_erased::<F, R>,
        abandon: abandon_erased::<F, R>,
    };

    // A refused task is dropped inside `post`, which raises `done` through the
    // trampoline before we get here; nothing is left pointing at the stack.
    if let Err(err) = mailbox.post(Task::new(move || trampoline.fire()), timeout) {
        return Expected::Error(DeferError::Post(err));
    }

    rendezvous.done.wait();
    match rendezvous.result.into_inner() {
        Some(value) => Expected::Value(value),
        None => {
            trace!("deferred call abandoned by the consumer");
            Expected::Error(DeferError::Abandoned)
        }
    }
}
