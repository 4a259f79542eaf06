//! Fixed-capacity task mailbox drained by a single consumer thread.
//!
//! Producers post [`Task`]s from any thread; the thread that starts the
//! mailbox runs them one at a time, strictly in the order they were enqueued.
//! A task keeps its slot until it has finished running, so a full mailbox
//! pushes back on producers until the consumer catches up.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use itc_core::{ReadySlot, SlotAcquire, SlotGrant, SlotPool, SlotPop, Timeout};
use log::{debug, error, trace, warn};

use crate::error::{MailboxError, MailboxResult, PostError};
use crate::task::Task;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a [`TaskMailbox`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailboxState {
    /// Created; posts are refused until a consumer starts it.
    Idle,
    /// A consumer owns the mailbox and posts are accepted.
    Running,
    /// Posts are refused; the consumer stops once the queue is drained.
    Closed,
}

/// Mailbox of up to `N` pending tasks with exactly one consumer.
pub struct TaskMailbox<const N: usize> {
    slots: SlotPool<Task, N>,
    state: AtomicU8,
    consumer: OnceLock<ThreadId>,
    metrics: MailboxMetrics,
}

impl<const N: usize> TaskMailbox<N> {
    /// Creates an idle mailbox.
    pub fn new() -> Self {
        Self {
            slots: SlotPool::new(),
            state: AtomicU8::new(IDLE),
            consumer: OnceLock::new(),
            metrics: MailboxMetrics::default(),
        }
    }

    /// Maximum number of tasks that can be pending at once.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MailboxState {
        match self.state.load(Ordering::Acquire) {
            IDLE => MailboxState::Idle,
            RUNNING => MailboxState::Running,
            _ => MailboxState::Closed,
        }
    }

    /// `true` while a consumer owns the mailbox and posts are accepted.
    pub fn is_running(&self) -> bool {
        self.state() == MailboxState::Running
    }

    /// `true` once the mailbox refuses posts for good.
    pub fn is_closed(&self) -> bool {
        self.state() == MailboxState::Closed
    }

    /// Thread that started the mailbox, once started.
    pub fn consumer_thread(&self) -> Option<ThreadId> {
        self.consumer.get().copied()
    }

    /// Number of tasks posted but not yet picked up by the consumer.
    pub fn pending(&self) -> usize {
        self.slots.ready_len()
    }

    /// Snapshot of the traffic counters.
    pub fn metrics(&self) -> MailboxMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Makes the calling thread the consumer and starts accepting posts.
    ///
    /// Succeeds at most once per mailbox. The returned consumer cannot leave
    /// the calling thread, and dropping it closes the mailbox: tasks still
    /// queued are dropped unrun and later posts fail with
    /// [`PostError::Closed`].
    pub fn start(&self) -> MailboxResult<MailboxConsumer<'_, N>> {
        match self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(RUNNING) => return Err(MailboxError::AlreadyRunning),
            Err(_) => return Err(MailboxError::Closed),
        }
        let consumer = thread::current();
        let _ = self.consumer.set(consumer.id());
        debug!(
            "task mailbox (capacity={N}) consumed by thread {:?} ({})",
            consumer.id(),
            consumer.name().unwrap_or("<unnamed>")
        );
        Ok(MailboxConsumer {
            mailbox: self,
            _not_send: PhantomData,
        })
    }

    /// Starts the mailbox on the calling thread and runs tasks as they arrive.
    ///
    /// Fails immediately if the mailbox was started before. Otherwise it only
    /// returns after [`TaskMailbox::close`], once every queued task has run.
    pub fn run(&self) -> MailboxResult<()> {
        self.start()?.serve();
        Ok(())
    }

    /// Queues `task`, waiting up to `timeout` for a free slot.
    ///
    /// On success the mailbox owns the task until the consumer has run it. On
    /// failure the task is dropped without running.
    pub fn post(&self, task: Task, timeout: impl Into<Timeout>) -> Result<(), PostError> {
        let result = self.enqueue(task, timeout.into());
        self.metrics.record_post(&result);
        result
    }

    /// Queues a plain function.
    pub fn post_fn(&self, f: fn(), timeout: impl Into<Timeout>) -> Result<(), PostError> {
        self.post(Task::from_fn(f), timeout)
    }

    /// Queues `method` bound to a process-lifetime `instance`.
    pub fn post_method<T>(
        &self,
        instance: &'static T,
        method: fn(&T),
        timeout: impl Into<Timeout>,
    ) -> Result<(), PostError>
    where
        T: Sync + 'static,
    {
        self.post(Task::from_method(instance, method), timeout)
    }

    /// Refuses further posts and wakes blocked producers. The consumer still
    /// runs every task that was already queued, then stops.
    pub fn close(&self) {
        if self.state.swap(CLOSED, Ordering::AcqRel) != CLOSED {
            debug!("task mailbox (capacity={N}) closed");
        }
        self.slots.close();
    }

    fn enqueue(&self, task: Task, timeout: Timeout) -> Result<(), PostError> {
        match self.state.load(Ordering::Acquire) {
            IDLE => return Err(PostError::NotRunning),
            RUNNING => {}
            _ => return Err(PostError::Closed),
        }
        let grant = match self.slots.acquire_free(timeout) {
            SlotAcquire::Ok(grant) => grant,
            SlotAcquire::TimedOut => return Err(PostError::TimedOut),
            SlotAcquire::Closed => return Err(PostError::Closed),
        };
        self.publish(grant, task)
    }

    fn publish(&self, grant: SlotGrant<'_, Task, N>, task: Task) -> Result<(), PostError> {
        let slot = grant.index();
        if grant.commit(task).is_err() {
            return Err(if self.slots.is_closed() {
                PostError::Closed
            } else {
                PostError::Rejected
            });
        }
        trace!("task posted into slot {slot}");
        Ok(())
    }

    /// Closes the mailbox and drops every task still queued, returning how
    /// many were dropped.
    fn retire(&self) -> usize {
        self.close();
        self.slots.discard_ready()
    }
}

impl<const N: usize> Default for TaskMailbox<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for TaskMailbox<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMailbox")
            .field("capacity", &N)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .field("consumer", &self.consumer_thread())
            .finish()
    }
}

/// Consumer side of a started [`TaskMailbox`], pinned to the starting thread.
///
/// There is exactly one per mailbox. Dropping it, whether after
/// [`MailboxConsumer::serve`] returns or early, retires the mailbox.
pub struct MailboxConsumer<'a, const N: usize> {
    mailbox: &'a TaskMailbox<N>,
    _not_send: PhantomData<*const ()>,
}

impl<const N: usize> MailboxConsumer<'_, N> {
    /// Blocks for tasks and runs them in order until the mailbox is closed
    /// and drained.
    pub fn serve(self) {
        loop {
            match self.mailbox.slots.pop_ready(Timeout::Forever) {
                SlotPop::Ok(ready) => self.execute(ready),
                SlotPop::TimedOut => continue,
                SlotPop::Closed => break,
            }
        }
        debug!("task mailbox (capacity={N}) drained, consumer stopping");
    }

    /// Runs every task that is already queued without blocking, returning how
    /// many ran.
    pub fn poll(&mut self) -> usize {
        let mut executed = 0;
        while let SlotPop::Ok(ready) = self.mailbox.slots.pop_ready(Timeout::Immediate) {
            self.execute(ready);
            executed += 1;
        }
        executed
    }

    fn execute(&self, ready: ReadySlot<'_, Task, N>) {
        let slot = ready.index();
        let guard = PanicGuard {
            mailbox: self.mailbox,
        };
        ready.consume(Task::run);
        mem::forget(guard);
        self.mailbox.metrics.executed.fetch_add(1, Ordering::Relaxed);
        trace!("task in slot {slot} executed");
    }
}

impl<const N: usize> Drop for MailboxConsumer<'_, N> {
    fn drop(&mut self) {
        let was_closed = self.mailbox.is_closed();
        let discarded = self.mailbox.retire();
        if !was_closed || discarded > 0 {
            warn!("mailbox consumer dropped; closed mailbox and discarded {discarded} queued task(s)");
        }
    }
}

/// Shuts the mailbox down when a task unwinds out of the consumer, so nobody
/// keeps posting to (or waiting on) a consumer that is gone.
struct PanicGuard<'a, const N: usize> {
    mailbox: &'a TaskMailbox<N>,
}

impl<const N: usize> Drop for PanicGuard<'_, N> {
    fn drop(&mut self) {
        let discarded = self.mailbox.retire();
        error!("task panicked on the mailbox consumer; closed mailbox and discarded {discarded} queued task(s)");
    }
}

#[derive(Default)]
struct MailboxMetrics {
    posted: AtomicU32,
    executed: AtomicU32,
    timed_out: AtomicU32,
    rejected: AtomicU32,
}

impl MailboxMetrics {
    fn record_post(&self, result: &Result<(), PostError>) {
        let counter = match result {
            Ok(()) => &self.posted,
            Err(PostError::TimedOut) => &self.timed_out,
            Err(_) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MailboxMetricsSnapshot {
        MailboxMetricsSnapshot {
            posted: self.posted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Counters describing a mailbox's traffic so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MailboxMetricsSnapshot {
    /// Tasks accepted by `post`.
    pub posted: u32,
    /// Tasks the consumer finished running.
    pub executed: u32,
    /// Posts that found no free slot in time.
    pub timed_out: u32,
    /// Posts refused for any other reason.
    pub rejected: u32,
}
