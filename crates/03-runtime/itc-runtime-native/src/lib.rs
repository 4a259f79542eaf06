#![deny(missing_docs)]
//! Native consumer threads that own a task mailbox.
//!
//! [`spawn_worker`] starts a named thread, makes it the consumer of the given
//! mailbox and only returns once that mailbox accepts posts, so callers can
//! post or [`defer_call`](itc_mailbox::defer_call) straight away.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use itc_mailbox::{MailboxError, TaskMailbox};
use log::{debug, warn};
use thiserror::Error;

const DEFAULT_WORKER_NAME: &str = "itc-worker";

/// Thread parameters for a mailbox worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Thread name, also used in log lines.
    pub name: String,
    /// Stack size in bytes; the platform default when `None`.
    pub stack_size: Option<usize>,
}

impl WorkerConfig {
    /// Config for a worker called `name` with the default stack.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: None,
        }
    }

    /// Sets an explicit stack size in bytes.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::named(DEFAULT_WORKER_NAME)
    }
}

/// Failures starting or stopping a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The OS refused to create the thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    /// The mailbox was already running or closed.
    #[error("worker could not take over its mailbox: {0}")]
    Mailbox(#[from] MailboxError),

    /// The thread ended before reporting that it was consuming.
    #[error("worker thread exited during startup")]
    Startup,

    /// A task panicked and took the worker thread down.
    #[error("worker thread '{0}' panicked")]
    Panicked(String),
}

/// Owner of a running worker thread.
///
/// Dropping the handle closes the mailbox and joins the thread.
#[derive(Debug)]
pub struct WorkerHandle<const N: usize> {
    name: String,
    mailbox: Arc<TaskMailbox<N>>,
    thread: Option<JoinHandle<()>>,
}

impl<const N: usize> WorkerHandle<N> {
    /// The mailbox this worker consumes.
    pub fn mailbox(&self) -> &Arc<TaskMailbox<N>> {
        &self.mailbox
    }

    /// Name the worker thread was spawned with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the worker thread.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread.as_ref().map(|thread| thread.thread().id())
    }

    /// Closes the mailbox, lets the worker drain it and joins the thread.
    pub fn shutdown(mut self) -> Result<(), WorkerError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), WorkerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.mailbox.close();
        thread
            .join()
            .map_err(|_| WorkerError::Panicked(self.name.clone()))?;
        debug!("worker '{}' stopped", self.name);
        Ok(())
    }
}

impl<const N: usize> Drop for WorkerHandle<N> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("{err}");
        }
    }
}

/// Spawns a thread that consumes `mailbox` until it is closed.
///
/// Returns once the mailbox is running on the new thread.
pub fn spawn_worker<const N: usize>(
    config: WorkerConfig,
    mailbox: Arc<TaskMailbox<N>>,
) -> Result<WorkerHandle<N>, WorkerError> {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), MailboxError>>(1);

    let mut builder = thread::Builder::new().name(config.name.clone());
    if let Some(bytes) = config.stack_size {
        builder = builder.stack_size(bytes);
    }

    let worker_mailbox = Arc::clone(&mailbox);
    let thread = builder.spawn(move || match worker_mailbox.start() {
        Ok(consumer) => {
            let _ = ready_tx.send(Ok(()));
            consumer.serve();
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err));
        }
    })?;

    let startup = ready_rx.recv();
    match startup {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let _ = thread.join();
            return Err(WorkerError::Mailbox(err));
        }
        Err(_) => {
            let _ = thread.join();
            return Err(WorkerError::Startup);
        }
    }

    debug!(
        "worker '{}' consuming a mailbox of {} slot(s)",
        config.name,
        mailbox.capacity()
    );
    Ok(WorkerHandle {
        name: config.name,
        mailbox,
        thread: Some(thread),
    })
}
