//! Error types for mailbox lifecycle, posting and deferred calls.

use thiserror::Error;

/// Result alias for mailbox lifecycle operations.
pub type MailboxResult<T> = Result<T, MailboxError>;

/// Reasons a mailbox refused to start consuming.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum MailboxError {
    /// Another consumer already started the mailbox.
    #[error("mailbox is already running")]
    AlreadyRunning,

    /// The mailbox was closed before it could be started.
    #[error("mailbox is closed")]
    Closed,
}

/// Reasons a task could not be posted. The task is dropped without running.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PostError {
    /// No consumer has started the mailbox yet.
    #[error("mailbox is not running yet")]
    NotRunning,

    /// Every slot stayed busy for the whole timeout.
    #[error("no free slot within the post timeout")]
    TimedOut,

    /// The mailbox was closed, possibly while the post was in flight.
    #[error("mailbox is closed")]
    Closed,

    /// A free slot was granted but publishing it to the consumer failed.
    #[error("mailbox rejected the task while enqueueing it")]
    Rejected,
}

/// Reasons a deferred call produced no result.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DeferError {
    /// The call never reached the mailbox; the callable did not run.
    #[error("could not post deferred call: {0}")]
    Post(#[from] PostError),

    /// The consumer released the call without a result: the callable panicked
    /// or the queued task was discarded.
    #[error("deferred call was abandoned by the consumer")]
    Abandoned,

    /// The caller is the mailbox's own consumer thread and would wait on itself.
    #[error("deferred call issued from the mailbox's consumer thread")]
    SameThread,
}
