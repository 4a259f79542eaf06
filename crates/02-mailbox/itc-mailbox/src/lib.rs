#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
//! Single-consumer task mailboxes and synchronous cross-thread calls.
//!
//! A [`TaskMailbox`] lets any thread hand work to one dedicated consumer
//! thread, which runs it in FIFO order. [`defer_call`] builds a blocking
//! call on top: the callable runs on the consumer and its return value comes
//! back to the caller wrapped in an [`Expected`].

mod defer;
mod error;
mod mailbox;
mod task;

pub use defer::{defer_call, defer_call_timeout};
pub use error::{DeferError, MailboxError, MailboxResult, PostError};
pub use mailbox::{MailboxConsumer, MailboxMetricsSnapshot, MailboxState, TaskMailbox};
pub use task::{Task, TASK_INLINE_BYTES};

pub use itc_core::{Expected, Timeout};
