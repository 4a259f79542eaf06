//! Wait policies for blocking slot and mailbox operations.
//!
//! A [`Timeout`] is chosen by the caller; the pool turns it into an absolute
//! deadline once, when the operation starts, so spurious wakeups never extend
//! the total wait.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, MutexGuard};

/// Upper bound on how long a blocking operation may wait.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Fail straight away instead of waiting.
    Immediate,
    /// Wait at most the given duration.
    After(Duration),
    /// Wait until the operation can proceed.
    #[default]
    Forever,
}

impl Timeout {
    /// Shorthand for [`Timeout::After`] in milliseconds; `0` maps to [`Timeout::Immediate`].
    pub fn millis(ms: u64) -> Self {
        Duration::from_millis(ms).into()
    }

    pub(crate) fn deadline(self) -> Deadline {
        match self {
            Timeout::Immediate => Deadline::Now,
            Timeout::After(duration) => match Instant::now().checked_add(duration) {
                Some(at) => Deadline::At(at),
                None => Deadline::Never,
            },
            Timeout::Forever => Deadline::Never,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Timeout::Immediate
        } else {
            Timeout::After(duration)
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Timeout::Forever, Timeout::from)
    }
}

/// Absolute form of a [`Timeout`], fixed when the blocking operation begins.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Deadline {
    Now,
    At(Instant),
    Never,
}

impl Deadline {
    /// Parks on `condvar`. Returns `false` once the deadline has passed.
    pub(crate) fn wait<T>(self, condvar: &Condvar, guard: &mut MutexGuard<'_, T>) -> bool {
        match self {
            Deadline::Now => false,
            Deadline::At(at) => !condvar.wait_until(guard, at).timed_out(),
            Deadline::Never => {
                condvar.wait(guard);
                true
            }
        }
    }
}
