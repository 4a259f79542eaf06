#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
//! Core inter-thread primitives shared by the mailbox and runtime crates.
//!
//! * [`Expected`] – closed two-state container holding a value or an error.
//! * [`SlotPool`] – fixed-capacity typed slots recycled through free/ready index rings.
//! * [`Signal`] – one-shot wake-up flag parked on with futex-backed atomics.
//! * [`Timeout`] – how long a blocking operation may wait.

mod expected;
mod slot_pool;
mod timeout;
pub mod wait;

pub use expected::{unexpected, Expected, Unexpected};
pub use slot_pool::{ReadySlot, SlotAcquire, SlotGrant, SlotPool, SlotPop};
pub use timeout::Timeout;
pub use wait::Signal;
