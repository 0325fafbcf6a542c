//! Blocking synchronization primitives for threads.
//!
//! This crate provides:
//! - **Barriers**: cyclic rendezvous that can be deactivated and reactivated,
//!   with a condition variable backend ([`MonitorBarrier`]) and a semaphore
//!   turnstile backend ([`SemaphoreBarrier`]) behind one [`CyclicBarrier`]
//!   trait.
//! - **Fairness gate**: [`FairnessGate`], a bounded resource shared by one of
//!   two groups at a time, admitting callers strictly in ticket order.
//! - **Priority queue**: [`ConcurrentPriorityQueue`], a bounded sorted list
//!   with a lock per node and hand-over-hand traversal.
//! - **Counting semaphore** and **cancellation token** used by the above.
//!
//! Every blocking call takes a [`CancellationToken`]. Pass
//! [`CancellationToken::never`] for waits that can not be interrupted.

pub mod barrier;
pub mod cancel;
pub mod errors;
pub mod gate;
pub mod queue;
pub mod semaphore;

pub use barrier::{CyclicBarrier, MonitorBarrier, SemaphoreBarrier};
pub use cancel::{CancellationToken, DEFAULT_POLL_INTERVAL};
pub use errors::{SyncError, SyncResult};
pub use gate::{FairnessGate, GatePass, Group, Ticket};
pub use queue::{ConcurrentPriorityQueue, QueueEntry};
pub use semaphore::Semaphore;
