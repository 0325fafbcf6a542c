//! Cyclic rendezvous barriers that can be switched off and on at runtime.
//!
//! Two backends implement [`CyclicBarrier`] with the same observable
//! behavior:
//! - [`MonitorBarrier`]: one mutex and condition variable, rounds detected
//!   through a generation counter.
//! - [`SemaphoreBarrier`]: a two phase turnstile built from counting
//!   semaphores.
//!
//! # Examples
//!
//! ```
//! use foundation_sync::barrier::{CyclicBarrier, MonitorBarrier};
//! use foundation_sync::CancellationToken;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let barrier = Arc::new(MonitorBarrier::new(3));
//! let handles: Vec<_> = (0..3)
//!     .map(|_| {
//!         let barrier = Arc::clone(&barrier);
//!         thread::spawn(move || barrier.wait(&CancellationToken::never()))
//!     })
//!     .collect();
//!
//! let mut indices: Vec<usize> = handles
//!     .into_iter()
//!     .map(|h| h.join().unwrap().unwrap())
//!     .collect();
//! indices.sort_unstable();
//! assert_eq!(indices, vec![0, 1, 2]);
//! ```

mod monitor;
mod turnstile;

pub use monitor::MonitorBarrier;
pub use turnstile::SemaphoreBarrier;

use crate::cancel::CancellationToken;
use crate::errors::SyncResult;

/// Shared contract of the barrier backends.
pub trait CyclicBarrier: Send + Sync {
    /// Number of callers needed to trip one round.
    fn parties(&self) -> usize;

    fn is_active(&self) -> bool;

    /// Blocks until `parties` callers have arrived in the current round and
    /// returns this caller's arrival index in `0..parties`.
    ///
    /// Every caller of one round gets a different index. An inactive barrier
    /// returns `Ok(0)` without blocking, and callers released by
    /// [`CyclicBarrier::deactivate`] also get `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Cancelled`] if `cancel` fires before the
    /// round trips. The caller's arrival is withdrawn, so the round still
    /// needs `parties` other callers.
    fn wait(&self, cancel: &CancellationToken) -> SyncResult<usize>;

    /// Switches an inactive barrier back on with a fresh round. A no-op when
    /// the barrier is already active.
    fn activate(&self);

    /// Switches the barrier off and releases every blocked caller.
    fn deactivate(&self);
}

/// Arrival bookkeeping for one round.
///
/// Indices handed back by cancelled callers are reused before fresh ones, so
/// the callers that complete a round always hold exactly `0..parties`.
#[derive(Debug, Default)]
pub(crate) struct Arrivals {
    arrived: usize,
    vacated: Vec<usize>,
}

impl Arrivals {
    /// Records an arrival and returns its index.
    pub(crate) fn admit(&mut self) -> usize {
        // with nothing vacated, the issued indices are exactly 0..arrived
        let index = self.vacated.pop().unwrap_or(self.arrived);
        self.arrived += 1;
        index
    }

    /// Takes back the arrival that was given `index`.
    pub(crate) fn withdraw(&mut self, index: usize) {
        self.arrived -= 1;
        self.vacated.push(index);
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.arrived
    }

    pub(crate) fn reset(&mut self) {
        self.arrived = 0;
        self.vacated.clear();
    }
}
