//! Barrier built on one mutex and condition variable.

use core::fmt;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::{Arrivals, CyclicBarrier};
use crate::cancel::{self, CancellationToken, DEFAULT_POLL_INTERVAL};
use crate::errors::{SyncError, SyncResult};

struct MonitorState {
    arrivals: Arrivals,
    generation: u64,
    active: bool,
}

/// A cyclic barrier where waiters sleep on a condition variable until the
/// round's generation changes.
///
/// The last caller to arrive trips the round: it resets the arrival count,
/// bumps the generation and wakes everyone. It returns straight away without
/// ever blocking.
pub struct MonitorBarrier {
    parties: usize,
    state: Mutex<MonitorState>,
    trip: Condvar,
    poll: Duration,
}

impl MonitorBarrier {
    /// Creates an active barrier for `parties` callers.
    ///
    /// # Panics
    ///
    /// Panics if `parties` is 0.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "barrier parties must be > 0");
        Self {
            parties,
            state: Mutex::new(MonitorState {
                arrivals: Arrivals::default(),
                generation: 0,
                active: true,
            }),
            trip: Condvar::new(),
            poll: DEFAULT_POLL_INTERVAL,
        }
    }

    /// # Errors
    ///
    /// Returns [`SyncError::InvalidParties`] if `parties` is 0.
    pub fn try_new(parties: usize) -> SyncResult<Self> {
        if parties == 0 {
            return Err(SyncError::InvalidParties(parties));
        }
        Ok(Self::new(parties))
    }

    /// Sets how long a cancellable waiter sleeps between token checks.
    #[must_use]
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Number of generations tripped so far, including the bump made by each
    /// reactivation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        cancel::lock(&self.state).generation
    }
}

impl CyclicBarrier for MonitorBarrier {
    fn parties(&self) -> usize {
        self.parties
    }

    fn is_active(&self) -> bool {
        cancel::lock(&self.state).active
    }

    fn wait(&self, cancel: &CancellationToken) -> SyncResult<usize> {
        let mut state = cancel::lock(&self.state);
        if !state.active {
            return Ok(0);
        }

        let index = state.arrivals.admit();
        let local_gen = state.generation;

        if state.arrivals.count() == self.parties {
            state.arrivals.reset();
            state.generation = state.generation.wrapping_add(1);
            drop(state);

            self.trip.notify_all();
            tracing::trace!(index, generation = local_gen, "barrier tripped");
            return Ok(index);
        }

        loop {
            if !state.active {
                return Ok(0);
            }

            if state.generation != local_gen {
                return Ok(index);
            }

            if cancel.is_cancelled() {
                state.arrivals.withdraw(index);
                tracing::debug!(index, generation = local_gen, "barrier wait cancelled");
                return Err(SyncError::Cancelled);
            }

            state = cancel::park(&self.trip, state, cancel, self.poll);
        }
    }

    fn activate(&self) {
        let mut state = cancel::lock(&self.state);
        if state.active {
            return;
        }

        state.active = true;
        state.arrivals.reset();
        // waiters still parked from before the deactivation see a new round
        state.generation = state.generation.wrapping_add(1);
        drop(state);

        self.trip.notify_all();
        tracing::debug!(parties = self.parties, "monitor barrier activated");
    }

    fn deactivate(&self) {
        let mut state = cancel::lock(&self.state);
        state.active = false;
        drop(state);

        self.trip.notify_all();
        tracing::debug!(parties = self.parties, "monitor barrier deactivated");
    }
}

impl fmt::Debug for MonitorBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = cancel::lock(&self.state);
        f.debug_struct("MonitorBarrier")
            .field("parties", &self.parties)
            .field("arrived", &state.arrivals.count())
            .field("generation", &state.generation)
            .field("active", &state.active)
            .finish()
    }
}
