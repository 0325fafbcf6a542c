//! Barrier built from counting semaphores.
//!
//! A round passes two turnstiles. The arrival turnstile stays shut until the
//! last caller arrives, which opens it once per party. The departure
//! turnstile stays shut until every caller has made it through the first one,
//! so a round's stragglers are never counted into the next round.
//!
//! A third semaphore, the entrance, holds back callers that show up while a
//! tripped round is still leaving. They are let in once the last caller of
//! that round has returned, and recheck before arriving.

use core::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Arrivals, CyclicBarrier};
use crate::cancel::{self, CancellationToken};
use crate::errors::{SyncError, SyncResult};
use crate::semaphore::Semaphore;

struct TurnstileState {
    active: bool,
    arrivals: Arrivals,
    /// Callers of the tripped round that have not reached the second phase.
    crossing: usize,
    /// Callers of the tripped round that have not returned.
    leaving: usize,
    /// Callers parked at the entrance.
    deferred: usize,
    rounds: u64,
    /// Bumped every time the entrance is opened.
    openings: u64,
    /// Bumped by every activation and deactivation.
    epoch: u64,
}

/// A cyclic barrier that waits on semaphore turnstiles instead of a
/// condition variable.
///
/// `activate` and `deactivate` must not race callers that are still leaving
/// a round: a caller released by `deactivate` has to return before the
/// barrier is reactivated, otherwise `activate` may drain the permit that was
/// meant for it.
pub struct SemaphoreBarrier {
    parties: usize,
    state: Mutex<TurnstileState>,
    entrance: Semaphore,
    arrival_gate: Semaphore,
    departure_gate: Semaphore,
}

impl SemaphoreBarrier {
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
            state: Mutex::new(TurnstileState {
                active: true,
                arrivals: Arrivals::default(),
                crossing: 0,
                leaving: 0,
                deferred: 0,
                rounds: 0,
                openings: 0,
                epoch: 0,
            }),
            entrance: Semaphore::new(0),
            arrival_gate: Semaphore::new(0),
            departure_gate: Semaphore::new(0),
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
        self.entrance = Semaphore::new(0).with_poll_interval(poll);
        self.arrival_gate = Semaphore::new(0).with_poll_interval(poll);
        self.departure_gate = Semaphore::new(0).with_poll_interval(poll);
        self
    }

    /// Number of rounds tripped so far.
    #[must_use]
    pub fn rounds(&self) -> u64 {
        cancel::lock(&self.state).rounds
    }

    /// Waits at the entrance until no tripped round is leaving.
    ///
    /// Returns `None` once the barrier is inactive.
    fn enter(
        &self,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<MutexGuard<'_, TurnstileState>>> {
        let mut state = cancel::lock(&self.state);
        loop {
            if !state.active {
                return Ok(None);
            }
            if state.leaving == 0 {
                return Ok(Some(state));
            }

            state.deferred += 1;
            let seen = state.openings;
            drop(state);

            let parked = self.entrance.acquire(cancel);
            state = cancel::lock(&self.state);

            if let Err(err) = parked {
                self.leave_entrance(&mut state, seen);
                tracing::debug!("barrier entrance wait cancelled");
                return Err(err);
            }
        }
    }

    /// Undoes a cancelled entrance wait that started at opening `seen`.
    ///
    /// Returns `false` when the opening counted this caller but its permit
    /// was already taken by another one, leaving a stray permit behind. A
    /// stray permit only lets one later caller recheck the entrance early.
    fn leave_entrance(&self, state: &mut TurnstileState, seen: u64) -> bool {
        if state.openings == seen {
            state.deferred -= 1;
            return true;
        }

        // the opening already counted us, take the permit we were given
        let reclaimed = self.entrance.try_acquire();
        if !reclaimed {
            tracing::trace!(
                openings = state.openings,
                "entrance permit already taken, one stray permit stays behind"
            );
        }
        reclaimed
    }

    fn open_entrance(&self, state: &mut TurnstileState) {
        state.openings = state.openings.wrapping_add(1);
        let deferred = std::mem::take(&mut state.deferred);
        self.entrance.release(deferred);
    }
}

impl CyclicBarrier for SemaphoreBarrier {
    fn parties(&self) -> usize {
        self.parties
    }

    fn is_active(&self) -> bool {
        cancel::lock(&self.state).active
    }

    fn wait(&self, cancel: &CancellationToken) -> SyncResult<usize> {
        // Phase 1: arrival.
        let Some(mut state) = self.enter(cancel)? else {
            return Ok(0);
        };

        let index = state.arrivals.admit();
        let round = state.rounds;
        let epoch = state.epoch;

        if state.arrivals.count() == self.parties {
            state.arrivals.reset();
            state.rounds = state.rounds.wrapping_add(1);
            state.crossing = self.parties;
            state.leaving = self.parties;
            self.arrival_gate.release(self.parties);
            tracing::trace!(index, round, "barrier tripped");
        }
        drop(state);

        let crossed = self.arrival_gate.acquire(cancel);
        let mut state = cancel::lock(&self.state);

        if let Err(err) = crossed {
            if state.epoch != epoch {
                // a deactivation already discarded this arrival
                return Err(err);
            }
            if state.rounds == round {
                state.arrivals.withdraw(index);
                tracing::debug!(index, round, "barrier wait cancelled");
                return Err(err);
            }

            // the round tripped first, so a permit is reserved for us
            drop(state);
            self.arrival_gate.acquire_blocking();
            state = cancel::lock(&self.state);
        }

        if !state.active {
            return Ok(0);
        }
        if state.epoch != epoch {
            // reactivated while parked, the round state was reset underneath us
            return Ok(index);
        }

        // Phase 2: departure.
        state.crossing -= 1;
        if state.crossing == 0 {
            self.departure_gate.release(self.parties);
        }
        drop(state);

        // every peer already crossed the first turnstile, so this wait is bounded
        self.departure_gate.acquire_blocking();

        let mut state = cancel::lock(&self.state);
        if state.epoch != epoch {
            return Ok(if state.active { index } else { 0 });
        }

        state.leaving -= 1;
        if state.leaving == 0 {
            self.open_entrance(&mut state);
        }
        Ok(index)
    }

    fn activate(&self) {
        let mut state = cancel::lock(&self.state);
        if state.active {
            return;
        }

        state.active = true;
        state.epoch = state.epoch.wrapping_add(1);
        state.arrivals.reset();
        state.crossing = 0;
        state.leaving = 0;
        state.deferred = 0;

        let stale =
            self.arrival_gate.drain() + self.departure_gate.drain() + self.entrance.drain();
        drop(state);

        tracing::debug!(
            parties = self.parties,
            stale,
            "semaphore barrier activated"
        );
    }

    fn deactivate(&self) {
        let mut state = cancel::lock(&self.state);
        state.active = false;
        state.epoch = state.epoch.wrapping_add(1);
        state.arrivals.reset();
        state.crossing = 0;
        state.leaving = 0;

        self.arrival_gate.release(self.parties);
        self.departure_gate.release(self.parties);
        self.open_entrance(&mut state);
        drop(state);

        tracing::debug!(parties = self.parties, "semaphore barrier deactivated");
    }
}

impl fmt::Debug for SemaphoreBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = cancel::lock(&self.state);
        f.debug_struct("SemaphoreBarrier")
            .field("parties", &self.parties)
            .field("arrived", &state.arrivals.count())
            .field("leaving", &state.leaving)
            .field("rounds", &state.rounds)
            .field("active", &state.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[should_panic(expected = "barrier parties must be > 0")]
    fn test_new_zero_panics() {
        let _ = SemaphoreBarrier::new(0);
    }

    /// WHY: A single party opens both turnstiles for itself
    /// WHAT: Each call returns 0 and counts a round
    #[test]
    #[ntest::timeout(2000)]
    fn test_single_party_rounds() {
        let barrier = SemaphoreBarrier::new(1);
        let never = CancellationToken::never();

        for _ in 0..3 {
            assert_eq!(barrier.wait(&never), Ok(0));
        }
        assert_eq!(barrier.rounds(), 3);
    }

    /// WHY: Stale permits from a deactivation must not leak into later rounds
    /// WHAT: activate drains every turnstile that deactivate opened
    #[test]
    fn test_activate_drains_stale_permits() {
        let barrier = SemaphoreBarrier::new(4);
        barrier.deactivate();
        assert_eq!(barrier.arrival_gate.available_permits(), 4);
        assert_eq!(barrier.departure_gate.available_permits(), 4);

        barrier.activate();
        assert_eq!(barrier.arrival_gate.available_permits(), 0);
        assert_eq!(barrier.departure_gate.available_permits(), 0);
        assert_eq!(barrier.entrance.available_permits(), 0);
    }

    /// WHY: activate is idempotent on an active barrier
    /// WHAT: Calling it twice does not touch round state
    #[test]
    fn test_activate_when_active_is_noop() {
        let barrier = SemaphoreBarrier::new(2);
        barrier.activate();
        assert!(barrier.is_active());
        assert_eq!(cancel::lock(&barrier.state).epoch, 0);
    }

    /// WHY: Every turnstile starts closed, whatever the poll interval
    /// WHAT: new and with_poll_interval leave all three semaphores empty
    #[test]
    fn test_turnstiles_start_closed() {
        for barrier in [
            SemaphoreBarrier::new(3),
            SemaphoreBarrier::new(3).with_poll_interval(Duration::from_millis(1)),
        ] {
            assert_eq!(barrier.entrance.available_permits(), 0);
            assert_eq!(barrier.arrival_gate.available_permits(), 0);
            assert_eq!(barrier.departure_gate.available_permits(), 0);
        }
    }

    /// WHY: A cancelled entrance wait must give back what the opening gave it
    /// WHAT: Before any opening the deferred count drops, after one the permit is reclaimed
    #[test]
    fn test_leave_entrance_rolls_back() {
        let barrier = SemaphoreBarrier::new(2);
        let mut state = cancel::lock(&barrier.state);

        state.deferred = 1;
        let seen = state.openings;
        assert!(barrier.leave_entrance(&mut state, seen));
        assert_eq!(state.deferred, 0);

        barrier.open_entrance(&mut state);
        barrier.entrance.release(1);
        assert!(barrier.leave_entrance(&mut state, 0));
        assert_eq!(barrier.entrance.available_permits(), 0);
    }

    /// WHY: A permit lost to another caller must show up in the logs
    /// WHAT: leave_entrance reports and traces the empty entrance
    #[test]
    #[traced_test]
    fn test_leave_entrance_traces_stray_permit() {
        let barrier = SemaphoreBarrier::new(2);
        let mut state = cancel::lock(&barrier.state);
        barrier.open_entrance(&mut state);

        assert!(!barrier.leave_entrance(&mut state, 0));
        assert!(logs_contain("one stray permit stays behind"));
    }

    #[test]
    fn test_debug() {
        let debug = format!("{:?}", SemaphoreBarrier::new(2));
        assert!(debug.contains("SemaphoreBarrier"));
        assert!(debug.contains("parties: 2"));
    }
}
