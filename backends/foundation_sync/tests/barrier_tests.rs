//! Behavior shared by every `CyclicBarrier` backend.
//!
//! Each check is written once against the trait and instantiated for both
//! backends by `barrier_suite!`, so the two must pass the exact same tests.

use foundation_sync::{
    CancellationToken, CyclicBarrier, MonitorBarrier, SemaphoreBarrier, SyncError, SyncResult,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Time given to spawned threads to park inside `wait`.
const SETTLE: Duration = Duration::from_millis(100);

fn spawn_waiters<B: CyclicBarrier + 'static>(
    barrier: &Arc<B>,
    count: usize,
) -> Vec<JoinHandle<SyncResult<usize>>> {
    (0..count)
        .map(|_| {
            let barrier = Arc::clone(barrier);
            thread::spawn(move || barrier.wait(&CancellationToken::never()))
        })
        .collect()
}

fn join_sorted(handles: Vec<JoinHandle<SyncResult<usize>>>) -> Vec<usize> {
    let mut indices: Vec<usize> = handles
        .into_iter()
        .map(|h| {
            h.join()
                .expect("waiter should join")
                .expect("waiter should not be cancelled")
        })
        .collect();
    indices.sort_unstable();
    indices
}

mod checks {
    use super::*;

    pub fn trips_with_distinct_indices<B: CyclicBarrier + 'static>(build: fn(usize) -> Arc<B>) {
        let barrier = build(3);
        let handles = spawn_waiters(&barrier, 3);
        assert_eq!(join_sorted(handles), vec![0, 1, 2]);
    }

    pub fn repeats_over_many_cycles<B: CyclicBarrier + 'static>(build: fn(usize) -> Arc<B>) {
        let barrier = build(3);
        for cycle in 0..5 {
            let handles = spawn_waiters(&barrier, 3);
            assert_eq!(join_sorted(handles), vec![0, 1, 2], "cycle {cycle}");
        }
    }

    /// The same threads looping through the barrier see a full index set in
    /// every round.
    pub fn looping_threads_stay_in_lock_step<B: CyclicBarrier + 'static>(
        build: fn(usize) -> Arc<B>,
    ) {
        let parties = 4;
        let rounds = 50;
        let barrier = build(parties);

        let handles: Vec<_> = (0..parties)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let never = CancellationToken::never();
                    (0..rounds)
                        .map(|_| barrier.wait(&never).expect("not cancelled"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let per_thread: Vec<Vec<usize>> = handles
            .into_iter()
            .map(|h| h.join().expect("looping thread should join"))
            .collect();

        for round in 0..rounds {
            let mut indices: Vec<usize> = per_thread.iter().map(|seen| seen[round]).collect();
            indices.sort_unstable();
            assert_eq!(indices, (0..parties).collect::<Vec<_>>(), "round {round}");
        }
    }

    /// Twice as many callers as parties form two complete rounds.
    pub fn surplus_callers_form_next_round<B: CyclicBarrier + 'static>(
        build: fn(usize) -> Arc<B>,
    ) {
        let parties = 3;
        let barrier = build(parties);
        let handles = spawn_waiters(&barrier, parties * 2);
        assert_eq!(join_sorted(handles), vec![0, 0, 1, 1, 2, 2]);
    }

    pub fn deactivate_releases_waiters<B: CyclicBarrier + 'static>(build: fn(usize) -> Arc<B>) {
        let barrier = build(3);
        let handles = spawn_waiters(&barrier, 2);
        thread::sleep(SETTLE);

        barrier.deactivate();
        assert!(!barrier.is_active());
        assert_eq!(join_sorted(handles), vec![0, 0]);

        let started = Instant::now();
        assert_eq!(barrier.wait(&CancellationToken::never()), Ok(0));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    pub fn wait_when_inactive_returns_at_once<B: CyclicBarrier + 'static>(
        build: fn(usize) -> Arc<B>,
    ) {
        let barrier = build(3);
        barrier.deactivate();

        let started = Instant::now();
        for _ in 0..10 {
            assert_eq!(barrier.wait(&CancellationToken::never()), Ok(0));
        }
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    pub fn reactivation_restores_rounds<B: CyclicBarrier + 'static>(build: fn(usize) -> Arc<B>) {
        let barrier = build(3);

        let released = spawn_waiters(&barrier, 1);
        thread::sleep(SETTLE);
        barrier.deactivate();
        assert_eq!(join_sorted(released), vec![0]);

        barrier.activate();
        assert!(barrier.is_active());
        for _ in 0..3 {
            let handles = spawn_waiters(&barrier, 3);
            assert_eq!(join_sorted(handles), vec![0, 1, 2]);
        }
    }

    pub fn activate_is_idempotent<B: CyclicBarrier + 'static>(build: fn(usize) -> Arc<B>) {
        let barrier = build(2);
        barrier.activate();
        barrier.activate();

        let handles = spawn_waiters(&barrier, 2);
        assert_eq!(join_sorted(handles), vec![0, 1]);
    }

    pub fn cancelled_wait_reports_cancellation<B: CyclicBarrier + 'static>(
        build: fn(usize) -> Arc<B>,
    ) {
        let barrier = build(2);
        let token = CancellationToken::new();

        let waiter = {
            let barrier = Arc::clone(&barrier);
            let token = token.clone();
            thread::spawn(move || barrier.wait(&token))
        };
        thread::sleep(SETTLE);
        token.cancel();
        assert_eq!(
            waiter.join().expect("cancelled waiter should join"),
            Err(SyncError::Cancelled)
        );

        // the withdrawn arrival must not count towards the next round
        let handles = spawn_waiters(&barrier, 2);
        assert_eq!(join_sorted(handles), vec![0, 1]);
    }

    /// Cancelling the first arrival hands its index to a later caller.
    pub fn cancelled_index_is_reissued<B: CyclicBarrier + 'static>(build: fn(usize) -> Arc<B>) {
        let barrier = build(3);
        let token = CancellationToken::new();

        let first = {
            let barrier = Arc::clone(&barrier);
            let token = token.clone();
            thread::spawn(move || barrier.wait(&token))
        };
        thread::sleep(SETTLE);

        let mut rest = spawn_waiters(&barrier, 1);
        thread::sleep(SETTLE);

        token.cancel();
        assert_eq!(first.join().expect("first should join"), Err(SyncError::Cancelled));

        rest.extend(spawn_waiters(&barrier, 2));
        assert_eq!(join_sorted(rest), vec![0, 1, 2]);
    }

    /// A parked waiter whose token fires just before the round trips still
    /// completes the round.
    pub fn trip_wins_over_pending_cancel<B: CyclicBarrier + 'static>(
        build: fn(usize, Duration) -> Arc<B>,
    ) {
        // long enough that the waiter only wakes for the trip itself
        let barrier = build(2, Duration::from_secs(2));
        let token = CancellationToken::new();

        let parked = {
            let barrier = Arc::clone(&barrier);
            let token = token.clone();
            thread::spawn(move || barrier.wait(&token))
        };
        thread::sleep(SETTLE);

        token.cancel();
        let tripper = barrier.wait(&CancellationToken::never());

        let parked = parked.join().expect("parked waiter should join");
        let mut indices = vec![
            parked.expect("round tripped before the token was seen"),
            tripper.expect("tripping caller never blocks"),
        ];
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
    }

    /// Deactivating while looping callers sit anywhere inside `wait` releases
    /// all of them, and the reactivated barrier trips full rounds again.
    pub fn deactivate_mid_flight_then_reactivate<B: CyclicBarrier + 'static>(
        build: fn(usize) -> Arc<B>,
    ) {
        let parties = 3;
        let barrier = build(parties);

        for repetition in 0..10 {
            let loopers: Vec<_> = (0..parties)
                .map(|_| {
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        let never = CancellationToken::never();
                        let mut rounds = 0_usize;
                        while barrier.is_active() {
                            barrier.wait(&never).expect("not cancelled");
                            rounds += 1;
                        }
                        rounds
                    })
                })
                .collect();

            thread::sleep(Duration::from_millis(20));
            barrier.deactivate();
            for looper in loopers {
                looper.join().expect("looper should be released");
            }

            barrier.activate();
            let handles = spawn_waiters(&barrier, parties);
            assert_eq!(join_sorted(handles), vec![0, 1, 2], "repetition {repetition}");
        }
    }
}

macro_rules! barrier_suite {
    ($module:ident, $barrier:ty) => {
        mod $module {
            use super::*;

            fn build(parties: usize) -> Arc<$barrier> {
                build_with_poll(parties, Duration::from_millis(1))
            }

            fn build_with_poll(parties: usize, poll: Duration) -> Arc<$barrier> {
                Arc::new(<$barrier>::new(parties).with_poll_interval(poll))
            }

            #[test]
            #[ntest::timeout(10000)]
            fn trips_with_distinct_indices() {
                checks::trips_with_distinct_indices(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn repeats_over_many_cycles() {
                checks::repeats_over_many_cycles(build);
            }

            #[test]
            #[ntest::timeout(20000)]
            fn looping_threads_stay_in_lock_step() {
                checks::looping_threads_stay_in_lock_step(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn surplus_callers_form_next_round() {
                checks::surplus_callers_form_next_round(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn deactivate_releases_waiters() {
                checks::deactivate_releases_waiters(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn wait_when_inactive_returns_at_once() {
                checks::wait_when_inactive_returns_at_once(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn reactivation_restores_rounds() {
                checks::reactivation_restores_rounds(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn activate_is_idempotent() {
                checks::activate_is_idempotent(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn cancelled_wait_reports_cancellation() {
                checks::cancelled_wait_reports_cancellation(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn cancelled_index_is_reissued() {
                checks::cancelled_index_is_reissued(build);
            }

            #[test]
            #[ntest::timeout(10000)]
            fn trip_wins_over_pending_cancel() {
                checks::trip_wins_over_pending_cancel(build_with_poll);
            }

            #[test]
            #[ntest::timeout(20000)]
            fn deactivate_mid_flight_then_reactivate() {
                checks::deactivate_mid_flight_then_reactivate(build);
            }
        }
    };
}

barrier_suite!(monitor, MonitorBarrier);
barrier_suite!(semaphore, SemaphoreBarrier);
