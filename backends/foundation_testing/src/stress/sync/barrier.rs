//! Barrier round stress.

use crate::stress::{StressConfig, StressHarness, StressResult};
use foundation_sync::{CyclicBarrier, SyncError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Drives every worker through `barrier` once per iteration.
///
/// Each returned index must lie in `0..parties`. After the run every index
/// must have been handed out equally often, since the callers of a tripped
/// round always hold the full index set; an imbalance is counted as one
/// extra failure. A wait cancelled by the deadline is not a failure.
///
/// # Examples
///
/// ```
/// use foundation_sync::MonitorBarrier;
/// use foundation_testing::stress::{StressConfig, sync::run_barrier_stress};
///
/// let config = StressConfig::new().threads(4).iterations(100);
/// let result = run_barrier_stress(MonitorBarrier::new(4), config);
///
/// assert_eq!(result.failures, 0);
/// assert_eq!(result.successes, 400);
/// ```
///
/// # Panics
///
/// Panics if the thread count is not a multiple of the barrier's parties;
/// the last round could never fill up.
#[must_use]
pub fn run_barrier_stress<B>(barrier: B, config: StressConfig) -> StressResult
where
    B: CyclicBarrier + 'static,
{
    let parties = barrier.parties();
    assert!(
        config.get_thread_count() % parties == 0,
        "stress threads must be a multiple of the barrier parties"
    );

    let barrier = Arc::new(barrier);
    let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..parties).map(|_| AtomicUsize::new(0)).collect());

    let harness = StressHarness::new(config);
    let stop = harness.stop_token();

    let result = {
        let hits = Arc::clone(&hits);
        harness.run(move |_thread_id, _iteration| match barrier.wait(&stop) {
            Ok(index) if index < parties => {
                hits[index].fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(_) => false,
            Err(SyncError::Cancelled) => stop.is_cancelled(),
            Err(_) => false,
        })
    };

    let counts: Vec<usize> = hits.iter().map(|hit| hit.load(Ordering::Relaxed)).collect();
    let balanced = counts.windows(2).all(|pair| pair[0] == pair[1]);
    if !balanced {
        tracing::warn!(?counts, "barrier indices handed out unevenly");
        return result.with_failures(1);
    }
    result
}
