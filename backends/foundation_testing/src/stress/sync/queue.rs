//! Priority queue churn stress.

use crate::stress::{StressConfig, StressHarness, StressResult};
use foundation_sync::{ConcurrentPriorityQueue, SyncError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Pairs up producers and consumers on a queue of `capacity`.
///
/// Even workers add a unique key per iteration, odd workers take the first
/// entry. With an odd thread count the unpaired last worker is a reader that
/// checks the queue's order through snapshots. An iteration fails if an add
/// is refused as a duplicate, a key is delivered twice, or a snapshot is out
/// of order. A wait cancelled by the deadline is not a failure.
///
/// # Examples
///
/// ```
/// use foundation_testing::stress::{StressConfig, sync::run_queue_stress};
///
/// let config = StressConfig::new().threads(5).iterations(200);
/// let result = run_queue_stress(8, config);
///
/// assert_eq!(result.failures, 0);
/// assert_eq!(result.successes, 1000);
/// ```
///
/// # Panics
///
/// Panics if `capacity` is 0.
#[must_use]
pub fn run_queue_stress(capacity: usize, config: StressConfig) -> StressResult {
    let queue = Arc::new(
        ConcurrentPriorityQueue::new(capacity).with_poll_interval(config.get_poll_interval()),
    );
    let delivered = Arc::new(Mutex::new(HashSet::new()));
    let threads = config.get_thread_count();
    let reader = (threads % 2 == 1).then(|| threads - 1);

    let harness = StressHarness::new(config);
    let stop = harness.stop_token();

    harness.run(move |thread_id, iteration| {
        if Some(thread_id) == reader {
            let entries = queue.snapshot();
            let _ = queue.search(&format!("0-{iteration}"));
            return entries
                .windows(2)
                .all(|pair| pair[0].priority >= pair[1].priority);
        }

        let outcome = if thread_id % 2 == 0 {
            let priority = i64::try_from((thread_id * 31 + iteration * 17) % 97).unwrap_or(0);
            queue
                .add(format!("{thread_id}-{iteration}"), priority, &stop)
                .map(|position| position.is_some())
        } else {
            queue.get_first(&stop).map(|key| {
                delivered
                    .lock()
                    .map(|mut seen| seen.insert(key))
                    .unwrap_or(false)
            })
        };

        match outcome {
            Ok(valid) => valid,
            Err(SyncError::Cancelled) => stop.is_cancelled(),
            Err(_) => false,
        }
    })
}
