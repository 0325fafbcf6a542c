//! Fairness gate admission stress.

use crate::stress::{StressConfig, StressHarness, StressResult};
use foundation_sync::{FairnessGate, Group, SyncError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Alternates workers between the two groups, each passing through a gate
/// of `capacity` once per iteration.
///
/// An iteration fails if, while inside, the worker sees a member of the other
/// group inside or more than `capacity` members of its own. An entry
/// cancelled by the deadline is not a failure.
///
/// # Examples
///
/// ```
/// use foundation_testing::stress::{StressConfig, sync::run_gate_stress};
///
/// let config = StressConfig::new().threads(6).iterations(200);
/// let result = run_gate_stress(2, config);
///
/// assert_eq!(result.failures, 0);
/// assert_eq!(result.successes, 1200);
/// ```
///
/// # Panics
///
/// Panics if `capacity` is 0.
#[must_use]
pub fn run_gate_stress(capacity: usize, config: StressConfig) -> StressResult {
    let gate = Arc::new(FairnessGate::new(capacity).with_poll_interval(config.get_poll_interval()));
    let inside = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0)]);

    let harness = StressHarness::new(config);
    let stop = harness.stop_token();

    harness.run(move |thread_id, _iteration| {
        let (group, own, other) = if thread_id % 2 == 0 {
            (Group::A, 0, 1)
        } else {
            (Group::B, 1, 0)
        };

        let pass = match gate.admit(group, &stop) {
            Ok(pass) => pass,
            Err(SyncError::Cancelled) => return stop.is_cancelled(),
            Err(_) => return false,
        };

        let members = inside[own].fetch_add(1, Ordering::SeqCst) + 1;
        let intruders = inside[other].load(Ordering::SeqCst);
        std::thread::yield_now();
        inside[own].fetch_sub(1, Ordering::SeqCst);
        drop(pass);

        if members > capacity || intruders > 0 {
            tracing::warn!(%group, members, intruders, "gate invariant broken");
            return false;
        }
        true
    })
}
