//! Stress test framework for `foundation_sync` primitives.
//!
//! Provides configurable high-contention testing with:
//! - Thread count control
//! - Iteration limits
//! - A deadline that cancels blocked primitive calls
//! - Success and failure tracking

use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use foundation_sync::CancellationToken;

pub mod config;
pub mod sync;

pub use config::StressConfig;

/// Tally of one [`StressHarness::run`], plus any failures a scenario found
/// when checking shared state after the workers joined.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Operation calls that returned `true`; scenarios count a call released by the stop token here
    pub successes: usize,
    /// Calls that returned `false`, plus late failures added with [`Self::with_failures`]
    pub failures: usize,
    /// Wall time from spawning the workers until the last one joined
    pub duration: Duration,
    /// Workers spawned for the run
    pub thread_count: usize,
}

impl StressResult {
    #[must_use]
    pub const fn new(
        successes: usize,
        failures: usize,
        duration: Duration,
        thread_count: usize,
    ) -> Self {
        Self {
            successes,
            failures,
            duration,
            thread_count,
        }
    }

    #[must_use]
    pub const fn total_operations(&self) -> usize {
        self.successes + self.failures
    }

    /// Returns the success rate as a value between 0.0 and 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_operations() == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_operations() as f64
        }
    }

    /// Returns operations per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn operations_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.total_operations() as f64 / secs
        }
    }

    /// Counts `count` extra failures found after the workers finished.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::time::Duration;
    /// use foundation_testing::stress::StressResult;
    ///
    /// let result = StressResult::new(10, 0, Duration::from_millis(5), 2).with_failures(1);
    /// assert_eq!(result.failures, 1);
    /// assert_eq!(result.total_operations(), 11);
    /// ```
    #[must_use]
    pub const fn with_failures(mut self, count: usize) -> Self {
        self.failures += count;
        self
    }
}

/// Base stress test harness.
///
/// Spawns multiple threads that execute a closure repeatedly until every
/// iteration ran or the configured deadline passed.
pub struct StressHarness {
    config: StressConfig,
    stop: CancellationToken,
}

impl StressHarness {
    #[must_use]
    pub fn new(config: StressConfig) -> Self {
        Self {
            config,
            stop: CancellationToken::new(),
        }
    }

    /// Token cancelled when the deadline passes.
    ///
    /// Scenarios pass it to blocking primitive calls so a worker parked on a
    /// primitive is released when the run is over.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    #[must_use]
    pub const fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Runs a stress test with the given operation closure.
    ///
    /// The closure receives:
    /// - `thread_id`: Index of the thread (`0..thread_count`)
    /// - `iteration`: Iteration number for this thread
    ///
    /// Returns `true` on success, `false` on failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use foundation_testing::stress::{StressConfig, StressHarness};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// let config = StressConfig::new().threads(4).iterations(100);
    /// let harness = StressHarness::new(config);
    ///
    /// let counter_clone = Arc::clone(&counter);
    /// let result = harness.run(move |_thread_id, _iteration| {
    ///     counter_clone.fetch_add(1, Ordering::Relaxed);
    ///     true
    /// });
    ///
    /// assert_eq!(counter.load(Ordering::Relaxed), 400); // 4 threads * 100 iterations
    /// assert_eq!(result.successes, 400);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if any worker thread panics during the stress test execution.
    pub fn run<F>(self, operation: F) -> StressResult
    where
        F: Fn(usize, usize) -> bool + Send + Sync + 'static,
    {
        let start = std::time::Instant::now();
        let operation = Arc::new(operation);
        let thread_count = self.config.get_thread_count();

        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        if let Some(duration) = self.config.get_duration() {
            let stop = self.stop.clone();
            thread::spawn(move || {
                thread::sleep(duration);
                if stop.cancel() {
                    tracing::debug!(?duration, "stress deadline reached");
                }
            });
        }

        let mut handles = Vec::with_capacity(thread_count);
        for thread_id in 0..thread_count {
            let operation = Arc::clone(&operation);
            let successes = Arc::clone(&successes);
            let failures = Arc::clone(&failures);
            let stop = self.stop.clone();
            let iterations = self.config.get_iterations();

            handles.push(thread::spawn(move || {
                for iteration in 0..iterations {
                    if stop.is_cancelled() {
                        break;
                    }

                    if operation(thread_id, iteration) {
                        successes.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked during stress test");
        }

        let result = StressResult::new(
            successes.load(Ordering::Relaxed),
            failures.load(Ordering::Relaxed),
            start.elapsed(),
            thread_count,
        );
        tracing::debug!(
            successes = result.successes,
            failures = result.failures,
            threads = thread_count,
            "stress run finished"
        );
        result
    }
}
