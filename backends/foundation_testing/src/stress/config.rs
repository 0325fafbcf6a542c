//! Stress run configuration.

use core::time::Duration;

/// How hard, and for how long, a stress run hammers a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    thread_count: usize,
    iterations: usize,
    /// Optional deadline after which workers are told to stop.
    duration: Option<Duration>,
    /// Cancellation polling slice handed to the primitives under test.
    poll_interval: Duration,
}

impl StressConfig {
    /// Creates a configuration with the defaults:
    ///
    /// - `thread_count`: 4
    /// - `iterations`: 1000
    /// - `duration`: None (no deadline)
    /// - `poll_interval`: 1ms
    #[must_use]
    pub const fn new() -> Self {
        Self {
            thread_count: 4,
            iterations: 1000,
            duration: None,
            poll_interval: Duration::from_millis(1),
        }
    }

    #[must_use]
    pub const fn threads(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    /// Sets the number of operations each worker performs.
    #[must_use]
    pub const fn iterations(mut self, count: usize) -> Self {
        self.iterations = count;
        self
    }

    /// Sets a deadline for the run.
    ///
    /// Once it passes, the harness cancels its stop token: workers stop
    /// picking up new iterations and blocked primitive calls give up.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets how often blocked primitives check the stop token.
    #[must_use]
    pub const fn poll_interval(mut self, poll: Duration) -> Self {
        self.poll_interval = poll;
        self
    }

    #[must_use]
    pub const fn get_thread_count(&self) -> usize {
        self.thread_count
    }

    #[must_use]
    pub const fn get_iterations(&self) -> usize {
        self.iterations
    }

    #[must_use]
    pub const fn get_duration(&self) -> Option<Duration> {
        self.duration
    }

    #[must_use]
    pub const fn get_poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self::new()
    }
}
