//! Blocking counting semaphore.
//!
//! The permit count lives behind a mutex and waiters park on a condition
//! variable, so an empty semaphore never spins. Permits are plain counts with
//! no owner: any thread may [`Semaphore::release`], which is what the
//! turnstile barrier relies on to open its gates for other threads.

use core::fmt;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::cancel::{self, CancellationToken, DEFAULT_POLL_INTERVAL};
use crate::errors::SyncResult;

/// A counting semaphore that blocks the calling thread while no permits are
/// available.
///
/// ```
/// use foundation_sync::{CancellationToken, Semaphore};
///
/// let gate = Semaphore::new(0);
/// gate.release(2);
/// assert!(gate.acquire(&CancellationToken::never()).is_ok());
/// assert!(gate.try_acquire());
/// assert!(!gate.try_acquire());
/// ```
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
    poll: Duration,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits. Zero is allowed and is
    /// the usual starting point for a turnstile.
    #[must_use]
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
            poll: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how long a cancellable [`Semaphore::acquire`] parks between token
    /// checks.
    #[must_use]
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Takes one permit, blocking until one is released.
    ///
    /// An available permit is always taken even if `cancel` already fired.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Cancelled`] if `cancel` fires while no
    /// permit is available. No permit is consumed in that case.
    pub fn acquire(&self, cancel: &CancellationToken) -> SyncResult<()> {
        let mut permits = cancel::lock(&self.permits);
        loop {
            if *permits > 0 {
                *permits -= 1;
                return Ok(());
            }
            cancel.checkpoint()?;
            permits = cancel::park(&self.available, permits, cancel, self.poll);
        }
    }

    /// Takes one permit, blocking without any way to be interrupted.
    pub fn acquire_blocking(&self) {
        let never = CancellationToken::never();
        let mut permits = cancel::lock(&self.permits);
        while *permits == 0 {
            permits = cancel::park(&self.available, permits, &never, self.poll);
        }
        *permits -= 1;
    }

    /// Takes one permit if one is available right now.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        let mut permits = cancel::lock(&self.permits);
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    /// Adds `count` permits and wakes enough waiters to claim them.
    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }

        let mut permits = cancel::lock(&self.permits);
        *permits += count;
        drop(permits);

        if count == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }

    /// Takes every permit currently available without blocking, returning how
    /// many were removed.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while self.try_acquire() {
            drained += 1;
        }
        drained
    }

    #[inline]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        *cancel::lock(&self.permits)
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("permits", &self.available_permits())
            .finish_non_exhaustive()
    }
}
