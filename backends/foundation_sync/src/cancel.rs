//! Cooperative cancellation for blocked callers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::errors::{SyncError, SyncResult};

/// Indicates the token has been cancelled.
const SET: usize = 1;

/// Indicates the token is still live.
const UNSET: usize = 0;

/// Default slice a cancellable waiter parks for before re-checking its token.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// `CancellationToken` lets one thread interrupt another thread blocked in
/// any of the primitives in this crate.
///
/// Clones share the same underlying signal. A token made with
/// [`CancellationToken::never`] can not be cancelled and lets waiters park
/// without a timeout.
///
/// ```
/// use foundation_sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
/// assert!(!observer.is_cancelled());
///
/// token.cancel();
/// assert!(observer.is_cancelled());
/// assert!(observer.checkpoint().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Option<Arc<AtomicUsize>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Some(Arc::new(AtomicUsize::new(UNSET))),
        }
    }

    /// A token that is never cancelled.
    #[must_use]
    pub const fn never() -> Self {
        Self { state: None }
    }

    /// `cancel` flips the token from UNSET to SET.
    ///
    /// Returns `true` only for the call that performed the flip.
    #[inline]
    pub fn cancel(&self) -> bool {
        match &self.state {
            Some(state) => state
                .compare_exchange(UNSET, SET, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok(),
            None => false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.load(Ordering::Acquire) == SET)
    }

    /// Returns false for tokens made with [`CancellationToken::never`].
    #[inline]
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        self.state.is_some()
    }

    /// Returns `Err(SyncError::Cancelled)` once the token fired.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::Cancelled`] when [`CancellationToken::cancel`]
    /// was called on this token or any of its clones.
    #[inline]
    pub fn checkpoint(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// No critical section in this crate can leave its state half-written, so a
/// poisoned guard is still consistent.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parks on `condvar` once.
///
/// Cancellable tokens park for at most `poll` so the caller's wait loop gets
/// to re-check the token. Callers must re-evaluate their predicate after
/// every return, the wake may be spurious.
#[inline]
pub(crate) fn park<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    cancel: &CancellationToken,
    poll: Duration,
) -> MutexGuard<'a, T> {
    if cancel.is_cancellable() {
        match condvar.wait_timeout(guard, poll) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    } else {
        condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}
