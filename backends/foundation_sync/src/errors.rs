use thiserror::Error;

/// Errors surfaced by the blocking primitives.
///
/// Normal outcomes such as a duplicate key or a missing entry are not errors
/// and are reported through `Option` instead.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Error)]
pub enum SyncError {
    /// The caller's [`crate::CancellationToken`] fired while it was blocked.
    #[error("the blocked call was cancelled before it completed")]
    Cancelled,

    #[error("a barrier needs at least one party, got {0}")]
    InvalidParties(usize),

    #[error("capacity must be at least one, got {0}")]
    InvalidCapacity(usize),
}

impl SyncError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type SyncResult<T> = core::result::Result<T, SyncError>;
