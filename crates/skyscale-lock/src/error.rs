//! Error types for the lease lock.

use thiserror::Error;

use skyscale_state::StateError;

/// Result type alias for lock store operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors reported by a [`LockStore`](crate::LockStore).
///
/// All of them are transient from the lock loop's point of view: they are
/// logged and retried on the next tick.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock storage error: {0}")]
    Storage(String),
}

impl From<StateError> for LockError {
    fn from(err: StateError) -> Self {
        LockError::Storage(err.to_string())
    }
}
