//! Lock storage contract and its redb-backed implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use skyscale_state::StateStore;

use crate::error::LockResult;

/// Boxed future alias for lock store results.
pub type LockFuture<'a, T> = Pin<Box<dyn Future<Output = LockResult<T>> + Send + 'a>>;

/// Shared storage arbitrating a single named lease.
///
/// Implementations must make `acquire` atomic: when two owners race for an
/// absent or expired lease, at most one of them may see `Ok(true)`.
pub trait LockStore: Send + Sync {
    /// Acquire or refresh the lease for `owner`. Returns `false` when
    /// another owner holds a live lease.
    fn acquire<'a>(&'a self, owner: &'a str, ttl: Duration) -> LockFuture<'a, bool>;

    /// Delete the lease if `owner` holds it.
    fn release<'a>(&'a self, owner: &'a str) -> LockFuture<'a, ()>;
}

/// [`LockStore`] over one row of the state store's lease table.
#[derive(Clone)]
pub struct StateLockStore {
    state: StateStore,
    lock_name: String,
}

impl StateLockStore {
    pub fn new(state: StateStore, lock_name: impl Into<String>) -> Self {
        Self {
            state,
            lock_name: lock_name.into(),
        }
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }
}

impl LockStore for StateLockStore {
    fn acquire<'a>(&'a self, owner: &'a str, ttl: Duration) -> LockFuture<'a, bool> {
        Box::pin(async move { Ok(self.state.acquire_lease(&self.lock_name, owner, ttl)?) })
    }

    fn release<'a>(&'a self, owner: &'a str) -> LockFuture<'a, ()> {
        Box::pin(async move {
            self.state.release_lease(&self.lock_name, owner)?;
            Ok(())
        })
    }
}
