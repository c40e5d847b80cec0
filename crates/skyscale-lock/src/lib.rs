//! skyscale-lock — lease-based election of a single active replica.
//!
//! Every replica runs a [`LeaseLock`] against the same [`LockStore`]. The
//! lock polls the store on a fixed interval, refreshing its lease while it
//! holds it and trying to take it over once the holder's TTL lapses.
//!
//! # Lock Loop
//!
//! ```text
//! start:   attempt acquire            → Held + on_acquired | stay Lost
//!          signal ready
//! tick:    acquire ok,   was Lost     → Held, on_acquired
//!          acquire ok,   was Held     → (refresh)
//!          acquire no,   was Held     → Lost, on_lost
//!          storage error              → release, Lost, on_lost if was Held
//! cancel:  release                    → Lost, exit
//! ```
//!
//! Callbacks run on the lock's own task and strictly alternate. The
//! current [`LockStatus`] is published through a `watch` channel so other
//! tasks read a snapshot instead of sharing a mutable flag.
//!
//! The store holds one row per lock name and never pushes changes; every
//! replica learns about expiry by polling. A replica that cannot reach the
//! store drops to `Lost` and must stop acting as leader.

pub mod error;
pub mod lease;
pub mod listener;
pub mod store;

pub use error::{LockError, LockResult};
pub use lease::{run_lock, LeaseLock, LockConfig, LockHandle, LockObserver, LockStatus};
pub use listener::{Callbacks, LockEvent, LockListener};
pub use store::{LockFuture, LockStore, StateLockStore};
