//! skyscale-state — embedded state store for Skyscale.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for lease rows, scaling policies, application instance counts,
//! and scaling history.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Lease rows are keyed by lock name; history rows use the composite key
//! `{app_id}:{timestamp_ns}` (zero-padded) so prefix scans come back in
//! chronological order.
//!
//! Lease acquisition runs inside a single redb write transaction. redb
//! admits one writer at a time, which makes acquire-if-absent-or-expired
//! atomic across every task sharing the database.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
