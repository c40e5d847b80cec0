//! redb table definitions for the Skyscale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Lease rows keyed by lock name. At most one row per name.
pub const LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("leases");

/// Scaling policies keyed by `{app_id}`.
pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");

/// Application instance counts keyed by `{app_id}`.
pub const APPS: TableDefinition<&str, &[u8]> = TableDefinition::new("apps");

/// Scaling history keyed by `{app_id}:{timestamp_ns:020}`.
pub const SCALING_HISTORIES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("scaling_histories");
