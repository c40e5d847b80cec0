//! StateStore — redb-backed state persistence for Skyscale.
//!
//! Provides typed operations over lease rows, policies, application
//! instance counts, and scaling history. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(LEASES).map_err(map_err!(Table))?;
        txn.open_table(POLICIES).map_err(map_err!(Table))?;
        txn.open_table(APPS).map_err(map_err!(Table))?;
        txn.open_table(SCALING_HISTORIES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Leases ─────────────────────────────────────────────────────

    /// Acquire or refresh the lease `lock_name` for `owner`.
    ///
    /// Succeeds when no row exists, when the row already belongs to
    /// `owner`, or when the current holder's lease has expired. On
    /// success the row is (re)written with the current timestamp.
    pub fn acquire_lease(&self, lock_name: &str, owner: &str, ttl: Duration) -> StateResult<bool> {
        self.acquire_lease_at(lock_name, owner, ttl, epoch_millis())
    }

    /// [`acquire_lease`](Self::acquire_lease) with an explicit clock reading.
    pub fn acquire_lease_at(
        &self,
        lock_name: &str,
        owner: &str,
        ttl: Duration,
        now_ms: u64,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let acquired;
        {
            let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            let existing: Option<Lease> = match table.get(lock_name).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };

            acquired = match &existing {
                None => true,
                Some(current) if current.owner == owner => true,
                Some(current) if !current.is_live_at(now_ms) => {
                    info!(
                        lock = %lock_name,
                        previous_owner = %current.owner,
                        new_owner = %owner,
                        "lease expired, taking over"
                    );
                    true
                }
                Some(current) => {
                    debug!(lock = %lock_name, holder = %current.owner, "lease still held");
                    false
                }
            };

            if acquired {
                let lease = Lease {
                    lock_name: lock_name.to_string(),
                    owner: owner.to_string(),
                    ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
                    acquired_at_ms: now_ms,
                };
                let value = serde_json::to_vec(&lease).map_err(map_err!(Serialize))?;
                table
                    .insert(lock_name, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(acquired)
    }

    /// Delete the lease row if it belongs to `owner`. Returns true if a
    /// row was removed.
    pub fn release_lease(&self, lock_name: &str, owner: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let released;
        {
            let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            let held_by_owner = match table.get(lock_name).map_err(map_err!(Read))? {
                Some(guard) => {
                    let lease: Lease =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    lease.owner == owner
                }
                None => false,
            };
            released = held_by_owner
                && table
                    .remove(lock_name)
                    .map_err(map_err!(Write))?
                    .is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(lock = %lock_name, %owner, released, "lease release");
        Ok(released)
    }

    /// Read the current lease row, live or expired.
    pub fn get_lease(&self, lock_name: &str) -> StateResult<Option<Lease>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LEASES).map_err(map_err!(Table))?;
        match table.get(lock_name).map_err(map_err!(Read))? {
            Some(guard) => {
                let lease: Lease =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(lease))
            }
            None => Ok(None),
        }
    }

    // ── Policies ───────────────────────────────────────────────────

    /// Insert or replace the policy of an application.
    pub fn put_policy(&self, app_id: &str, policy: &Policy) -> StateResult<()> {
        let value = serde_json::to_vec(policy).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            table
                .insert(app_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%app_id, "policy stored");
        Ok(())
    }

    /// Get the policy of an application.
    pub fn get_policy(&self, app_id: &str) -> StateResult<Option<Policy>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        match table.get(app_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let policy: Policy =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(policy))
            }
            None => Ok(None),
        }
    }

    /// Delete the policy of an application. Returns true if it existed.
    pub fn delete_policy(&self, app_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            existed = table.remove(app_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%app_id, existed, "policy deleted");
        Ok(existed)
    }

    // ── Apps ───────────────────────────────────────────────────────

    /// Insert or update the instance count of an application.
    pub fn put_app_instances(&self, app: &AppInstances) -> StateResult<()> {
        let value = serde_json::to_vec(app).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APPS).map_err(map_err!(Table))?;
            table
                .insert(app.app_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the instance count of an application.
    pub fn get_app_instances(&self, app_id: &str) -> StateResult<Option<AppInstances>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPS).map_err(map_err!(Table))?;
        match table.get(app_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let app: AppInstances =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(app))
            }
            None => Ok(None),
        }
    }

    // ── Scaling history ────────────────────────────────────────────

    /// Append a scaling history entry.
    pub fn save_scaling_history(&self, entry: &ScalingHistory) -> StateResult<()> {
        let key = entry.table_key();
        let value = serde_json::to_vec(entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SCALING_HISTORIES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, status = ?entry.status, "scaling history stored");
        Ok(())
    }

    /// List history entries of an application with `start <= timestamp`
    /// and, when `end` is set, `timestamp <= end`.
    pub fn list_scaling_histories(
        &self,
        app_id: &str,
        start: u64,
        end: Option<u64>,
        order: HistoryOrder,
    ) -> StateResult<Vec<ScalingHistory>> {
        let prefix = format!("{app_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCALING_HISTORIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let history: ScalingHistory =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            let in_range =
                history.timestamp >= start && end.is_none_or(|end| history.timestamp <= end);
            if history.app_id == app_id && in_range {
                results.push(history);
            }
        }
        if order == HistoryOrder::Desc {
            results.reverse();
        }
        Ok(results)
    }

    /// Delete every history entry older than `before` (nanoseconds).
    /// Returns number deleted.
    pub fn prune_scaling_histories(&self, before: u64) -> StateResult<u32> {
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(SCALING_HISTORIES).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let history: ScalingHistory =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if history.timestamp < before {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };
        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(SCALING_HISTORIES).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(before, count, "scaling histories pruned");
        Ok(count)
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
