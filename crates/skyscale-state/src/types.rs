//! Domain types for the Skyscale state store.
//!
//! These types represent the persisted state of lease rows, scaling
//! policies, application instance counts, and scaling history. All types
//! are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Unique identifier for a tenant application.
pub type AppId = String;

// ── Lease ─────────────────────────────────────────────────────────

/// Time-bounded ownership record for a named lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lease {
    pub lock_name: String,
    pub owner: String,
    /// Lease lifetime in milliseconds.
    pub ttl_ms: u64,
    /// Unix timestamp (milliseconds) of the last acquire or refresh.
    pub acquired_at_ms: u64,
}

impl Lease {
    /// Unix timestamp (milliseconds) at which the lease stops being live.
    pub fn expires_at_ms(&self) -> u64 {
        self.acquired_at_ms.saturating_add(self.ttl_ms)
    }

    /// Whether the lease is still live at `now_ms`.
    pub fn is_live_at(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms()
    }
}

// ── Policy ────────────────────────────────────────────────────────

/// Scaling policy attached to an application.
///
/// `instance_min <= instance_max` is established by the policy validator
/// that writes policies; readers do not re-check it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub instance_min: u32,
    pub instance_max: u32,
    #[serde(default)]
    pub scaling_rules: Vec<ScalingRule>,
}

/// A threshold rule that produces triggers upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingRule {
    pub metric_type: String,
    pub breach_duration_secs: u64,
    pub cool_down_secs: u64,
    pub threshold: i64,
    /// Comparison operator: "<", "<=", ">", ">=".
    pub operator: String,
    /// Step ("+1") or percentage ("-50%") adjustment.
    pub adjustment: String,
}

// ── App instances ─────────────────────────────────────────────────

/// Instance count of an application on the compute platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInstances {
    pub app_id: AppId,
    pub instances: u32,
    /// Unix timestamp (seconds) of the last change.
    pub updated_at: u64,
}

// ── Scaling history ───────────────────────────────────────────────

/// What started a scaling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingType {
    /// Threshold-triggered.
    Dynamic,
}

/// Outcome of a scaling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingStatus {
    Succeeded,
    Failed,
    Ignored,
}

/// One recorded scaling decision for an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingHistory {
    pub app_id: AppId,
    /// Unix timestamp (nanoseconds) when the decision started.
    pub timestamp: u64,
    pub scaling_type: ScalingType,
    pub status: ScalingStatus,
    /// Instance count before the action, if it was read.
    pub old_instances: Option<u32>,
    /// Instance count after the action, if one was computed.
    pub new_instances: Option<u32>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScalingHistory {
    /// Build the composite key for the scaling history table.
    pub fn table_key(&self) -> String {
        history_key(&self.app_id, self.timestamp)
    }
}

/// Sort order for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryOrder {
    Asc,
    #[default]
    Desc,
}

/// Composite history key. Timestamps are zero-padded so that byte order
/// matches chronological order.
pub(crate) fn history_key(app_id: &str, timestamp: u64) -> String {
    format!("{app_id}:{timestamp:020}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_liveness_boundary() {
        let lease = Lease {
            lock_name: "lock".to_string(),
            owner: "a".to_string(),
            ttl_ms: 1_000,
            acquired_at_ms: 5_000,
        };
        assert!(lease.is_live_at(5_999));
        assert!(!lease.is_live_at(6_000));
        assert_eq!(lease.expires_at_ms(), 6_000);
    }

    #[test]
    fn lease_expiry_saturates() {
        let lease = Lease {
            lock_name: "lock".to_string(),
            owner: "a".to_string(),
            ttl_ms: u64::MAX,
            acquired_at_ms: 10,
        };
        assert_eq!(lease.expires_at_ms(), u64::MAX);
    }

    #[test]
    fn history_keys_sort_chronologically() {
        assert!(history_key("app", 9) < history_key("app", 10));
        assert!(history_key("app", 999) < history_key("app", 1_000_000));
    }

    #[test]
    fn history_omits_empty_message_and_error() {
        let entry = ScalingHistory {
            app_id: "app".to_string(),
            timestamp: 1,
            scaling_type: ScalingType::Dynamic,
            status: ScalingStatus::Ignored,
            old_instances: Some(2),
            new_instances: Some(2),
            reason: "+1 instance(s) because cpu > 80% for 60 seconds".to_string(),
            message: None,
            error: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "ignored");
        assert!(json.get("message").is_none());
        assert!(json.get("error").is_none());
    }
}
