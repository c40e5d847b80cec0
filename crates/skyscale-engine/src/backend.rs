//! Collaborators consumed by the scaling engine.
//!
//! Each trait returns a boxed `Send` future so implementations can be held
//! as `Arc<dyn _>` and shared across request tasks. [`StateStore`] implements
//! all three, acting as a local compute platform for standalone use.

use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use skyscale_state::{AppInstances, Policy, ScalingHistory, StateStore};

/// Boxed future returned by collaborator calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Source of application scaling policies.
pub trait PolicySource: Send + Sync {
    /// `Ok(None)` when the application has no policy.
    fn get_policy<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Option<Policy>>;
}

/// The platform that runs application instances.
pub trait ComputeClient: Send + Sync {
    fn get_instances<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, u32>;
    fn set_instances<'a>(&'a self, app_id: &'a str, instances: u32) -> BoxFuture<'a, ()>;
}

/// Sink for scaling history entries.
pub trait HistoryRecorder: Send + Sync {
    fn save_history<'a>(&'a self, entry: &'a ScalingHistory) -> BoxFuture<'a, ()>;
}

impl PolicySource for StateStore {
    fn get_policy<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Option<Policy>> {
        Box::pin(async move {
            self.get_policy(app_id)
                .with_context(|| format!("failed to read policy of app {app_id}"))
        })
    }
}

impl ComputeClient for StateStore {
    fn get_instances<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, u32> {
        Box::pin(async move {
            let app = self
                .get_app_instances(app_id)
                .with_context(|| format!("failed to read app {app_id}"))?
                .with_context(|| format!("app {app_id} not found"))?;
            Ok(app.instances)
        })
    }

    fn set_instances<'a>(&'a self, app_id: &'a str, instances: u32) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let app = AppInstances {
                app_id: app_id.to_string(),
                instances,
                updated_at: epoch_secs(),
            };
            self.put_app_instances(&app)
                .with_context(|| format!("failed to update app {app_id}"))
        })
    }
}

impl HistoryRecorder for StateStore {
    fn save_history<'a>(&'a self, entry: &'a ScalingHistory) -> BoxFuture<'a, ()> {
        Box::pin(async move { Ok(self.save_scaling_history(entry)?) })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_store_serves_as_compute_platform() {
        let store = StateStore::open_in_memory().unwrap();
        let err = ComputeClient::get_instances(&store, "app").await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        store.set_instances("app", 4).await.unwrap();
        assert_eq!(store.get_instances("app").await.unwrap(), 4);
        assert_eq!(store.get_app_instances("app").unwrap().unwrap().instances, 4);
    }

    #[tokio::test]
    async fn state_store_serves_policies() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(PolicySource::get_policy(&store, "app").await.unwrap().is_none());

        let policy = Policy {
            instance_min: 1,
            instance_max: 5,
            scaling_rules: Vec::new(),
        };
        store.put_policy("app", &policy).unwrap();
        assert_eq!(
            PolicySource::get_policy(&store, "app").await.unwrap(),
            Some(policy)
        );
    }
}
