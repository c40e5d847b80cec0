//! ScalingEngine — turns one trigger into at most one instance count change.
//!
//! Every call fetches fresh state from its collaborators: policy first,
//! then the current instance count. Nothing is cached between calls and
//! nothing is retried; the caller owns redelivery.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use skyscale_state::{AppId, ScalingHistory, ScalingStatus, ScalingType, StateStore};

use crate::adjustment::{clamp_instances, Adjustment, AdjustmentError};
use crate::backend::{ComputeClient, HistoryRecorder, PolicySource};
use crate::trigger::Trigger;

/// Outcome of a successful `scale` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingDecision {
    pub current_instances: u32,
    pub computed_instances: u32,
    /// Whether the compute platform was asked to change the count.
    pub applied: bool,
}

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("policy unavailable for app {app_id}: {detail}")]
    PolicyUnavailable { app_id: AppId, detail: String },

    #[error("failed to read instances of app {app_id}: {detail}")]
    ComputeUnavailable { app_id: AppId, detail: String },

    #[error(transparent)]
    InvalidAdjustment(#[from] AdjustmentError),

    #[error("failed to set instances of app {app_id} to {instances}: {detail}")]
    ComputeUpdateFailed {
        app_id: AppId,
        instances: u32,
        detail: String,
    },
}

/// Policy-bounded scaling against a compute platform.
#[derive(Clone)]
pub struct ScalingEngine {
    policies: Arc<dyn PolicySource>,
    compute: Arc<dyn ComputeClient>,
    history: Arc<dyn HistoryRecorder>,
}

impl ScalingEngine {
    pub fn new(
        policies: Arc<dyn PolicySource>,
        compute: Arc<dyn ComputeClient>,
        history: Arc<dyn HistoryRecorder>,
    ) -> Self {
        Self {
            policies,
            compute,
            history,
        }
    }

    /// Engine whose collaborators are all backed by one state store.
    pub fn from_state(state: StateStore) -> Self {
        let state = Arc::new(state);
        Self::new(state.clone(), state.clone(), state)
    }

    /// Apply `trigger` to `app_id` and record the outcome in history.
    pub async fn scale(
        &self,
        app_id: &str,
        trigger: &Trigger,
    ) -> Result<ScalingDecision, ScaleError> {
        let mut history = ScalingHistory {
            app_id: app_id.to_string(),
            timestamp: epoch_nanos(),
            scaling_type: ScalingType::Dynamic,
            status: ScalingStatus::Failed,
            old_instances: None,
            new_instances: None,
            reason: trigger.reason(),
            message: None,
            error: None,
        };

        let result = self.decide_and_apply(app_id, trigger, &mut history).await;
        if let Err(e) = self.history.save_history(&history).await {
            warn!(%app_id, error = %e, "failed to save scaling history");
        }
        result
    }

    async fn decide_and_apply(
        &self,
        app_id: &str,
        trigger: &Trigger,
        history: &mut ScalingHistory,
    ) -> Result<ScalingDecision, ScaleError> {
        let policy = match self.policies.get_policy(app_id).await {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                warn!(%app_id, "app does not have a scaling policy");
                history.error = Some("app does not have policy set".to_string());
                return Err(ScaleError::PolicyUnavailable {
                    app_id: app_id.to_string(),
                    detail: "no policy set".to_string(),
                });
            }
            Err(e) => {
                error!(%app_id, error = %format!("{e:#}"), "failed to get scaling policy");
                history.error = Some("failed to get scaling policy".to_string());
                return Err(ScaleError::PolicyUnavailable {
                    app_id: app_id.to_string(),
                    detail: format!("{e:#}"),
                });
            }
        };

        let current = match self.compute.get_instances(app_id).await {
            Ok(n) => n,
            Err(e) => {
                error!(%app_id, error = %format!("{e:#}"), "failed to get app instances");
                history.error = Some("failed to get app instances".to_string());
                return Err(ScaleError::ComputeUnavailable {
                    app_id: app_id.to_string(),
                    detail: format!("{e:#}"),
                });
            }
        };
        history.old_instances = Some(current);

        let adjustment: Adjustment = match trigger.adjustment.parse() {
            Ok(adjustment) => adjustment,
            Err(e) => {
                error!(
                    %app_id,
                    adjustment = %trigger.adjustment,
                    error = %e,
                    "failed to compute new app instances"
                );
                history.error = Some("failed to compute new app instances".to_string());
                return Err(e.into());
            }
        };
        let (computed, limit) = clamp_instances(
            adjustment.apply(current),
            policy.instance_min,
            policy.instance_max,
        );
        history.new_instances = Some(computed);
        history.message = limit.map(|l| l.to_string());

        let mut decision = ScalingDecision {
            current_instances: current,
            computed_instances: computed,
            applied: false,
        };

        if computed == current {
            debug!(%app_id, instances = current, "instance count unchanged");
            history.status = ScalingStatus::Ignored;
            return Ok(decision);
        }

        if let Err(e) = self.compute.set_instances(app_id, computed).await {
            error!(
                %app_id,
                instances = computed,
                error = %format!("{e:#}"),
                "failed to set app instances"
            );
            history.error = Some("failed to set app instances".to_string());
            return Err(ScaleError::ComputeUpdateFailed {
                app_id: app_id.to_string(),
                instances: computed,
                detail: format!("{e:#}"),
            });
        }

        info!(%app_id, from = current, to = computed, %adjustment, "app scaled");
        history.status = ScalingStatus::Succeeded;
        decision.applied = true;
        Ok(decision)
    }
}

fn epoch_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use skyscale_state::{HistoryOrder, Policy};

    use crate::backend::BoxFuture;

    enum PolicyReply {
        Found(Policy),
        Missing,
        Fail,
    }

    struct MockPolicies(PolicyReply);

    impl PolicySource for MockPolicies {
        fn get_policy<'a>(&'a self, _app_id: &'a str) -> BoxFuture<'a, Option<Policy>> {
            let reply = match &self.0 {
                PolicyReply::Found(p) => Ok(Some(p.clone())),
                PolicyReply::Missing => Ok(None),
                PolicyReply::Fail => Err(anyhow!("policy db unreachable")),
            };
            Box::pin(async move { reply })
        }
    }

    struct MockCompute {
        current: Option<u32>,
        fail_set: bool,
        gets: AtomicUsize,
        sets: Mutex<Vec<u32>>,
    }

    impl MockCompute {
        fn new(current: u32) -> Self {
            Self {
                current: Some(current),
                fail_set: false,
                gets: AtomicUsize::new(0),
                sets: Mutex::new(Vec::new()),
            }
        }

        fn sets(&self) -> Vec<u32> {
            self.sets.lock().unwrap().clone()
        }
    }

    impl ComputeClient for MockCompute {
        fn get_instances<'a>(&'a self, _app_id: &'a str) -> BoxFuture<'a, u32> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let reply = self.current.ok_or_else(|| anyhow!("platform unreachable"));
            Box::pin(async move { reply })
        }

        fn set_instances<'a>(&'a self, _app_id: &'a str, instances: u32) -> BoxFuture<'a, ()> {
            self.sets.lock().unwrap().push(instances);
            let fail = self.fail_set;
            Box::pin(async move {
                if fail {
                    Err(anyhow!("platform rejected update"))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[derive(Default)]
    struct MockHistory {
        entries: Mutex<Vec<ScalingHistory>>,
        fail: bool,
    }

    impl MockHistory {
        fn last(&self) -> ScalingHistory {
            self.entries.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl HistoryRecorder for MockHistory {
        fn save_history<'a>(&'a self, entry: &'a ScalingHistory) -> BoxFuture<'a, ()> {
            self.entries.lock().unwrap().push(entry.clone());
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(anyhow!("history db full"))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn policy(min: u32, max: u32) -> Policy {
        Policy {
            instance_min: min,
            instance_max: max,
            scaling_rules: Vec::new(),
        }
    }

    fn trigger(adjustment: &str) -> Trigger {
        Trigger {
            app_id: "app".to_string(),
            metric_type: "cpu".to_string(),
            metric_unit: "%".to_string(),
            breach_duration_secs: 60,
            cool_down_secs: 300,
            threshold: 80,
            operator: ">".to_string(),
            adjustment: adjustment.to_string(),
        }
    }

    fn engine(
        policies: PolicyReply,
        compute: Arc<MockCompute>,
        history: Arc<MockHistory>,
    ) -> ScalingEngine {
        ScalingEngine::new(Arc::new(MockPolicies(policies)), compute, history)
    }

    #[tokio::test]
    async fn scales_within_bounds() {
        let compute = Arc::new(MockCompute::new(3));
        let history = Arc::new(MockHistory::default());
        let engine = engine(PolicyReply::Found(policy(1, 6)), compute.clone(), history.clone());

        let decision = engine.scale("app", &trigger("+1")).await.unwrap();
        assert_eq!(
            decision,
            ScalingDecision {
                current_instances: 3,
                computed_instances: 4,
                applied: true,
            }
        );
        assert_eq!(compute.sets(), vec![4]);

        let entry = history.last();
        assert_eq!(entry.status, ScalingStatus::Succeeded);
        assert_eq!(entry.old_instances, Some(3));
        assert_eq!(entry.new_instances, Some(4));
        assert_eq!(entry.reason, "+1 instance(s) because cpu > 80% for 60 seconds");
        assert!(entry.message.is_none());
        assert!(entry.error.is_none());
    }

    #[tokio::test]
    async fn clamped_result_is_noted_in_history() {
        let compute = Arc::new(MockCompute::new(3));
        let history = Arc::new(MockHistory::default());
        let engine = engine(PolicyReply::Found(policy(1, 6)), compute.clone(), history.clone());

        let decision = engine.scale("app", &trigger("5")).await.unwrap();
        assert_eq!(decision.computed_instances, 6);
        assert_eq!(
            history.last().message.as_deref(),
            Some("limited by max instances 6")
        );

        let decision = engine.scale("app", &trigger("-90%")).await.unwrap();
        assert_eq!(decision.computed_instances, 1);
        assert_eq!(
            history.last().message.as_deref(),
            Some("limited by min instances 1")
        );
    }

    #[tokio::test]
    async fn policy_error_never_touches_compute() {
        let compute = Arc::new(MockCompute::new(3));
        let history = Arc::new(MockHistory::default());
        let engine = engine(PolicyReply::Fail, compute.clone(), history.clone());

        let err = engine.scale("app", &trigger("+1")).await.unwrap_err();
        assert!(matches!(err, ScaleError::PolicyUnavailable { .. }));
        assert_eq!(compute.gets.load(Ordering::SeqCst), 0);
        assert!(compute.sets().is_empty());

        let entry = history.last();
        assert_eq!(entry.status, ScalingStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("failed to get scaling policy"));
        assert_eq!(entry.old_instances, None);
    }

    #[tokio::test]
    async fn missing_policy_is_unavailable() {
        let compute = Arc::new(MockCompute::new(3));
        let history = Arc::new(MockHistory::default());
        let engine = engine(PolicyReply::Missing, compute.clone(), history.clone());

        let err = engine.scale("app", &trigger("+1")).await.unwrap_err();
        assert!(matches!(err, ScaleError::PolicyUnavailable { .. }));
        assert!(compute.sets().is_empty());
        assert_eq!(
            history.last().error.as_deref(),
            Some("app does not have policy set")
        );
    }

    #[tokio::test]
    async fn unchanged_count_is_a_no_op() {
        let compute = Arc::new(MockCompute::new(6));
        let history = Arc::new(MockHistory::default());
        let engine = engine(PolicyReply::Found(policy(1, 6)), compute.clone(), history.clone());

        let decision = engine.scale("app", &trigger("+2")).await.unwrap();
        assert_eq!(decision.computed_instances, 6);
        assert!(!decision.applied);
        assert!(compute.sets().is_empty());

        let entry = history.last();
        assert_eq!(entry.status, ScalingStatus::Ignored);
        assert_eq!(entry.new_instances, Some(6));
    }

    #[tokio::test]
    async fn compute_read_failure() {
        let compute = Arc::new(MockCompute {
            current: None,
            ..MockCompute::new(0)
        });
        let history = Arc::new(MockHistory::default());
        let engine = engine(PolicyReply::Found(policy(1, 6)), compute.clone(), history.clone());

        let err = engine.scale("app", &trigger("+1")).await.unwrap_err();
        assert!(matches!(err, ScaleError::ComputeUnavailable { .. }));
        assert!(compute.sets().is_empty());
        assert_eq!(
            history.last().error.as_deref(),
            Some("failed to get app instances")
        );
    }

    #[tokio::test]
    async fn invalid_adjustment_aborts_before_update() {
        let compute = Arc::new(MockCompute::new(3));
        let history = Arc::new(MockHistory::default());
        let engine = engine(PolicyReply::Found(policy(1, 6)), compute.clone(), history.clone());

        let err = engine.scale("app", &trigger("10.5a%")).await.unwrap_err();
        assert!(matches!(err, ScaleError::InvalidAdjustment(_)));
        assert!(compute.sets().is_empty());

        let entry = history.last();
        assert_eq!(entry.old_instances, Some(3));
        assert_eq!(
            entry.error.as_deref(),
            Some("failed to compute new app instances")
        );
    }

    #[tokio::test]
    async fn update_failure_is_not_retried() {
        let compute = Arc::new(MockCompute {
            fail_set: true,
            ..MockCompute::new(3)
        });
        let history = Arc::new(MockHistory::default());
        let engine = engine(PolicyReply::Found(policy(1, 6)), compute.clone(), history.clone());

        let err = engine.scale("app", &trigger("+1")).await.unwrap_err();
        assert!(matches!(
            err,
            ScaleError::ComputeUpdateFailed { instances: 4, .. }
        ));
        assert_eq!(compute.sets(), vec![4]);
        assert_eq!(
            history.last().error.as_deref(),
            Some("failed to set app instances")
        );
    }

    #[tokio::test]
    async fn history_failure_does_not_fail_scaling() {
        let compute = Arc::new(MockCompute::new(3));
        let history = Arc::new(MockHistory {
            fail: true,
            ..MockHistory::default()
        });
        let engine = engine(PolicyReply::Found(policy(1, 6)), compute.clone(), history);

        let decision = engine.scale("app", &trigger("+1")).await.unwrap();
        assert!(decision.applied);
    }

    #[tokio::test]
    async fn state_backed_engine_end_to_end() {
        let state = StateStore::open_in_memory().unwrap();
        state.put_policy("app", &policy(2, 10)).unwrap();
        ComputeClient::set_instances(&state, "app", 4).await.unwrap();

        let engine = ScalingEngine::from_state(state.clone());
        let decision = engine.scale("app", &trigger("+50%")).await.unwrap();
        assert_eq!(decision.computed_instances, 6);
        assert_eq!(state.get_app_instances("app").unwrap().unwrap().instances, 6);

        let histories = state
            .list_scaling_histories("app", 0, None, HistoryOrder::Desc)
            .unwrap();
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].status, ScalingStatus::Succeeded);
    }
}
