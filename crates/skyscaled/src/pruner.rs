//! Leader-gated scaling history retention.
//!
//! Only the replica holding the lease prunes. Lock transitions arrive as
//! [`LockEvent`]s; the pruner runs once on acquisition and then on every
//! tick while it remains leader.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use skyscale_lock::LockEvent;
use skyscale_state::{StateResult, StateStore};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct HistoryPruner {
    state: StateStore,
    cutoff: Duration,
    refresh_interval: Duration,
}

impl HistoryPruner {
    pub fn new(state: StateStore, cutoff: Duration, refresh_interval: Duration) -> Self {
        Self {
            state,
            cutoff,
            refresh_interval,
        }
    }

    /// Delete history older than the cutoff. Returns the number removed.
    pub fn prune_once(&self) -> StateResult<u32> {
        let before = epoch_nanos().saturating_sub(self.cutoff.as_nanos() as u64);
        self.state.prune_scaling_histories(before)
    }

    fn prune_and_log(&self) {
        match self.prune_once() {
            Ok(0) => debug!("no scaling history to prune"),
            Ok(count) => info!(count, "scaling history pruned"),
            Err(e) => warn!(error = %e, "failed to prune scaling history"),
        }
    }

    /// Run until shutdown, pruning only while leader.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<LockEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut leader = false;
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            cutoff_secs = self.cutoff.as_secs(),
            interval_secs = self.refresh_interval.as_secs(),
            "history pruner started"
        );

        loop {
            tokio::select! {
                Some(event) = events.recv() => match event {
                    LockEvent::Acquired => {
                        info!("lease acquired, history pruning active");
                        leader = true;
                        self.prune_and_log();
                    }
                    LockEvent::Lost => {
                        info!("lease lost, history pruning paused");
                        leader = false;
                    }
                },
                _ = ticker.tick() => {
                    if leader {
                        self.prune_and_log();
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("history pruner stopped");
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
    use skyscale_state::{HistoryOrder, ScalingHistory, ScalingStatus, ScalingType};

    const DAY: Duration = Duration::from_secs(86_400);

    fn entry(timestamp: u64) -> ScalingHistory {
        ScalingHistory {
            app_id: "app".to_string(),
            timestamp,
            scaling_type: ScalingType::Dynamic,
            status: ScalingStatus::Succeeded,
            old_instances: Some(1),
            new_instances: Some(2),
            reason: "+1 instance(s) because cpu > 80% for 60 seconds".to_string(),
            message: None,
            error: None,
        }
    }

    fn seeded_store() -> StateStore {
        let state = StateStore::open_in_memory().unwrap();
        let now = epoch_nanos();
        state.save_scaling_history(&entry(1)).unwrap();
        state
            .save_scaling_history(&entry(now - 2 * DAY.as_nanos() as u64))
            .unwrap();
        state.save_scaling_history(&entry(now)).unwrap();
        state
    }

    fn remaining(state: &StateStore) -> usize {
        state
            .list_scaling_histories("app", 0, None, HistoryOrder::Asc)
            .unwrap()
            .len()
    }

    #[test]
    fn prune_once_respects_cutoff() {
        let state = seeded_store();
        let pruner = HistoryPruner::new(state.clone(), DAY, Duration::from_secs(3600));
        assert_eq!(pruner.prune_once().unwrap(), 2);
        assert_eq!(remaining(&state), 1);
    }

    #[tokio::test]
    async fn prunes_only_after_acquired() {
        let state = seeded_store();
        let pruner = HistoryPruner::new(state.clone(), DAY, Duration::from_millis(10));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(pruner.run(events_rx, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remaining(&state), 3);

        events_tx.send(LockEvent::Acquired).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remaining(&state), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stops_pruning_after_lost() {
        let state = StateStore::open_in_memory().unwrap();
        let pruner = HistoryPruner::new(state.clone(), DAY, Duration::from_millis(10));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(pruner.run(events_rx, shutdown_rx));

        events_tx.send(LockEvent::Acquired).unwrap();
        events_tx.send(LockEvent::Lost).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        state.save_scaling_history(&entry(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remaining(&state), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
