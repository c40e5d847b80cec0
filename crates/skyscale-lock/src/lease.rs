//! LeaseLock — the polling loop that maintains lock ownership.
//!
//! The loop owns the local [`LockStatus`]; nothing else mutates it. Other
//! tasks observe it through a [`LockObserver`], and transitions are
//! delivered to a [`LockListener`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::listener::LockListener;
use crate::store::LockStore;

/// Local belief about lock ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Held,
    Lost,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Held => "held",
            LockStatus::Lost => "lost",
        }
    }
}

/// Parameters of one lease lock participant.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Identity written into the lease row. Empty means this replica
    /// never competes.
    pub owner: String,
    /// Lease lifetime written on every acquire or refresh.
    pub ttl: Duration,
    /// Delay between acquire/refresh attempts.
    pub retry_interval: Duration,
}

/// Read-only view of a running lock.
#[derive(Debug, Clone)]
pub struct LockObserver {
    status: watch::Receiver<LockStatus>,
    ready: watch::Receiver<bool>,
}

impl LockObserver {
    /// Current status snapshot.
    pub fn status(&self) -> LockStatus {
        *self.status.borrow()
    }

    pub fn is_held(&self) -> bool {
        self.status() == LockStatus::Held
    }

    /// Wait until the first acquisition attempt has completed.
    pub async fn ready(&mut self) {
        let _ = self.ready.wait_for(|ready| *ready).await;
    }

    /// Wait until the status equals `status`. Returns immediately if it
    /// already does.
    pub async fn wait_for(&mut self, status: LockStatus) {
        let _ = self.status.wait_for(|current| *current == status).await;
    }

    /// Wait for the next status change. `None` once the lock has exited.
    pub async fn changed(&mut self) -> Option<LockStatus> {
        self.status.changed().await.ok()?;
        Some(*self.status.borrow_and_update())
    }
}

/// Handle to a lock running on its own task.
///
/// Dropping the handle also stops the lock, since the loop treats a closed
/// shutdown channel as cancellation.
pub struct LockHandle {
    observer: LockObserver,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LockHandle {
    pub fn observer(&self) -> LockObserver {
        self.observer.clone()
    }

    pub fn status(&self) -> LockStatus {
        self.observer.status()
    }

    /// Wait until the first acquisition attempt has completed.
    pub async fn ready(&mut self) {
        self.observer.ready().await;
    }

    /// Stop the loop, releasing the lease, and wait for it to exit.
    pub async fn cancel(self) {
        self.shutdown_tx.send_replace(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "lease lock task ended abnormally");
        }
    }

    /// Stop the loop without releasing the lease. The row stays until its
    /// TTL lapses, exactly as if the process had crashed.
    pub fn abort(self) {
        self.task.abort();
    }
}

/// A single participant in a lease election.
pub struct LeaseLock<L> {
    config: LockConfig,
    store: Arc<dyn LockStore>,
    listener: L,
    status: LockStatus,
    status_tx: watch::Sender<LockStatus>,
    ready_tx: watch::Sender<bool>,
}

impl<L: LockListener> LeaseLock<L> {
    /// Create a lock participant. Nothing happens until [`run`](Self::run)
    /// or [`spawn`](Self::spawn).
    pub fn new(config: LockConfig, store: Arc<dyn LockStore>, listener: L) -> Self {
        let (status_tx, _) = watch::channel(LockStatus::Lost);
        let (ready_tx, _) = watch::channel(false);
        Self {
            config,
            store,
            listener,
            status: LockStatus::Lost,
            status_tx,
            ready_tx,
        }
    }

    pub fn observer(&self) -> LockObserver {
        LockObserver {
            status: self.status_tx.subscribe(),
            ready: self.ready_tx.subscribe(),
        }
    }

    pub fn status(&self) -> LockStatus {
        self.status
    }

    /// Run the lock loop on a new task.
    pub fn spawn(self) -> LockHandle
    where
        L: 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let observer = self.observer();
        let task = tokio::spawn(self.run(shutdown_rx));
        LockHandle {
            observer,
            shutdown_tx,
            task,
        }
    }

    /// Run the lock loop until `shutdown` flips or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let owner = self.config.owner.clone();
        info!(
            %owner,
            ttl_ms = self.config.ttl.as_millis() as u64,
            retry_interval_ms = self.config.retry_interval.as_millis() as u64,
            "lease lock started"
        );

        if owner.is_empty() {
            error!("lease lock owner is empty, this replica will never hold the lock");
            self.listener.on_lost();
            self.ready_tx.send_replace(true);
            if !*shutdown.borrow() {
                let _ = shutdown.changed().await;
            }
            info!("lease lock stopped");
            return;
        }

        self.poll().await;
        self.ready_tx.send_replace(true);

        let mut ticker = tokio::time::interval(self.config.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial attempt above
        // already covered it.
        ticker.tick().await;

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.poll().await,
                    _ = shutdown.changed() => break,
                }
            }
        }

        self.release().await;
        info!(%owner, "lease lock stopped");
    }

    /// One acquire/refresh attempt and the resulting transition.
    async fn poll(&mut self) {
        let result = self
            .store
            .acquire(&self.config.owner, self.config.ttl)
            .await;

        match result {
            Ok(true) => {
                if self.status == LockStatus::Lost {
                    info!(owner = %self.config.owner, "lease acquired");
                    self.set_status(LockStatus::Held);
                    self.listener.on_acquired();
                } else {
                    debug!(owner = %self.config.owner, "lease refreshed");
                }
            }
            Ok(false) => {
                if self.status == LockStatus::Held {
                    warn!(owner = %self.config.owner, "lease lost to another owner");
                    self.set_status(LockStatus::Lost);
                    self.listener.on_lost();
                } else {
                    debug!(owner = %self.config.owner, "lease held by another owner");
                }
            }
            Err(e) => {
                error!(owner = %self.config.owner, error = %e, "lease acquire failed");
                // Fail closed: report the loss even if the release below
                // also fails and the row still names this owner.
                if let Err(e) = self.store.release(&self.config.owner).await {
                    warn!(owner = %self.config.owner, error = %e, "lease release failed");
                }
                let was_held = self.status == LockStatus::Held;
                self.set_status(LockStatus::Lost);
                if was_held {
                    self.listener.on_lost();
                }
            }
        }
    }

    /// Best-effort release on shutdown.
    async fn release(&mut self) {
        match self.store.release(&self.config.owner).await {
            Ok(()) => {
                debug!(owner = %self.config.owner, "lease released");
                self.set_status(LockStatus::Lost);
            }
            Err(e) => {
                warn!(owner = %self.config.owner, error = %e, "lease release on shutdown failed");
            }
        }
    }

    fn set_status(&mut self, status: LockStatus) {
        self.status = status;
        self.status_tx.send_replace(status);
    }
}

/// Start a lease lock on its own task.
pub fn run_lock<L>(config: LockConfig, store: Arc<dyn LockStore>, listener: L) -> LockHandle
where
    L: LockListener + 'static,
{
    LeaseLock::new(config, store, listener).spawn()
}
