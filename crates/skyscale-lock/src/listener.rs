//! Lock transition listeners.

use tokio::sync::mpsc;

/// A lock ownership transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    Acquired,
    Lost,
}

/// Receives ownership transitions from a [`LeaseLock`](crate::LeaseLock).
///
/// Both methods are called from the lock's own task, never concurrently,
/// and in strict alternation. They should return quickly; the next poll
/// waits for them.
pub trait LockListener: Send {
    fn on_acquired(&mut self);
    fn on_lost(&mut self);
}

/// Ignores every transition. Useful when only the status snapshot matters.
impl LockListener for () {
    fn on_acquired(&mut self) {}
    fn on_lost(&mut self) {}
}

/// Forwards transitions as [`LockEvent`]s for a control loop to select on.
impl LockListener for mpsc::UnboundedSender<LockEvent> {
    fn on_acquired(&mut self) {
        let _ = self.send(LockEvent::Acquired);
    }

    fn on_lost(&mut self) {
        let _ = self.send(LockEvent::Lost);
    }
}

/// Closure pair listener.
pub struct Callbacks<A, L> {
    on_acquired: A,
    on_lost: L,
}

impl<A, L> Callbacks<A, L>
where
    A: FnMut() + Send,
    L: FnMut() + Send,
{
    pub fn new(on_acquired: A, on_lost: L) -> Self {
        Self {
            on_acquired,
            on_lost,
        }
    }
}

impl<A, L> LockListener for Callbacks<A, L>
where
    A: FnMut() + Send,
    L: FnMut() + Send,
{
    fn on_acquired(&mut self) {
        (self.on_acquired)();
    }

    fn on_lost(&mut self) {
        (self.on_lost)();
    }
}
