//! Process-Wide Shutdown Signal
//!
//! One watch channel shared by the acceptor, every live session, and the
//! background sweeper. It is triggered by the `SHUTDOWN` command or by an
//! OS interrupt/terminate signal; every subscriber observes the flag at
//! its next suspension point and winds down in order: the acceptor stops
//! taking sockets, sessions stop reading and close, the sweeper exits.

use tokio::sync::watch;

/// Broadcast handle for orderly shutdown.
///
/// Cheap to share behind an [`std::sync::Arc`]; [`subscribe`] hands out
/// receivers whose `wait_for(|stop| *stop)` resolves once [`trigger`]
/// has been called, no matter when the receiver was created.
///
/// [`subscribe`]: Shutdown::subscribe
/// [`trigger`]: Shutdown::trigger
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A receiver for one subscriber task.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flips the flag. Idempotent; safe to call from any task.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// True once shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
