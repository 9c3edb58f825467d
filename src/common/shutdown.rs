//! One-shot, many-waiter shutdown signal for a single Control's lifetime.
//!
//! Adapted from the broadcast-channel `Shutdown` helper used for per-connection
//! cancellation, generalized here to a signal with many independent waiters
//! (the control liveness reader, every PROXY handler's enqueue, every PUBLIC
//! handler's dequeue) and exactly one firer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Handle shared by everything tied to one Control's lifetime.
#[derive(Clone)]
pub struct Shutdown {
    fired: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1);
        Shutdown {
            fired: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// Fire the signal. Idempotent: only the first caller actually sends;
    /// later callers are no-ops. Satisfies invariant I1 / P2.
    pub fn fire(&self) {
        if self.fired.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            let _ = self.tx.send(());
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Wait until [`Shutdown::fire`] is called. Resolves immediately if it
    /// already fired before this call.
    ///
    /// Subscribes before checking the latch: `fire()` only sends to
    /// receivers that already exist, so checking first and subscribing
    /// second would lose the wakeup for any `fire()` landing in between.
    pub async fn recv(&self) {
        let mut rx = self.tx.subscribe();
        if self.is_fired() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
