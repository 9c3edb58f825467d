//! Bounded queue of parked proxy sockets for a single identity.

use crate::common::Shutdown;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

/// Producer/consumer queue shared between PROXY handlers (producers, via
/// [`Pool::push`]) and PUBLIC handlers (consumers, via [`Pool::pop`]).
///
/// Built on an `mpsc` channel rather than a generic deque: the channel's own
/// backpressure gives us "enqueue blocks when full" for free, and wrapping
/// the single `Receiver` in a `Mutex` lets many PUBLIC handlers race to
/// dequeue (only one wins per item) without a separate semaphore.
pub struct Pool {
    tx: mpsc::Sender<TcpStream>,
    rx: Mutex<mpsc::Receiver<TcpStream>>,
    parked: AtomicUsize,
}

impl Pool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Pool {
            tx,
            rx: Mutex::new(rx),
            parked: AtomicUsize::new(0),
        }
    }

    /// Park a freshly-registered proxy socket. Blocks if the pool is full.
    /// Preemptible by `shutdown`: if it fires first, the socket is dropped
    /// (closing it) instead of being enqueued (invariant I2/P3).
    pub async fn push(&self, stream: TcpStream, shutdown: &Shutdown) {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                drop(stream);
            }
            result = self.tx.send(stream) => {
                // If the receiver side were ever dropped this would error;
                // the pool outlives every push while its Control is alive.
                if result.is_ok() {
                    self.parked.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Reserve a parked proxy socket. Preemptible by `shutdown`: returns
    /// `None` if shutdown fires before one becomes available.
    pub async fn pop(&self, shutdown: &Shutdown) -> Option<TcpStream> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = shutdown.recv() => None,
            stream = rx.recv() => {
                if stream.is_some() {
                    self.parked.fetch_sub(1, Ordering::Relaxed);
                }
                stream
            }
        }
    }

    /// Number of proxy sockets currently parked, for logging (spec.md §15).
    pub fn parked_len(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
