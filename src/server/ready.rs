//! One-shot, multi-observer readiness broadcast.

use std::sync::Arc;

use tokio::sync::watch;

/// Broadcast-once flag used by every module to announce "I am now accepting
/// work".
///
/// Any number of observers may [`wait`](ReadySignal::wait), whether they
/// subscribed before or after [`signal`](ReadySignal::signal) fired; all of
/// them unblock exactly once and never miss the transition. Signaling twice
/// is an idempotent no-op.
///
/// The same primitive doubles internally as the shutdown trigger and the
/// "serve loop finished" latch of the network modules.
#[derive(Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Marks ready, waking all current waiters. Idempotent.
    pub fn signal(&self) {
        self.tx.send_replace(true);
    }

    /// Non-blocking probe.
    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Blocks until [`signal`](ReadySignal::signal) has been called.
    /// Returns immediately if it already was.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so wait_for cannot fail here.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadySignal")
            .field("ready", &self.is_ready())
            .finish()
    }
}
