use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::error::Elapsed;

/// One-shot signal that the video feed is live.
///
/// Starts unset, is set at most once and never resets. Waiting after it has
/// been set returns immediately.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    ready: Arc<watch::Sender<bool>>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            ready: Arc::new(ready),
        }
    }

    /// Sets the gate and wakes every waiter. Returns `true` only for the call
    /// that actually flipped it.
    pub fn signal(&self) -> bool {
        self.ready.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub async fn wait_timeout(&self, limit: Duration) -> Result<(), Elapsed> {
        tokio::time::timeout(limit, self.wait()).await
    }
}
