//! Hold counting that keeps the agent's event loop alive.
//!
//! The agent runs while at least one hold is outstanding. One hold is taken at
//! launch and dropped on the first termination signal, another is taken for
//! each bus connection and dropped when the connection is torn down.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared hold counter.
#[derive(Debug, Clone)]
pub struct ApplicationHold {
    count: Arc<watch::Sender<usize>>,
}

impl Default for ApplicationHold {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationHold {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Take a hold. It is released when the returned guard is dropped.
    #[must_use = "the hold is released as soon as the guard is dropped"]
    pub fn hold(&self) -> HoldGuard {
        self.count.send_modify(|count| *count += 1);
        HoldGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Number of outstanding holds.
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once no holds are outstanding.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

/// A single outstanding hold.
#[derive(Debug)]
pub struct HoldGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for HoldGuard {
    fn drop(&mut self) {
        self.count
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}
