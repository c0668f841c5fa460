//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Every WebSocket session runs as a future tracked by a [`TaskTracker`], so
//! shutdown can wait for sessions to send their Close frame and leave the
//! registry.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Coordinates graceful shutdown across the listener and all sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a session future so shutdown waits for it.
    pub fn track<F: Future>(&self, future: F) -> TrackedFuture<F> {
        self.tracker.track_future(future)
    }

    /// Number of tracked futures still running.
    pub(crate) fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel the token, then wait up to `timeout` for tracked work.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.tracker.close();
        info!(
            task_count = self.active_tasks(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for sessions to close"
        );

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.active_tasks(),
                "shutdown timed out after {timeout:?}, some sessions may still be open"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert_eq!(coord.active_tasks(), 0);
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        assert!(!t1.is_cancelled());
        coord.shutdown();
        coord.shutdown();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn tracked_future_counted_until_done() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(coord.track(async move { token.cancelled().await }));
        assert_eq!(coord.active_tasks(), 1);

        coord.shutdown();
        handle.await.unwrap();
        assert_eq!(coord.active_tasks(), 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_sessions() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let _handle = tokio::spawn(coord.track(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }));

        assert!(coord.graceful_shutdown(Duration::from_secs(5)).await);
        assert_eq!(coord.active_tasks(), 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_with_nothing_tracked() {
        let coord = ShutdownCoordinator::default();
        assert!(coord.graceful_shutdown(Duration::from_millis(50)).await);
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        // Ignores cancellation
        let _handle = tokio::spawn(coord.track(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));

        assert!(!coord.graceful_shutdown(Duration::from_millis(100)).await);
        assert_eq!(coord.active_tasks(), 1);
    }
}
