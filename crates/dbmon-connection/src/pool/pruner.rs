//! Background prune task

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::pool::ConnectionPool;

const MIN_PRUNE_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running background pruner
///
/// The task holds a strong reference to its pool, so the pool outlives the
/// pruner. Call [`shutdown`](Self::shutdown) before closing the pool.
pub struct PrunerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PrunerHandle {
    /// Stop the pruner and wait for an in-progress sweep to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "connection pruner task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ConnectionPool {
    /// Run [`prune_connections`](ConnectionPool::prune_connections) every
    /// `interval` on the current tokio runtime.
    ///
    /// Sweeps take the same per-key locks as `get_connection`, so a sweep can
    /// never race a miss into opening a second connection for a key.
    pub fn spawn_pruner(self: &Arc<Self>, interval: Duration) -> PrunerHandle {
        let interval = interval.max(MIN_PRUNE_INTERVAL);
        let pool = Arc::clone(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "connection pruner started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can have expired yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => pool.prune_connections().await,
                }
            }
            tracing::debug!("connection pruner stopped");
        });

        PrunerHandle { cancel, task }
    }
}
