//! Pool statistics types

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Snapshot of a pool's lifetime counters
///
/// Counters only grow until the pool's stats are reset, so a snapshot taken
/// after a reset describes a single measurement window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections returned by the factory
    pub connection_opened: u64,
    /// Connections closed successfully, from any path
    pub connection_closed: u64,
    /// Close attempts that failed
    pub connection_closed_failed: u64,
    /// Entries evicted by a prune sweep
    pub connection_pruned: u64,
}

impl PoolStats {
    /// Connections opened but not yet closed or discarded by a failed close.
    ///
    /// At a quiescent point this equals the number of live entries.
    pub fn outstanding(&self) -> u64 {
        self.connection_opened
            .saturating_sub(self.connection_closed)
            .saturating_sub(self.connection_closed_failed)
    }
}

/// Lock-protected accumulator behind [`PoolStats`]
///
/// A single mutex guards all four counters so that `reset` and `snapshot`
/// never observe a half-updated set.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    inner: Mutex<PoolStats>,
}

impl StatsCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_opened(&self) {
        self.inner.lock().connection_opened += 1;
    }

    pub(crate) fn record_closed(&self) {
        self.inner.lock().connection_closed += 1;
    }

    pub(crate) fn record_close_failed(&self) {
        self.inner.lock().connection_closed_failed += 1;
    }

    pub(crate) fn record_pruned(&self) {
        self.inner.lock().connection_pruned += 1;
    }

    /// Copy the current counter values
    pub(crate) fn snapshot(&self) -> PoolStats {
        *self.inner.lock()
    }

    /// Zero all four counters
    pub(crate) fn reset(&self) {
        *self.inner.lock() = PoolStats::default();
    }
}
