//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_TTL_MS: u64 = 60_000;

/// Configuration for a keyed connection pool
///
/// Controls the idle lifetime granted to connections when the caller does not
/// pass one, and whether expired entries are swept by a background task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// TTL in milliseconds used by `get_connection_default` and persistent entries
    default_ttl_ms: u64,
    /// Interval in milliseconds between background prune sweeps.
    /// `None` leaves pruning to the caller.
    prune_interval_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a new pool configuration with the given default TTL
    pub fn new(default_ttl_ms: u64) -> Self {
        Self {
            default_ttl_ms,
            prune_interval_ms: None,
        }
    }

    /// Set the default TTL in milliseconds
    pub fn with_default_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.default_ttl_ms = ttl_ms;
        self
    }

    /// Enable background pruning every `interval_ms` milliseconds
    pub fn with_prune_interval_ms(mut self, interval_ms: u64) -> Self {
        self.prune_interval_ms = Some(interval_ms);
        self
    }

    /// Get the default TTL as a Duration
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Get the background prune interval if set
    pub fn prune_interval(&self) -> Option<Duration> {
        self.prune_interval_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - default_ttl: 60 seconds
    /// - prune_interval: None (caller-driven pruning)
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MS)
    }
}
