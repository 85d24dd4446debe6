//! Collection rounds over the configured databases
//!
//! Each round borrows one pooled connection per database, pings it, and
//! reports which databases answered. Connections stay in the pool between
//! rounds and are reclaimed once their idle lifetime runs out.

use std::sync::Arc;

use dbmon_connection::{ConnectionPool, PoolStats, PrunerHandle};
use dbmon_core::{DbmonError, Result};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::CollectorSettings;

/// A database that did not answer during a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseFailure {
    pub database: String,
    pub error: String,
}

/// Outcome of one collection round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub healthy: Vec<String>,
    pub failed: Vec<DatabaseFailure>,
    /// Pooled connections after the round
    pub pooled: usize,
    pub stats: PoolStats,
}

impl RoundReport {
    pub fn all_healthy(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives collection rounds against a shared [`ConnectionPool`]
pub struct Collector {
    pool: Arc<ConnectionPool>,
    settings: CollectorSettings,
    pruner: Option<PrunerHandle>,
}

impl Collector {
    /// Create a collector over `pool`
    ///
    /// When the pool config sets a prune interval, a background pruner is
    /// spawned on the current runtime; otherwise every round prunes inline.
    pub fn new(pool: Arc<ConnectionPool>, settings: CollectorSettings) -> Self {
        let pruner = pool
            .config()
            .prune_interval()
            .map(|interval| pool.spawn_pruner(interval));
        Self {
            pool,
            settings,
            pruner,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn has_background_pruner(&self) -> bool {
        self.pruner.is_some()
    }

    /// Run a single round across every configured database
    pub async fn collect_once(&self) -> RoundReport {
        let targets: Vec<(&str, bool)> = self
            .settings
            .databases
            .iter()
            .map(|db| (db.as_str(), false))
            .chain(
                self.settings
                    .persistent_databases
                    .iter()
                    .map(|db| (db.as_str(), true)),
            )
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|(database, persistent)| self.check(database, *persistent)),
        )
        .await;

        if self.pruner.is_none() {
            self.pool.prune_connections().await;
        }

        let mut report = RoundReport::default();
        for ((database, _), result) in targets.into_iter().zip(results) {
            match result {
                Ok(()) => report.healthy.push(database.to_string()),
                Err(e) => {
                    tracing::warn!(database, error = %e, "database check failed");
                    report.failed.push(DatabaseFailure {
                        database: database.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.pooled = self.pool.len();
        report.stats = self.pool.stats();

        tracing::info!(
            healthy = report.healthy.len(),
            failed = report.failed.len(),
            pooled = report.pooled,
            opened = report.stats.connection_opened,
            closed = report.stats.connection_closed,
            pruned = report.stats.connection_pruned,
            close_failed = report.stats.connection_closed_failed,
            "collection round finished"
        );
        report
    }

    /// Run rounds on the configured interval until `shutdown` fires
    ///
    /// The first round starts immediately. Returns the number of rounds run.
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut rounds = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.collect_once().await;
                    rounds += 1;
                }
            }
        }
        tracing::debug!(rounds, "collector loop stopped");
        rounds
    }

    /// Stop the background pruner and close every pooled connection
    pub async fn shutdown(self) -> PoolStats {
        if let Some(pruner) = self.pruner {
            pruner.shutdown().await;
        }
        if !self.pool.close_all_connections().await {
            tracing::warn!("some connections failed to close during shutdown");
        }
        let stats = self.pool.stats();
        tracing::info!(
            opened = stats.connection_opened,
            closed = stats.connection_closed,
            pruned = stats.connection_pruned,
            close_failed = stats.connection_closed_failed,
            "collector shut down"
        );
        stats
    }

    async fn check(&self, database: &str, persistent: bool) -> Result<()> {
        let connection = self.acquire(database, persistent).await?;
        match connection.ping().await {
            Err(e) if e.is_connection_lost() => {
                // The server dropped the pooled session; reopen once
                tracing::info!(database, error = %e, "pooled connection lost, reconnecting");
                self.pool.evict(database).await;
                self.acquire(database, persistent).await?.ping().await
            }
            other => other,
        }
    }

    async fn acquire(
        &self,
        database: &str,
        persistent: bool,
    ) -> Result<Arc<dyn dbmon_core::Connection>> {
        let result = if persistent {
            self.pool.get_persistent_connection(database).await
        } else {
            self.pool
                .get_connection(database, self.settings.connection_ttl())
                .await
        };
        result.map_err(|e| match e {
            DbmonError::Connection(msg) => {
                DbmonError::Connection(format!("{}: {}", database, msg))
            }
            other => other,
        })
    }
}
