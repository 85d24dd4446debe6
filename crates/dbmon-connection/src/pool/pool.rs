//! Keyed connection pool implementation

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dbmon_core::{Connection, ConnectionFactory, DbmonError, Result};
use futures::future::{BoxFuture, FutureExt, join_all};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::config::PoolConfig;
use super::entry::{ConnectionEntry, Slot, deadline_after};
use super::stats::{PoolStats, StatsCounters};

/// A pool holding at most one live connection per key
///
/// Each key (a database name) maps to a single cached connection with an idle
/// deadline. A hit refreshes the deadline; a miss opens a connection through
/// the factory. Expired entries are reclaimed lazily by
/// [`prune_connections`](Self::prune_connections) or on the next
/// `get_connection` for that key.
///
/// The pool owns every connection it hands out. Callers must not close the
/// returned handles; they must call
/// [`close_all_connections`](Self::close_all_connections) before dropping
/// the pool. Dropping a non-empty pool only makes a best-effort attempt to
/// close what is left.
pub struct ConnectionPool {
    /// Pool configuration
    config: PoolConfig,
    /// Connection factory
    factory: Arc<dyn ConnectionFactory>,
    /// Registry of per-key slots. Only held for map lookups and unlinks,
    /// never across an await.
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    /// Number of slots currently holding an entry
    live: AtomicUsize,
    /// Lifetime counters, shared with detached close tasks
    stats: Arc<StatsCounters>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and factory
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        Self {
            config,
            factory: Arc::new(factory),
            slots: Mutex::new(HashMap::new()),
            live: AtomicUsize::new(0),
            stats: Arc::new(StatsCounters::new()),
        }
    }

    /// Create a pool with the default configuration
    pub fn with_factory<F: ConnectionFactory>(factory: F) -> Self {
        Self::new(PoolConfig::default(), factory)
    }

    /// Get the cached connection for `key`, opening one if needed.
    ///
    /// On a hit the entry's deadline becomes `now + ttl` and the cached handle
    /// is returned without touching the factory. On a miss, or when the cached
    /// entry has expired, the stale connection is closed and the factory is
    /// called once; concurrent callers for the same key wait for that call
    /// and share its result. Factory errors are returned unchanged and leave
    /// nothing behind in the pool.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_connection(&self, key: &str, ttl: Duration) -> Result<Arc<dyn Connection>> {
        self.acquire(key, ttl, false).await
    }

    /// Same as [`get_connection`](Self::get_connection) with the configured default TTL
    pub async fn get_connection_default(&self, key: &str) -> Result<Arc<dyn Connection>> {
        self.acquire(key, self.config.default_ttl(), false).await
    }

    /// Get a connection for `key` that is exempt from TTL expiry.
    ///
    /// An existing entry for the key is reused and marked persistent. Only
    /// [`evict`](Self::evict) and
    /// [`close_all_connections`](Self::close_all_connections) remove it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_persistent_connection(&self, key: &str) -> Result<Arc<dyn Connection>> {
        self.acquire(key, self.config.default_ttl(), true).await
    }

    async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        persistent: bool,
    ) -> Result<Arc<dyn Connection>> {
        validate_key(key)?;

        loop {
            let slot = self.slot_for(key);
            let mut state = slot.state.lock().await;
            if state.retired {
                // Unlinked while we waited for the lock; look the key up again.
                continue;
            }

            if let Some(entry) = state.entry.as_mut() {
                let now = Instant::now();
                if !entry.is_expired(now) {
                    entry.refresh(deadline_after(now, ttl));
                    if persistent {
                        entry.mark_persistent();
                    }
                    return Ok(entry.connection().clone());
                }
            }

            let _opening = slot.begin_open();
            if let Some(stale) = state.entry.take() {
                self.live.fetch_sub(1, Ordering::SeqCst);
                tracing::debug!(key, "cached connection expired, reopening");
                self.start_close(key, stale).await;
            }

            return match self.factory.create(key, ttl).await {
                Ok(connection) => {
                    self.stats.record_opened();
                    let deadline = deadline_after(Instant::now(), ttl);
                    state.entry = Some(ConnectionEntry::new(connection.clone(), deadline, persistent));
                    self.live.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(key, persistent, "opened pooled connection");
                    Ok(connection)
                }
                Err(e) => {
                    tracing::debug!(key, error = %e, "connection factory failed");
                    state.retired = true;
                    self.unlink(key, &slot);
                    Err(e)
                }
            };
        }
    }

    /// Close and remove every expired entry.
    ///
    /// Expiry is judged against the instant the sweep starts. Each close is
    /// independent: a failing close is counted and logged, the entry is
    /// removed anyway and the sweep moves on. Persistent entries and keys with
    /// a miss in flight are left alone.
    pub async fn prune_connections(&self) {
        let now = Instant::now();
        let mut closes = Vec::new();

        for (key, slot) in self.snapshot() {
            // The caller holding an opening slot replaces the entry itself.
            if slot.is_opening() {
                tracing::trace!(key = %key, "slot opening, skipping");
                continue;
            }
            let mut state = slot.state.lock().await;
            if state.retired {
                continue;
            }
            let expired = state.entry.as_ref().is_some_and(|entry| entry.is_expired(now));
            if !expired {
                continue;
            }
            let Some(entry) = state.entry.take() else {
                continue;
            };

            state.retired = true;
            self.unlink(&key, &slot);
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.stats.record_pruned();
            closes.push(self.start_close(&key, entry));
        }

        let pruned = closes.len();
        join_all(closes).await;

        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.len(), "pruned expired connections");
        }
    }

    /// Close and remove every entry regardless of deadline.
    ///
    /// All closes are attempted even if some fail. Returns `true` only when
    /// every close succeeded. Calling this on an empty pool returns `true`
    /// and changes nothing. The pool stays usable afterwards.
    ///
    /// Dropping the returned future part way leaves the keys not yet reached
    /// in the pool; entries already removed are still closed.
    pub async fn close_all_connections(&self) -> bool {
        let mut closes = Vec::new();
        for (key, slot) in self.snapshot() {
            // Waits out any in-flight factory call so its result is closed too.
            let mut state = slot.state.lock().await;
            if state.retired {
                continue;
            }
            state.retired = true;
            self.unlink(&key, &slot);
            if let Some(entry) = state.entry.take() {
                self.live.fetch_sub(1, Ordering::SeqCst);
                closes.push(self.start_close(&key, entry));
            }
        }

        if closes.is_empty() {
            return true;
        }

        let total = closes.len();
        let results = join_all(closes).await;
        let failed = results.iter().filter(|ok| !**ok).count();

        if failed == 0 {
            tracing::info!(closed = total, "closed all pooled connections");
        } else {
            tracing::warn!(closed = total - failed, failed, "failed to close some pooled connections");
        }
        failed == 0
    }

    /// Close and remove the entry for `key`, whatever its deadline.
    ///
    /// Used when a caller finds its handle dead and wants a fresh one on the
    /// next `get_connection`. Returns whether an entry was removed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn evict(&self, key: &str) -> bool {
        let Some(slot) = self.slots.lock().get(key).cloned() else {
            return false;
        };

        let mut state = slot.state.lock().await;
        if state.retired {
            return false;
        }
        state.retired = true;
        self.unlink(key, &slot);

        match state.entry.take() {
            Some(entry) => {
                self.live.fetch_sub(1, Ordering::SeqCst);
                let close = self.start_close(key, entry);
                drop(state);
                close.await;
                true
            }
            None => false,
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` currently has a live entry
    pub async fn contains(&self, key: &str) -> bool {
        self.deadline(key).await.is_some()
    }

    /// Deadline of the entry for `key`, if there is one
    pub async fn deadline(&self, key: &str) -> Option<Instant> {
        let slot = self.slots.lock().get(key).cloned()?;
        let state = slot.state.lock().await;
        if state.retired {
            return None;
        }
        state.entry.as_ref().map(|entry| entry.deadline())
    }

    /// Whether the entry for `key` is exempt from expiry
    pub async fn is_persistent(&self, key: &str) -> bool {
        let Some(slot) = self.slots.lock().get(key).cloned() else {
            return false;
        };
        let state = slot.state.lock().await;
        !state.retired && state.entry.as_ref().is_some_and(|entry| entry.is_persistent())
    }

    /// Keys with a live entry, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for (key, slot) in self.snapshot() {
            let state = slot.state.lock().await;
            if !state.retired && state.entry.is_some() {
                keys.push(key);
            }
        }
        keys.sort();
        keys
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Zero the pool's counters
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn slot_for(&self, key: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(slot) => slot.clone(),
            None => {
                let slot = Arc::new(Slot::default());
                slots.insert(key.to_string(), slot.clone());
                slot
            }
        }
    }

    /// Remove `key` from the registry if it still maps to `slot`.
    fn unlink(&self, key: &str, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    fn snapshot(&self) -> Vec<(String, Arc<Slot>)> {
        self.slots
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect()
    }

    /// Start closing an entry's connection on its own task.
    ///
    /// The close and its accounting run to completion even if the returned
    /// future is dropped, so a cancelled caller never leaks a session. Outside
    /// a tokio runtime the close runs inline when the future is polled.
    fn start_close(&self, key: &str, entry: ConnectionEntry) -> BoxFuture<'static, bool> {
        let close = close_and_record(self.stats.clone(), key.to_string(), entry.into_connection());
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn(close);
                async move {
                    match task.await {
                        Ok(closed) => closed,
                        Err(e) => {
                            tracing::warn!(error = %e, "connection close task failed");
                            false
                        }
                    }
                }
                .boxed()
            }
            Err(_) => close.boxed(),
        }
    }
}

/// Close a connection and count the outcome. Never fails.
async fn close_and_record(
    stats: Arc<StatsCounters>,
    key: String,
    connection: Arc<dyn Connection>,
) -> bool {
    match connection.close().await {
        Ok(()) => {
            stats.record_closed();
            true
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "failed to close pooled connection");
            stats.record_close_failed();
            false
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        let leftover: Vec<(String, Arc<dyn Connection>)> = self
            .slots
            .get_mut()
            .drain()
            .filter_map(|(key, slot)| {
                let mut state = slot.state.try_lock().ok()?;
                let entry = state.entry.take()?;
                Some((key, entry.into_connection()))
            })
            .collect();

        if leftover.is_empty() {
            return;
        }

        tracing::warn!(
            count = leftover.len(),
            "connection pool dropped without close_all_connections"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for (key, connection) in leftover {
                        if let Err(e) = connection.close().await {
                            tracing::debug!(key = %key, error = %e, "failed to close leftover connection");
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    keys = ?leftover.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>(),
                    "no async runtime available, leftover connections were not closed"
                );
            }
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(DbmonError::InvalidKey("key must not be empty".into()));
    }
    Ok(())
}
