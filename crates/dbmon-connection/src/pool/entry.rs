//! Registry records: one entry per live connection, one slot per key

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dbmon_core::Connection;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Upper bound on a deadline offset; keeps `Instant + ttl` from overflowing
/// for callers that pass `Duration::MAX` as "never".
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub(super) fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_TTL))
        .unwrap_or_else(|| now + Duration::from_secs(24 * 60 * 60))
}

/// A live connection and the instant after which it may be pruned
pub(super) struct ConnectionEntry {
    connection: Arc<dyn Connection>,
    deadline: Instant,
    persistent: bool,
}

impl ConnectionEntry {
    pub(super) fn new(connection: Arc<dyn Connection>, deadline: Instant, persistent: bool) -> Self {
        Self {
            connection,
            deadline,
            persistent,
        }
    }

    /// Persistent entries never expire; only eviction or shutdown removes them.
    pub(super) fn is_expired(&self, now: Instant) -> bool {
        !self.persistent && now > self.deadline
    }

    pub(super) fn refresh(&mut self, deadline: Instant) {
        self.deadline = deadline;
    }

    pub(super) fn mark_persistent(&mut self) {
        self.persistent = true;
    }

    pub(super) fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub(super) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(super) fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub(super) fn into_connection(self) -> Arc<dyn Connection> {
        self.connection
    }
}

#[derive(Default)]
pub(super) struct SlotState {
    pub(super) entry: Option<ConnectionEntry>,
    /// Set once the slot has been unlinked from the registry. A caller that
    /// acquires a retired slot must look the key up again.
    pub(super) retired: bool,
}

/// Per-key lock. Held across the check-and-create region of a miss so that
/// concurrent callers for one key share a single factory call, while callers
/// for other keys proceed on their own slots.
#[derive(Default)]
pub(super) struct Slot {
    pub(super) state: Mutex<SlotState>,
    /// Set while a miss holds the lock across closing the stale entry and
    /// calling the factory. Readable without the lock.
    opening: AtomicBool,
}

impl Slot {
    /// Flag the slot as opening until the returned guard is dropped
    pub(super) fn begin_open(&self) -> OpeningGuard<'_> {
        self.opening.store(true, Ordering::SeqCst);
        OpeningGuard { slot: self }
    }

    pub(super) fn is_opening(&self) -> bool {
        self.opening.load(Ordering::SeqCst)
    }
}

/// Clears [`Slot::begin_open`]'s flag on drop, including when the miss is
/// cancelled mid-await.
pub(super) struct OpeningGuard<'a> {
    slot: &'a Slot,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        self.slot.opening.store(false, Ordering::SeqCst);
    }
}
