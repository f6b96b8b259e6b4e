//! Strict-FIFO admission over a single ordered waiter registry
//!
//! Ownership of a path belongs to whichever live waiter holds the smallest
//! sequence number. Admission is structural: release has no grant step, the
//! next-smallest entry simply finds itself first on its next check. That is
//! what makes the FIFO guarantee independent of wake-up timing: a later
//! waiter can be woken first and still cannot be admitted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use tranca_common::{Clock, SystemClock};

use super::model::{QueueTicket, path_range, waiter_key};

/// Cap on a single waiter park between admission checks.
pub const ADMISSION_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fair queue lock service.
///
/// One mutex guards the whole registry; accepted as a bottleneck at this
/// scope.
pub struct SequenceLockService {
    entries: Mutex<BTreeMap<String, String>>,
    sequence: AtomicU64,
    released: Notify,
    clock: Arc<dyn Clock>,
}

impl Default for SequenceLockService {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceLockService {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            released: Notify::new(),
            clock,
        }
    }

    /// Assign the next sequence number under `path` and register the
    /// waiter.
    ///
    /// The ticket MUST be handed back by its owner; see [`QueueTicket`].
    pub fn enqueue(&self, path: &str, owner: &str) -> QueueTicket {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let key = waiter_key(path, sequence);
        self.entries.lock().insert(key.clone(), owner.to_string());
        debug!(key = %key, owner = %owner, "waiter registered");
        QueueTicket { key, sequence }
    }

    /// Whether `ticket` currently fronts its path's queue. An empty queue
    /// cannot block admission.
    pub fn holds_lock(&self, path: &str, ticket: &QueueTicket) -> bool {
        let entries = self.entries.lock();
        let (lo, hi) = path_range(path);
        match entries.range(lo..hi).next() {
            Some((first, _)) => *first == ticket.key,
            None => true,
        }
    }

    /// Enqueue and wait for strict-FIFO admission on `path`.
    ///
    /// On timeout the waiter's own entry is removed before failure is
    /// reported, so this call cannot wedge the queue.
    pub async fn acquire(&self, path: &str, owner: &str, timeout: Duration) -> Option<QueueTicket> {
        let ticket = self.enqueue(path, owner);
        let deadline = self
            .clock
            .now_millis()
            .saturating_add(timeout.as_millis() as i64);

        loop {
            if self.holds_lock(path, &ticket) {
                debug!(key = %ticket.key, owner = %owner, "admission granted");
                return Some(ticket);
            }

            let remaining = deadline - self.clock.now_millis();
            if remaining <= 0 {
                self.release(&ticket);
                debug!(key = %ticket.key, owner = %owner, "admission timed out");
                return None;
            }

            let park = ADMISSION_POLL_INTERVAL.min(Duration::from_millis(remaining as u64));
            let _ = tokio::time::timeout(park, self.released.notified()).await;
        }
    }

    /// Drop the entry for `ticket` and wake waiters. The next-smallest
    /// entry on the path becomes holder implicitly.
    pub fn release(&self, ticket: &QueueTicket) -> bool {
        let removed = self.entries.lock().remove(&ticket.key).is_some();
        if removed {
            debug!(key = %ticket.key, "waiter released");
            self.released.notify_waiters();
        }
        removed
    }

    /// Waiters currently registered under `path`.
    pub fn waiter_count(&self, path: &str) -> usize {
        let entries = self.entries.lock();
        let (lo, hi) = path_range(path);
        entries.range(lo..hi).count()
    }

    /// Owner fronting `path`, if any waiter is registered.
    pub fn front_owner(&self, path: &str) -> Option<String> {
        let entries = self.entries.lock();
        let (lo, hi) = path_range(path);
        entries.range(lo..hi).next().map(|(_, owner)| owner.clone())
    }
}
