//! Per-resource lease lock
//!
//! Exclusive, time-bounded admission for one named resource. The lease
//! auto-expires `ttl` after each grant, so a holder that never releases is
//! reclaimable by the next acquirer without any contact. Release and renew
//! are gated on the fencing token issued at grant time; downstream resource
//! owners validate the token to reject writes from a holder that has since
//! lost the lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use tranca_common::{Clock, FenceTokenSource};

use super::model::{AcquireResult, LeaseState, LockStats};

/// Cap on a single waiter park. Expiry is time-based rather than
/// event-based, so waiters must re-check on a bounded interval instead of
/// relying on one wake-up.
pub const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Atomic counters behind [`LockStats`], shared by every lock in a registry.
#[derive(Debug, Default)]
pub(crate) struct LockStatsCollector {
    total_acquisitions: AtomicU64,
    failed_acquisitions: AtomicU64,
    total_releases: AtomicU64,
    rejected_releases: AtomicU64,
    total_renewals: AtomicU64,
    rejected_renewals: AtomicU64,
    expired_leases: AtomicU64,
}

impl LockStatsCollector {
    pub(crate) fn snapshot(&self) -> LockStats {
        LockStats {
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            failed_acquisitions: self.failed_acquisitions.load(Ordering::Relaxed),
            total_releases: self.total_releases.load(Ordering::Relaxed),
            rejected_releases: self.rejected_releases.load(Ordering::Relaxed),
            total_renewals: self.total_renewals.load(Ordering::Relaxed),
            rejected_renewals: self.rejected_renewals.load(Ordering::Relaxed),
            expired_leases: self.expired_leases.load(Ordering::Relaxed),
        }
    }
}

/// Per-resource lease lock state machine.
pub struct LeaseLock {
    name: String,
    ttl: Duration,
    state: Mutex<LeaseState>,
    available: Notify,
    tokens: Arc<FenceTokenSource>,
    clock: Arc<dyn Clock>,
    stats: Arc<LockStatsCollector>,
}

impl LeaseLock {
    pub fn new(
        name: impl Into<String>,
        ttl: Duration,
        tokens: Arc<FenceTokenSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_stats(name, ttl, tokens, clock, Arc::default())
    }

    pub(crate) fn with_stats(
        name: impl Into<String>,
        ttl: Duration,
        tokens: Arc<FenceTokenSource>,
        clock: Arc<dyn Clock>,
        stats: Arc<LockStatsCollector>,
    ) -> Self {
        Self {
            name: name.into(),
            ttl,
            state: Mutex::new(LeaseState::default()),
            available: Notify::new(),
            tokens,
            clock,
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Block until the lock is free (or its lease has lapsed), or the
    /// deadline passes.
    ///
    /// The relative timeout is converted to one absolute deadline at entry
    /// and re-checked every poll iteration. Cancelling the returned future
    /// mid-wait mutates nothing: the grant happens synchronously under the
    /// state mutex.
    pub async fn acquire(&self, owner: &str, timeout: Duration) -> AcquireResult {
        let deadline = self
            .clock
            .now_millis()
            .saturating_add(timeout.as_millis() as i64);

        loop {
            if let Some(token) = self.try_acquire(owner) {
                return AcquireResult::Acquired { token };
            }

            let remaining = deadline - self.clock.now_millis();
            if remaining <= 0 {
                self.stats.failed_acquisitions.fetch_add(1, Ordering::Relaxed);
                debug!(lock = %self.name, owner = %owner, "lease acquisition timed out");
                return AcquireResult::TimedOut;
            }

            // A missed wake-up costs at most one poll interval.
            let park = ACQUIRE_POLL_INTERVAL.min(Duration::from_millis(remaining as u64));
            let _ = tokio::time::timeout(park, self.available.notified()).await;
        }
    }

    /// Single non-blocking attempt. Returns the minted token on success.
    pub fn try_acquire(&self, owner: &str) -> Option<u64> {
        let mut state = self.state.lock();
        let now = self.clock.now_millis();
        if state.is_locked(now) {
            return None;
        }
        if state.holder.is_some() {
            // Taking over a lease whose holder never released.
            self.stats.expired_leases.fetch_add(1, Ordering::Relaxed);
        }

        let token = self.tokens.next();
        state.grant(owner, token, now + self.ttl.as_millis() as i64);
        self.stats.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        debug!(lock = %self.name, owner = %owner, token, "lease acquired");
        Some(token)
    }

    /// Release on an exact token match.
    ///
    /// A mismatch (stale caller, lock already reassigned) returns `false`
    /// and leaves state untouched. Success clears holder, token, and expiry,
    /// and wakes all waiters.
    pub fn release(&self, token: u64) -> bool {
        let mut state = self.state.lock();
        if state.fence_token != Some(token) {
            self.stats.rejected_releases.fetch_add(1, Ordering::Relaxed);
            warn!(
                lock = %self.name,
                token,
                current = ?state.fence_token,
                "release rejected: fencing token mismatch"
            );
            return false;
        }

        let holder = state.holder.clone();
        state.clear();
        drop(state);

        self.stats.total_releases.fetch_add(1, Ordering::Relaxed);
        debug!(lock = %self.name, holder = ?holder, token, "lease released");
        self.available.notify_waiters();
        true
    }

    /// Extend the current lease to `now + extension`. Token-gated like
    /// [`LeaseLock::release`]; used to keep a long critical section alive.
    pub fn renew(&self, token: u64, extension: Duration) -> bool {
        let mut state = self.state.lock();
        if state.fence_token != Some(token) {
            self.stats.rejected_renewals.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        state.expires_at_ms = self.clock.now_millis() + extension.as_millis() as i64;
        self.stats.total_renewals.fetch_add(1, Ordering::Relaxed);
        debug!(lock = %self.name, token, expires_at_ms = state.expires_at_ms, "lease renewed");
        true
    }

    /// Administrative unlock that bypasses the token gate.
    pub fn force_release(&self) {
        let mut state = self.state.lock();
        state.clear();
        drop(state);
        warn!(lock = %self.name, "lease force-released");
        self.available.notify_waiters();
    }

    /// Held and unexpired, evaluated at call time. Self-correcting: no
    /// background sweep exists or is needed.
    pub fn is_locked(&self) -> bool {
        self.state.lock().is_locked(self.clock.now_millis())
    }

    /// Current holder; `None` once the lease has lapsed.
    pub fn holder(&self) -> Option<String> {
        let state = self.state.lock();
        if state.is_locked(self.clock.now_millis()) {
            state.holder.clone()
        } else {
            None
        }
    }

    /// Fencing token of the live grant, if any.
    pub fn current_token(&self) -> Option<u64> {
        let state = self.state.lock();
        if state.is_locked(self.clock.now_millis()) {
            state.fence_token
        } else {
            None
        }
    }

    /// Time left on the live lease.
    pub fn remaining_ttl(&self) -> Duration {
        let state = self.state.lock();
        let now = self.clock.now_millis();
        if state.is_locked(now) {
            Duration::from_millis((state.expires_at_ms - now) as u64)
        } else {
            Duration::ZERO
        }
    }
}
