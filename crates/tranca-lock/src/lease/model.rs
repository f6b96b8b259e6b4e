//! Lease lock data model

use serde::{Deserialize, Serialize};

/// Outcome of a blocking lease acquisition.
///
/// A timeout is an expected contention outcome and is reported as a value,
/// never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireResult {
    /// Lock granted with a freshly minted fencing token.
    Acquired { token: u64 },
    /// Deadline passed before the lock became free.
    TimedOut,
}

impl AcquireResult {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }

    /// Fencing token, if granted.
    pub fn token(&self) -> Option<u64> {
        match self {
            Self::Acquired { token } => Some(*token),
            Self::TimedOut => None,
        }
    }
}

/// Mutable lease state, guarded by the owning lock's mutex.
///
/// The raw fields may outlive the lease: nothing sweeps an expired grant.
/// Every read path evaluates expiry against the current time instead, so the
/// observable state is always `holder set iff token set iff now < expiry`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseState {
    /// Current holder, if any.
    pub holder: Option<String>,
    /// Fencing token issued at the current grant.
    pub fence_token: Option<u64>,
    /// Absolute expiry in epoch milliseconds.
    pub expires_at_ms: i64,
}

impl LeaseState {
    /// Held and not past expiry, evaluated at `now_ms`.
    pub fn is_locked(&self, now_ms: i64) -> bool {
        self.holder.is_some() && now_ms < self.expires_at_ms
    }

    pub(crate) fn grant(&mut self, owner: &str, token: u64, expires_at_ms: i64) {
        self.holder = Some(owner.to_string());
        self.fence_token = Some(token);
        self.expires_at_ms = expires_at_ms;
    }

    pub(crate) fn clear(&mut self) {
        self.holder = None;
        self.fence_token = None;
        self.expires_at_ms = 0;
    }
}

/// Counter snapshot for a lock registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Successful grants.
    pub total_acquisitions: u64,
    /// Blocking acquisitions that ran out of budget.
    pub failed_acquisitions: u64,
    /// Releases accepted on a matching token.
    pub total_releases: u64,
    /// Releases rejected for a stale token.
    pub rejected_releases: u64,
    /// Renewals accepted on a matching token.
    pub total_renewals: u64,
    /// Renewals rejected for a stale token.
    pub rejected_renewals: u64,
    /// Grants that took over a lapsed lease.
    pub expired_leases: u64,
}
