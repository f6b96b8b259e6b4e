//! Name-keyed lease lock registry
//!
//! Locks are created lazily on first reference, cached for the registry's
//! lifetime, and never evicted. Every lock shares the registry's fencing
//! token source, so tokens remain comparable across resources.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use tranca_common::{Clock, FenceTokenSource, SystemClock, TrancaError};

use super::model::{AcquireResult, LockStats};
use super::service::{LeaseLock, LockStatsCollector};

/// Default lease TTL for registry-created locks.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Lazily populated registry of per-resource lease locks.
pub struct LockRegistry {
    locks: DashMap<String, Arc<LeaseLock>>,
    tokens: Arc<FenceTokenSource>,
    clock: Arc<dyn Clock>,
    lease_ttl: Duration,
    stats: Arc<LockStatsCollector>,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_TTL)
    }
}

impl LockRegistry {
    pub fn new(lease_ttl: Duration) -> Self {
        Self::with_clock(lease_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(lease_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        info!(lease_ttl_ms = lease_ttl.as_millis() as u64, "lock registry initialized");
        Self {
            locks: DashMap::new(),
            tokens: Arc::new(FenceTokenSource::new()),
            clock,
            lease_ttl,
            stats: Arc::default(),
        }
    }

    /// Get or lazily create the lock for `name`.
    pub fn get_or_create(&self, name: &str) -> Arc<LeaseLock> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(lock = %name, "lease lock created");
                Arc::new(LeaseLock::with_stats(
                    name,
                    self.lease_ttl,
                    self.tokens.clone(),
                    self.clock.clone(),
                    self.stats.clone(),
                ))
            })
            .clone()
    }

    /// Acquire `name`, run `task` with the granted fencing token, release.
    ///
    /// Acquisition timeout surfaces as [`TrancaError::AcquireTimeout`]; any
    /// other failure is the task's own, propagated after the release. The
    /// lock, once acquired, is released exactly once no matter how the task
    /// comes out.
    pub async fn execute_with_lock<T, F, Fut>(
        &self,
        name: &str,
        owner: &str,
        timeout: Duration,
        task: F,
    ) -> anyhow::Result<T>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let lock = self.get_or_create(name);
        let token = match lock.acquire(owner, timeout).await {
            AcquireResult::Acquired { token } => token,
            AcquireResult::TimedOut => {
                return Err(TrancaError::AcquireTimeout(name.to_string()).into());
            }
        };

        let outcome = task(token).await;

        if !lock.release(token) {
            // The lease lapsed mid-task and someone else took over; their
            // token now gates the lock.
            warn!(lock = %name, owner = %owner, token, "lease was lost before the task finished");
        }

        outcome
    }

    /// Counter snapshot aggregated over every lock in the registry.
    pub fn stats(&self) -> LockStats {
        self.stats.snapshot()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.locks.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_caches_per_name() {
        let registry = LockRegistry::new(Duration::from_secs(5));
        let first = registry.get_or_create("orders");
        let again = registry.get_or_create("orders");
        let other = registry.get_or_create("payments");

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("orders"));
        assert!(!registry.contains("refunds"));
    }

    #[tokio::test]
    async fn test_execute_with_lock_releases_on_success() {
        let registry = LockRegistry::new(Duration::from_secs(5));

        let value = registry
            .execute_with_lock("orders", "worker-1", Duration::from_secs(1), |token| {
                let registry_locked = registry.get_or_create("orders").is_locked();
                async move {
                    assert!(registry_locked);
                    assert!(token > 0);
                    anyhow::Ok(41 + 1)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert!(!registry.get_or_create("orders").is_locked());
    }

    #[tokio::test]
    async fn test_execute_with_lock_releases_on_task_failure() {
        let registry = LockRegistry::new(Duration::from_secs(5));

        let outcome: anyhow::Result<()> = registry
            .execute_with_lock("orders", "worker-1", Duration::from_secs(1), |_token| async {
                anyhow::bail!("task exploded")
            })
            .await;

        assert!(outcome.is_err());
        assert!(!registry.get_or_create("orders").is_locked());

        let stats = registry.stats();
        assert_eq!(stats.total_acquisitions, 1);
        assert_eq!(stats.total_releases, 1);
    }

    #[tokio::test]
    async fn test_execute_with_lock_timeout_is_recoverable() {
        let registry = LockRegistry::new(Duration::from_secs(30));
        let lock = registry.get_or_create("busy");
        let token = lock.try_acquire("holder").unwrap();

        let err = registry
            .execute_with_lock("busy", "latecomer", Duration::from_millis(80), |_token| async {
                anyhow::Ok(())
            })
            .await
            .unwrap_err();

        match err.downcast_ref::<TrancaError>() {
            Some(TrancaError::AcquireTimeout(name)) => assert_eq!(name, "busy"),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(lock.release(token));
    }

    #[tokio::test]
    async fn test_expired_lease_takeover_is_counted() {
        use tranca_common::SimClock;

        let clock = Arc::new(SimClock::new());
        let registry = LockRegistry::with_clock(Duration::from_millis(200), clock.clone());
        let lock = registry.get_or_create("batch");

        lock.try_acquire("worker-1").unwrap();
        clock.advance(Duration::from_millis(250));
        lock.try_acquire("worker-2").unwrap();

        assert_eq!(registry.stats().expired_leases, 1);
    }

    #[tokio::test]
    async fn test_stats_aggregate_across_locks() {
        let registry = LockRegistry::new(Duration::from_secs(5));

        let orders = registry.get_or_create("orders");
        let payments = registry.get_or_create("payments");

        let t1 = orders.try_acquire("worker-1").unwrap();
        let t2 = payments.try_acquire("worker-2").unwrap();
        assert!(!orders.release(t1 + 10));
        assert!(orders.release(t1));
        assert!(payments.renew(t2, Duration::from_secs(1)));
        assert!(payments.release(t2));

        let stats = registry.stats();
        assert_eq!(stats.total_acquisitions, 2);
        assert_eq!(stats.total_releases, 2);
        assert_eq!(stats.rejected_releases, 1);
        assert_eq!(stats.total_renewals, 1);
    }
}
