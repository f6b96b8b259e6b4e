//! Majority-quorum lock over independent node stores
//!
//! One acquisition is a single atomic attempt: write a fresh proof value to
//! every node, count grants, and keep the lock only if a majority agreed
//! while lease time remains after the round trip. There is no built-in
//! blocking or retry; callers retry externally. Nodes never coordinate with
//! each other, so losing a minority of them loses nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use tranca_common::{Clock, SystemClock, TrancaError};

use super::model::{NodeEntry, QuorumConfig, QuorumGrant};

/// Capability a lock node must offer.
///
/// The in-process simulation implements it over a map; a network-backed
/// store can substitute without touching the orchestration above it.
#[async_trait]
pub trait LockNodeStore: Send + Sync {
    /// Store `key = value` with the given TTL, only if the key is absent or
    /// its entry has expired.
    async fn try_put(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Delete `key` only if it currently holds `value`.
    async fn compare_and_delete(&self, key: &str, value: &str) -> bool;
}

/// Mutex-guarded in-memory node store.
#[derive(Debug)]
pub struct MemoryLockNode {
    entries: Mutex<HashMap<String, NodeEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLockNode {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Live value stored for `key`, if any.
    pub fn live_value(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock();
        let now = self.clock.now_millis();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Number of unexpired entries.
    pub fn live_len(&self) -> usize {
        let entries = self.entries.lock();
        let now = self.clock.now_millis();
        entries.values().filter(|entry| !entry.is_expired(now)).count()
    }
}

#[async_trait]
impl LockNodeStore for MemoryLockNode {
    async fn try_put(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut entries = self.entries.lock();
        let now = self.clock.now_millis();
        if let Some(existing) = entries.get(key)
            && !existing.is_expired(now)
        {
            return false;
        }

        entries.insert(
            key.to_string(),
            NodeEntry {
                value: value.to_string(),
                expires_at_ms: now + ttl.as_millis() as i64,
            },
        );
        true
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(existing) if existing.value == value => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }
}

/// Majority-consensus lock orchestrator.
pub struct QuorumLockService {
    nodes: Vec<Arc<dyn LockNodeStore>>,
    quorum: usize,
    drift_allowance_ms: u64,
    clock: Arc<dyn Clock>,
}

impl QuorumLockService {
    /// Build `config.nodes` in-memory nodes on the system clock.
    pub fn new(config: QuorumConfig) -> Result<Self, TrancaError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: QuorumConfig, clock: Arc<dyn Clock>) -> Result<Self, TrancaError> {
        config.validate()?;
        let nodes = (0..config.nodes)
            .map(|_| Arc::new(MemoryLockNode::new(clock.clone())) as Arc<dyn LockNodeStore>)
            .collect();
        Ok(Self {
            nodes,
            quorum: config.quorum(),
            drift_allowance_ms: config.drift_allowance_ms,
            clock,
        })
    }

    /// Orchestrate over caller-supplied nodes (tests, alternative backends).
    pub fn with_nodes(
        nodes: Vec<Arc<dyn LockNodeStore>>,
        drift_allowance: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TrancaError> {
        if nodes.is_empty() {
            return Err(TrancaError::IllegalArgument(
                "quorum simulation needs at least one node".to_string(),
            ));
        }
        let quorum = nodes.len() / 2 + 1;
        Ok(Self {
            nodes,
            quorum,
            drift_allowance_ms: drift_allowance.as_millis() as u64,
            clock,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// One acquisition attempt for `key`.
    ///
    /// Success iff a majority of nodes granted AND lease time remains after
    /// the round trip (minus the drift allowance). Anything else, too few
    /// grants or a round trip that consumed the TTL, rolls back every node
    /// before reporting failure, so no minority is left holding an orphaned
    /// grant.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Option<QuorumGrant> {
        let proof = Uuid::new_v4().to_string();
        let started_ms = self.clock.now_millis();

        let mut granted = 0usize;
        for node in &self.nodes {
            if node.try_put(key, &proof, ttl).await {
                granted += 1;
            }
        }

        let elapsed_ms = self.clock.now_millis() - started_ms;
        let validity_ms = ttl.as_millis() as i64 - elapsed_ms - self.drift_allowance_ms as i64;

        if granted >= self.quorum && validity_ms > 0 {
            debug!(
                key = %key,
                granted,
                nodes = self.nodes.len(),
                validity_ms,
                "quorum lock acquired"
            );
            return Some(QuorumGrant {
                proof,
                validity_ms,
                granted,
            });
        }

        let rolled_back = self.release(key, &proof).await;
        debug!(
            key = %key,
            granted,
            required = self.quorum,
            validity_ms,
            rolled_back,
            "quorum lock attempt failed"
        );
        None
    }

    /// Compare-and-delete on every node; returns how many actually
    /// released. A node whose entry was reclaimed by someone else is left
    /// alone.
    pub async fn release(&self, key: &str, proof: &str) -> usize {
        let mut released = 0usize;
        for node in &self.nodes {
            if node.compare_and_delete(key, proof).await {
                released += 1;
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tranca_common::SimClock;

    fn memory_nodes(count: usize, clock: Arc<SimClock>) -> Vec<Arc<MemoryLockNode>> {
        (0..count)
            .map(|_| Arc::new(MemoryLockNode::new(clock.clone())))
            .collect()
    }

    fn as_stores(nodes: &[Arc<MemoryLockNode>]) -> Vec<Arc<dyn LockNodeStore>> {
        nodes
            .iter()
            .map(|node| node.clone() as Arc<dyn LockNodeStore>)
            .collect()
    }

    #[tokio::test]
    async fn test_grants_when_all_nodes_agree() {
        let clock = Arc::new(SimClock::new());
        let service = QuorumLockService::with_clock(QuorumConfig::new(5), clock).unwrap();
        assert_eq!(service.node_count(), 5);
        assert_eq!(service.quorum(), 3);

        let grant = service.acquire("jobs", Duration::from_secs(10)).await.unwrap();
        assert_eq!(grant.granted, 5);
        assert!(grant.validity_ms > 0);

        // A second caller cannot reach quorum while the lease is live.
        assert!(service.acquire("jobs", Duration::from_secs(10)).await.is_none());

        assert_eq!(service.release("jobs", &grant.proof).await, 5);
        assert!(service.acquire("jobs", Duration::from_secs(10)).await.is_some());
    }

    #[tokio::test]
    async fn test_release_requires_matching_proof() {
        let clock = Arc::new(SimClock::new());
        let nodes = memory_nodes(3, clock.clone());
        let service =
            QuorumLockService::with_nodes(as_stores(&nodes), Duration::ZERO, clock).unwrap();

        let grant = service.acquire("jobs", Duration::from_secs(10)).await.unwrap();
        assert_eq!(service.release("jobs", "forged-proof").await, 0);
        assert_eq!(nodes[0].live_value("jobs"), Some(grant.proof.clone()));
        assert_eq!(service.release("jobs", &grant.proof).await, 3);
    }

    /// Node double that burns simulated time on every write.
    struct SlowNode {
        inner: Arc<MemoryLockNode>,
        clock: Arc<SimClock>,
        delay: Duration,
    }

    #[async_trait]
    impl LockNodeStore for SlowNode {
        async fn try_put(&self, key: &str, value: &str, ttl: Duration) -> bool {
            self.clock.advance(self.delay);
            self.inner.try_put(key, value, ttl).await
        }

        async fn compare_and_delete(&self, key: &str, value: &str) -> bool {
            self.inner.compare_and_delete(key, value).await
        }
    }

    #[tokio::test]
    async fn test_round_trip_consuming_ttl_fails_despite_quorum() {
        let clock = Arc::new(SimClock::new());
        let inners = memory_nodes(5, clock.clone());
        let slow: Vec<Arc<dyn LockNodeStore>> = inners
            .iter()
            .map(|inner| {
                Arc::new(SlowNode {
                    inner: inner.clone(),
                    clock: clock.clone(),
                    delay: Duration::from_millis(50),
                }) as Arc<dyn LockNodeStore>
            })
            .collect();

        let service = QuorumLockService::with_nodes(slow, Duration::ZERO, clock.clone()).unwrap();

        // Every node grants, but 5 x 50ms of round trip eats the 200ms TTL.
        assert!(service.acquire("jobs", Duration::from_millis(200)).await.is_none());
        for inner in &inners {
            assert_eq!(inner.live_value("jobs"), None);
        }
    }

    #[tokio::test]
    async fn test_drift_allowance_tightens_the_budget() {
        let clock = Arc::new(SimClock::new());
        let inners = memory_nodes(3, clock.clone());
        let slow: Vec<Arc<dyn LockNodeStore>> = inners
            .iter()
            .map(|inner| {
                Arc::new(SlowNode {
                    inner: inner.clone(),
                    clock: clock.clone(),
                    delay: Duration::from_millis(20),
                }) as Arc<dyn LockNodeStore>
            })
            .collect();

        // A 60ms round trip against a 100ms TTL leaves validity with no
        // margin configured...
        let lenient =
            QuorumLockService::with_nodes(slow.clone(), Duration::ZERO, clock.clone()).unwrap();
        assert!(lenient.acquire("reports", Duration::from_millis(100)).await.is_some());

        // ...but a 50ms drift allowance eats what is left.
        let strict =
            QuorumLockService::with_nodes(slow, Duration::from_millis(50), clock.clone()).unwrap();
        assert!(strict.acquire("exports", Duration::from_millis(100)).await.is_none());
        for inner in &inners {
            assert_eq!(inner.live_value("exports"), None);
        }
    }

    #[tokio::test]
    async fn test_expired_foreign_entry_is_reclaimable() {
        let clock = Arc::new(SimClock::new());
        let nodes = memory_nodes(3, clock.clone());
        for node in &nodes {
            assert!(node.try_put("jobs", "someone-else", Duration::from_millis(100)).await);
        }

        clock.advance(Duration::from_millis(150));

        let service =
            QuorumLockService::with_nodes(as_stores(&nodes), Duration::ZERO, clock).unwrap();
        let grant = service.acquire("jobs", Duration::from_secs(10)).await.unwrap();
        assert_eq!(grant.granted, 3);
    }
}
