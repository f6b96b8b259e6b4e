//! Quorum lock data model

use std::time::Duration;

use serde::{Deserialize, Serialize};

use tranca_common::TrancaError;

/// One node's record for a held key.
///
/// Past `expires_at_ms` the entry is logically absent even while still
/// stored; nodes reclaim it lazily on the next conflicting write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Opaque proof value presented again at release.
    pub value: String,
    /// Absolute expiry in epoch milliseconds.
    pub expires_at_ms: i64,
}

impl NodeEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Construction-time configuration for the quorum simulation. Node count
/// and the derived quorum are fixed for the service's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumConfig {
    /// Number of independent node stores.
    pub nodes: usize,
    /// Safety margin subtracted from the validity window, absorbing clock
    /// drift between the caller and the nodes.
    #[serde(default)]
    pub drift_allowance_ms: u64,
}

impl QuorumConfig {
    pub fn new(nodes: usize) -> Self {
        Self {
            nodes,
            drift_allowance_ms: 0,
        }
    }

    pub fn with_drift_allowance(mut self, allowance: Duration) -> Self {
        self.drift_allowance_ms = allowance.as_millis() as u64;
        self
    }

    /// Majority threshold: ⌊N/2⌋ + 1.
    pub fn quorum(&self) -> usize {
        self.nodes / 2 + 1
    }

    pub fn validate(&self) -> Result<(), TrancaError> {
        if self.nodes == 0 {
            return Err(TrancaError::IllegalArgument(
                "quorum simulation needs at least one node".to_string(),
            ));
        }
        Ok(())
    }
}

/// Proof of a successful majority acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumGrant {
    /// Opaque value the nodes require again at release.
    pub proof: String,
    /// Lease time left after the acquisition round trip and drift margin.
    pub validity_ms: i64,
    /// How many nodes granted; at least the quorum.
    pub granted: usize,
}
