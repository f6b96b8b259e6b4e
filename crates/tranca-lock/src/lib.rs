//! Tranca Lock - in-process distributed mutual-exclusion simulations
//!
//! This crate provides three independent strategies:
//! - Lease lock with fencing tokens, plus a name-keyed registry and an
//!   execute-with-lock helper
//! - Majority-quorum lock over N independent node stores
//! - Sequential-admission (fair queue) lock with structural FIFO ownership
//!
//! The strategies are alternatives, not layers: a caller picks one and
//! guards its critical section with it. All state is process memory and is
//! lost on restart.

pub mod lease;
pub mod quorum;
pub mod sequence;

// Re-export commonly used types
pub use lease::{
    ACQUIRE_POLL_INTERVAL, AcquireResult, DEFAULT_LEASE_TTL, LeaseLock, LeaseState, LockRegistry,
    LockStats,
};
pub use quorum::{
    LockNodeStore, MemoryLockNode, NodeEntry, QuorumConfig, QuorumGrant, QuorumLockService,
};
pub use sequence::{ADMISSION_POLL_INTERVAL, QueueTicket, SequenceLockService};
